//! Per-VM background poller for migration progress.

use super::MigrationSample;
use crate::collector::{BufferSink, ConcurrentCollector, StatsScraper, StatsSource};
use crate::config::CollectorSettings;
use crate::error::{Result, VigilError};
use crate::inventory::VmLookup;
use crate::types::Vm;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

#[derive(Debug)]
struct QueueState {
    active: bool,
    samples: Vec<MigrationSample>,
}

/// Samples one migrating VM on a fixed interval until the migration ends.
///
/// Samples stay buffered here until [`PollQueue::drain`] takes them.
pub struct PollQueue {
    vm: Vm,
    lookup: Arc<dyn VmLookup>,
    source: Arc<dyn StatsSource>,
    collector: ConcurrentCollector,
    settings: CollectorSettings,
    state: Mutex<QueueState>,
}

impl PollQueue {
    pub fn new(
        vm: Vm,
        lookup: Arc<dyn VmLookup>,
        source: Arc<dyn StatsSource>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            vm,
            lookup,
            source,
            collector: ConcurrentCollector::new(1),
            settings,
            state: Mutex::new(QueueState { active: true, samples: Vec::new() }),
        }
    }

    /// Identity key of the polled VM.
    pub fn key(&self) -> String {
        self.vm.key()
    }

    /// Spawn the polling task. The first tick fires one interval from now.
    pub fn start_polling(self: &Arc<Self>) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        let period = self.settings.polling_interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !queue.is_active().await {
                    debug!(vm = %queue.key(), "Migration poll queue inactive, stopping");
                    return;
                }
                queue.poll().await;
            }
        })
    }

    /// One tick: stop if the migration is over, otherwise take a sample.
    pub async fn poll(&self) {
        let key = self.vm.key();

        let vm = match self.lookup.get(&key).await {
            Ok(Some(vm)) if vm.is_migrating() => vm,
            Ok(Some(_)) => {
                info!(vm = %key, "Migration finished, stopping poll queue");
                self.deactivate().await;
                return;
            }
            Ok(None) => {
                info!(vm = %key, "VM no longer known, stopping poll queue");
                self.deactivate().await;
                return;
            }
            Err(e) => {
                error!(vm = %key, error = %e, "VM lookup failed, stopping poll queue");
                self.deactivate().await;
                return;
            }
        };

        match self.scrape_job_info(vm).await {
            Ok(sample) => self.append(sample).await,
            Err(e) => error!(vm = %key, error = %e, "Failed to sample migration progress"),
        }
    }

    async fn scrape_job_info(&self, vm: Vm) -> Result<MigrationSample> {
        let sink = Arc::new(BufferSink::new());
        let scraper = Arc::new(StatsScraper::new(
            Arc::clone(&self.source),
            sink.clone(),
            self.settings.stats_max_age,
        ));

        self.collector
            .collect(vec![vm.clone()], scraper, self.settings.poll_collection_timeout)
            .await;

        let mut results = sink.take();
        if results.len() != 1 {
            return Err(VigilError::UnexpectedResultCount {
                vm: vm.key(),
                expected: 1,
                actual: results.len(),
            });
        }

        let result = results.remove(0);
        let job_info = result
            .stats
            .domain
            .migrate_job_info
            .ok_or_else(|| VigilError::MissingJobInfo { vm: vm.key() })?;

        Ok(MigrationSample {
            namespace: vm.namespace,
            name: vm.name,
            job_info,
            timestamp: SystemTime::now(),
        })
    }

    /// Buffer a sample, stamping it with the time it was stored.
    pub(crate) async fn append(&self, mut sample: MigrationSample) {
        let mut state = self.state.lock().await;
        sample.timestamp = SystemTime::now();
        state.samples.push(sample);
    }

    /// Take every buffered sample and report whether polling continues.
    pub async fn drain(&self) -> (Vec<MigrationSample>, bool) {
        let mut state = self.state.lock().await;
        (std::mem::take(&mut state.samples), state.active)
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.active
    }

    pub(crate) async fn deactivate(&self) {
        self.state.lock().await.active = false;
    }
}
