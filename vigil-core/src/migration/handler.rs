//! Registry of migration poll queues, one per migrating VM.

use super::{MigrationSample, PollQueue};
use crate::collector::StatsSource;
use crate::config::CollectorSettings;
use crate::events::{EventBus, EventKind};
use crate::inventory::VmLookup;
use crate::observability::metrics::set_migrations_tracked;
use crate::types::Vm;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

struct TrackedQueue {
    queue: Arc<PollQueue>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct HandlerState {
    queues: HashMap<String, TrackedQueue>,
    /// Samples of queues replaced before they were evicted
    retired: Vec<MigrationSample>,
}

/// Starts a poll queue when a VM begins migrating and collects their samples.
pub struct MigrationStatsHandler {
    lookup: Arc<dyn VmLookup>,
    source: Arc<dyn StatsSource>,
    settings: CollectorSettings,
    inner: Mutex<HandlerState>,
}

impl MigrationStatsHandler {
    pub fn new(
        lookup: Arc<dyn VmLookup>,
        source: Arc<dyn StatsSource>,
        settings: CollectorSettings,
    ) -> Self {
        Self { lookup, source, settings, inner: Mutex::new(HandlerState::default()) }
    }

    /// React to a VM add or update.
    ///
    /// Starts polling if the VM is migrating and nothing polls it yet.
    pub async fn handle_vm_update(&self, vm: &Vm) {
        if !vm.is_migrating() {
            return;
        }

        let key = vm.key();
        let mut inner = self.inner.lock().await;

        if let Some(tracked) = inner.queues.get(&key) {
            if tracked.queue.is_active().await {
                return;
            }
            // Previous migration ended but its queue was never collected
            tracked.task.abort();
            let (samples, _) = tracked.queue.drain().await;
            debug!(vm = %key, pending = samples.len(), "Replacing finished poll queue");
            inner.retired.extend(samples);
        }

        let queue = Arc::new(PollQueue::new(
            vm.clone(),
            self.lookup.clone(),
            self.source.clone(),
            self.settings,
        ));
        let task = queue.start_polling();
        inner.queues.insert(key.clone(), TrackedQueue { queue, task });

        info!(vm = %key, "Tracking migration");
        set_migrations_tracked(inner.queues.len());
    }

    /// Take every buffered sample and forget VMs whose migration ended.
    pub async fn collect(&self) -> Vec<MigrationSample> {
        let mut inner = self.inner.lock().await;
        let mut samples = std::mem::take(&mut inner.retired);
        let mut finished = Vec::new();

        for (key, tracked) in &inner.queues {
            let (drained, active) = tracked.queue.drain().await;
            samples.extend(drained);
            if !active {
                finished.push(key.clone());
            }
        }

        for key in finished {
            inner.queues.remove(&key);
            debug!(vm = %key, "Migration no longer tracked");
        }

        set_migrations_tracked(inner.queues.len());
        samples
    }

    /// Feed VM add and update events from `bus` into [`Self::handle_vm_update`].
    ///
    /// Adds are included because a VM first discovered mid-migration never
    /// produces an update for the migration that is already running.
    pub fn watch(self: &Arc<Self>, bus: &EventBus) -> JoinHandle<()> {
        let mut subscriber = bus.subscribe(vec![
            EventKind::VmAdded.as_str().to_string(),
            EventKind::VmUpdated.as_str().to_string(),
        ]);
        let handler = Arc::clone(self);

        tokio::spawn(async move {
            while let Some(event) = subscriber.recv().await {
                handler.handle_vm_update(&event.vm).await;
            }
            debug!("Event bus closed, migration watcher exiting");
        })
    }

    /// Number of registered poll queues, finished ones included.
    pub async fn tracked(&self) -> usize {
        self.inner.lock().await.queues.len()
    }

    /// Stop every polling task and drop all state.
    pub async fn stop_all(&self) {
        let mut inner = self.inner.lock().await;
        for (_, tracked) in inner.queues.drain() {
            tracked.task.abort();
        }
        inner.retired.clear();
        set_migrations_tracked(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::events::Event;
    use crate::types::{DomainJobInfo, DomainStats, MigrationState, VmStats};
    use async_trait::async_trait;
    use std::time::Duration;

    struct AlwaysMigrating;

    #[async_trait]
    impl VmLookup for AlwaysMigrating {
        async fn get(&self, key: &str) -> Result<Option<Vm>> {
            let (ns, name) = key.split_once('/').unwrap_or(("", key));
            Ok(Some(Vm::new(ns, name).with_migration(MigrationState::in_progress())))
        }
    }

    struct JobSource;

    #[async_trait]
    impl StatsSource for JobSource {
        async fn fetch(&self, _vm: &Vm) -> Result<Option<VmStats>> {
            Ok(Some(VmStats {
                domain: DomainStats {
                    name: "dom".to_string(),
                    migrate_job_info: Some(DomainJobInfo {
                        data_processed: Some(1),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                filesystems: vec![],
            }))
        }
    }

    fn handler(polling_interval: Duration) -> MigrationStatsHandler {
        let settings = CollectorSettings { polling_interval, ..Default::default() };
        MigrationStatsHandler::new(Arc::new(AlwaysMigrating), Arc::new(JobSource), settings)
    }

    fn migrating(name: &str) -> Vm {
        Vm::new("ns", name).with_migration(MigrationState::in_progress())
    }

    #[tokio::test]
    async fn test_ignores_vm_without_migration() {
        let handler = handler(Duration::from_secs(60));
        handler.handle_vm_update(&Vm::new("ns", "a")).await;
        let done = Vm::new("ns", "b").with_migration(MigrationState::in_progress().finished(true));
        handler.handle_vm_update(&done).await;
        assert_eq!(handler.tracked().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_updates_create_one_queue() {
        let handler = handler(Duration::from_secs(60));
        handler.handle_vm_update(&migrating("a")).await;
        handler.handle_vm_update(&migrating("a")).await;
        assert_eq!(handler.tracked().await, 1);

        handler.handle_vm_update(&migrating("b")).await;
        assert_eq!(handler.tracked().await, 2);
        handler.stop_all().await;
        assert_eq!(handler.tracked().await, 0);
    }

    #[tokio::test]
    async fn test_inactive_queue_replaced_and_samples_retained() {
        let handler = handler(Duration::from_secs(60));
        handler.handle_vm_update(&migrating("a")).await;

        {
            let inner = handler.inner.lock().await;
            let queue = &inner.queues["ns/a"].queue;
            queue.poll().await;
            queue.deactivate().await;
        }

        handler.handle_vm_update(&migrating("a")).await;
        assert_eq!(handler.tracked().await, 1);
        {
            let inner = handler.inner.lock().await;
            assert!(inner.queues["ns/a"].queue.is_active().await);
        }

        let samples = handler.collect().await;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].job_info.data_processed, Some(1));
        assert!(handler.collect().await.is_empty());
        handler.stop_all().await;
    }

    #[tokio::test]
    async fn test_watch_tracks_updated_vms() {
        let handler = Arc::new(handler(Duration::from_secs(60)));
        let bus = EventBus::new();
        let task = handler.watch(&bus);

        bus.publish(Event::new(EventKind::VmDeleted, migrating("gone")));
        bus.publish(Event::new(EventKind::VmUpdated, migrating("a")));

        for _ in 0..50 {
            if handler.tracked().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handler.tracked().await, 1);

        drop(bus);
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        handler.stop_all().await;
    }

    #[tokio::test]
    async fn test_watch_tracks_vm_first_seen_mid_migration() {
        let handler = Arc::new(handler(Duration::from_secs(60)));
        let bus = EventBus::new();
        let task = handler.watch(&bus);

        // Discovered after the migration started, so no update ever follows
        bus.publish(Event::new(EventKind::VmAdded, migrating("late")));
        bus.publish(Event::new(EventKind::VmAdded, Vm::new("ns", "idle")));

        for _ in 0..50 {
            if handler.tracked().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handler.tracked().await, 1);
        assert!(handler.inner.lock().await.queues.contains_key("ns/late"));

        drop(bus);
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        handler.stop_all().await;
    }
}
