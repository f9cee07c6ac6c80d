//! Bounded-concurrency stats collection.
//!
//! A batch collection fans one scrape out per VM, caps how many run at once,
//! and stops waiting at a deadline. Scrapes still running at the deadline are
//! abandoned, not aborted: they finish on their own and report into a sink
//! that may already be closed.
//!
//! # Architecture
//!
//! ```text
//!  collect(vms, scraper, timeout)
//!        │
//!        ├─ reserve key ──── busy from last batch? ──► skipped
//!        │
//!        ├─ spawn task ─► acquire permit ─► scraper.scrape(vm) ─► sink.report()
//!        ├─ spawn task ─► (waits for a permit)
//!        │
//!        └─ wait: all tasks done ──or── timeout elapsed
//! ```

mod scraper;
mod sink;

pub use scraper::{StatsScraper, StatsSource};
pub use sink::{BufferSink, ChannelSink, ScrapeResult, SinkError, StatsSink};

use crate::observability::metrics::{record_collection, record_skipped_sources};
use crate::types::Vm;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// One unit of per-VM work run by the collector.
///
/// A scraper owns its result destination; the collector only schedules it.
#[async_trait]
pub trait Scraper: Send + Sync + 'static {
    async fn scrape(&self, vm: Vm);
}

/// Outcome of a batch collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectOutcome {
    /// Keys of VMs not scraped because a previous scrape is still running
    pub skipped: Vec<String>,
    /// Every started scrape finished before the deadline
    pub completed: bool,
}

/// Fan-out/fan-in scrape engine with a fixed concurrency budget.
pub struct ConcurrentCollector {
    max_in_flight: usize,
    permits: Arc<Semaphore>,
    busy: Arc<Mutex<HashSet<String>>>,
}

impl ConcurrentCollector {
    /// Create a collector running at most `max_in_flight` scrapes at once.
    pub fn new(max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            max_in_flight,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            busy: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Concurrency budget.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Number of VMs with a scrape still running, abandoned ones included.
    pub fn busy_count(&self) -> usize {
        self.busy.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    /// Scrape every VM, waiting at most `timeout` for the batch.
    ///
    /// Returns as soon as all scrapes are done or the timeout elapses,
    /// whichever comes first. Outstanding scrapes keep running.
    pub async fn collect(
        &self,
        vms: Vec<Vm>,
        scraper: Arc<dyn Scraper>,
        timeout: Duration,
    ) -> CollectOutcome {
        let start = Instant::now();
        let mut skipped = Vec::new();
        let mut handles = Vec::with_capacity(vms.len());

        debug!(sources = vms.len(), max_in_flight = self.max_in_flight, "Collecting VM stats");

        for vm in vms {
            let key = vm.key();
            let Some(reservation) = self.reserve(&key) else {
                warn!(vm = %key, "Source busy from a previous collection, skipped");
                skipped.push(key);
                continue;
            };

            let permits = Arc::clone(&self.permits);
            let scraper = Arc::clone(&scraper);
            let handle = tokio::spawn(async move {
                // Held until the scrape is over, even past the batch deadline
                let _reservation = reservation;
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                scraper.scrape(vm).await;
            });
            handles.push((key, handle));
        }

        // Dropping a JoinHandle detaches the task, so a timeout abandons
        // the remaining scrapes without cancelling them.
        let wait_all = async {
            for (key, handle) in handles {
                if let Err(e) = handle.await {
                    warn!(vm = %key, error = %e, "Scrape task failed");
                }
            }
        };

        let completed = match tokio::time::timeout(timeout, wait_all).await {
            Ok(()) => {
                debug!(elapsed = ?start.elapsed(), "Collection successful");
                true
            }
            Err(_) => {
                warn!(timeout = ?timeout, "Collection timeout");
                false
            }
        };

        record_collection(start.elapsed().as_secs_f64(), completed);
        if !skipped.is_empty() {
            record_skipped_sources(skipped.len() as u64);
        }

        CollectOutcome { skipped, completed }
    }

    fn reserve(&self, key: &str) -> Option<Reservation> {
        let mut busy = self.busy.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !busy.insert(key.to_string()) {
            return None;
        }
        Some(Reservation { busy: Arc::clone(&self.busy), key: key.to_string() })
    }
}

/// Marks a VM as being scraped until dropped.
struct Reservation {
    busy: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.busy.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).remove(&self.key);
    }
}
