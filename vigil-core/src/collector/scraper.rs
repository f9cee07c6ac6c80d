//! Per-VM scrape: fetch stats from a source, drop stale data, report to a sink.

use super::sink::{ScrapeResult, StatsSink};
use super::Scraper;
use crate::error::Result;
use crate::types::{Vm, VmStats};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, warn};

/// Where a VM's stats come from.
///
/// Implementations apply their own connect timeout and fail fast; a failure is
/// an `Err`, never a panic.
#[async_trait]
pub trait StatsSource: Send + Sync + 'static {
    /// Fetch current stats for `vm`.
    ///
    /// `Ok(None)` means the VM is going away (domain gone or unnamed) and
    /// there is nothing to report.
    async fn fetch(&self, vm: &Vm) -> Result<Option<VmStats>>;
}

/// Scraper that reports fresh stats to a sink.
pub struct StatsScraper {
    source: Arc<dyn StatsSource>,
    sink: Arc<dyn StatsSink>,
    max_age: Duration,
}

impl StatsScraper {
    /// Create a scraper discarding results that took longer than `max_age` to fetch.
    pub fn new(source: Arc<dyn StatsSource>, sink: Arc<dyn StatsSink>, max_age: Duration) -> Self {
        Self { source, sink, max_age }
    }
}

#[async_trait]
impl Scraper for StatsScraper {
    async fn scrape(&self, vm: Vm) {
        let key = vm.key();
        let started_at = SystemTime::now();
        let start = Instant::now();

        let stats = match self.source.fetch(&vm).await {
            Ok(Some(stats)) => stats,
            Ok(None) => {
                debug!(vm = %key, "Disappearing VM, ignored");
                return;
            }
            Err(e) => {
                error!(vm = %key, error = %e, "Failed to fetch domain stats");
                return;
            }
        };

        // The fetch can hang for a long time. Past max_age the data is obsolete
        // and the batch that asked for it has most likely given up.
        let elapsed = start.elapsed();
        if elapsed > self.max_age {
            info!(vm = %key, elapsed = ?elapsed, "Took too long to collect stats, ignored");
            return;
        }

        if let Err(e) = self.sink.report(ScrapeResult { vm, stats, started_at }) {
            warn!(vm = %key, error = %e, "Dropped stats, sink no longer accepts results");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::sink::{BufferSink, ChannelSink};
    use crate::error::VigilError;
    use crate::types::DomainStats;

    struct FixedSource {
        delay: Duration,
        outcome: fn() -> Result<Option<VmStats>>,
    }

    #[async_trait]
    impl StatsSource for FixedSource {
        async fn fetch(&self, _vm: &Vm) -> Result<Option<VmStats>> {
            tokio::time::sleep(self.delay).await;
            (self.outcome)()
        }
    }

    fn named_stats() -> Result<Option<VmStats>> {
        Ok(Some(VmStats {
            domain: DomainStats { name: "dom".to_string(), ..Default::default() },
            filesystems: vec![],
        }))
    }

    #[tokio::test]
    async fn test_reports_fresh_stats() {
        let sink = Arc::new(BufferSink::new());
        let source = Arc::new(FixedSource { delay: Duration::ZERO, outcome: named_stats });
        let scraper = StatsScraper::new(source, sink.clone(), Duration::from_secs(1));

        scraper.scrape(Vm::new("ns", "a")).await;

        let values = sink.take();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].vm.key(), "ns/a");
        assert_eq!(values[0].stats.domain.name, "dom");
    }

    #[tokio::test]
    async fn test_discards_stale_stats() {
        let sink = Arc::new(BufferSink::new());
        let source =
            Arc::new(FixedSource { delay: Duration::from_millis(50), outcome: named_stats });
        let scraper = StatsScraper::new(source, sink.clone(), Duration::from_millis(10));

        scraper.scrape(Vm::new("ns", "a")).await;
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_skips_errors_and_disappearing_vms() {
        let sink = Arc::new(BufferSink::new());

        let failing = Arc::new(FixedSource {
            delay: Duration::ZERO,
            outcome: || Err(VigilError::Internal("boom".to_string())),
        });
        StatsScraper::new(failing, sink.clone(), Duration::from_secs(1))
            .scrape(Vm::new("ns", "a"))
            .await;

        let gone = Arc::new(FixedSource { delay: Duration::ZERO, outcome: || Ok(None) });
        StatsScraper::new(gone, sink.clone(), Duration::from_secs(1))
            .scrape(Vm::new("ns", "b"))
            .await;

        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_closed_sink_is_harmless() {
        let (sink, rx) = ChannelSink::channel(1);
        let sink = Arc::new(sink);
        sink.close();
        drop(rx);

        let source = Arc::new(FixedSource { delay: Duration::ZERO, outcome: named_stats });
        StatsScraper::new(source, sink, Duration::from_secs(1)).scrape(Vm::new("ns", "a")).await;
    }
}
