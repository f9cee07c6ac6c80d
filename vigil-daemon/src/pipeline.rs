//! Periodic collection loops feeding the Prometheus exporter.

use crate::context::Collectors;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use vigil_core::report::{record_samples, scrape_results};
use vigil_core::{ChannelSink, StatsScraper};

/// Scrape domain stats of every known VM once and record the results.
///
/// Returns the number of VMs whose stats were recorded.
pub async fn collect_domain_stats(ctx: &Collectors) -> usize {
    let vms = ctx.inventory.list().await;
    if vms.is_empty() {
        debug!("No VMs on this node, skipping domain stats collection");
        return 0;
    }

    let (sink, mut rx) = ChannelSink::channel(vms.len());
    let sink = Arc::new(sink);
    let scraper = Arc::new(StatsScraper::new(
        Arc::clone(&ctx.source),
        sink.clone(),
        ctx.settings.stats_max_age,
    ));

    let mut recorded = 0;
    let collect = ctx.domain.collect(vms, scraper, ctx.settings.collection_timeout);
    tokio::pin!(collect);

    let outcome = loop {
        tokio::select! {
            outcome = &mut collect => break outcome,
            Some(result) = rx.recv() => {
                for value in scrape_results(&result) {
                    value.record();
                }
                recorded += 1;
            }
        }
    };

    // Late scrapes must not write into a batch that is already reported
    sink.close();
    while let Ok(result) = rx.try_recv() {
        for value in scrape_results(&result) {
            value.record();
        }
        recorded += 1;
    }

    if !outcome.skipped.is_empty() {
        warn!(skipped = outcome.skipped.len(), "VMs still busy from a previous collection");
    }
    debug!(recorded, completed = outcome.completed, "Domain stats collected");
    recorded
}

/// Record every migration sample buffered since the last call.
///
/// Returns the number of samples recorded.
pub async fn collect_migration_stats(ctx: &Collectors) -> usize {
    let samples = ctx.migrations.collect().await;
    record_samples(&samples);
    samples.len()
}

/// Run the domain stats loop until shutdown.
pub async fn run_domain_stats(ctx: Arc<Collectors>, mut shutdown: broadcast::Receiver<()>) {
    let period = ctx.config.scrape_interval();
    info!(interval = ?period, "Starting domain stats loop");

    let ctx = &ctx;
    run_every(period, &mut shutdown, move || async move {
        let start = Instant::now();
        let recorded = collect_domain_stats(ctx).await;
        debug!(recorded, elapsed = ?start.elapsed(), "Domain stats cycle done");
    })
    .await;

    info!("Domain stats loop stopped");
}

/// Run the migration stats loop until shutdown.
///
/// Drains on the polling interval so each sample reaches the exporter about
/// as soon as it is taken.
pub async fn run_migration_stats(ctx: Arc<Collectors>, mut shutdown: broadcast::Receiver<()>) {
    let period = ctx.settings.polling_interval;
    info!(interval = ?period, "Starting migration stats loop");

    let ctx = &ctx;
    run_every(period, &mut shutdown, move || async move {
        let recorded = collect_migration_stats(ctx).await;
        if recorded > 0 {
            debug!(recorded, "Migration samples recorded");
        }
    })
    .await;

    info!("Migration stats loop stopped");
}

async fn run_every<F, Fut>(period: Duration, shutdown: &mut broadcast::Receiver<()>, mut cycle: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => cycle().await,
            _ = shutdown.recv() => return,
        }
    }
}
