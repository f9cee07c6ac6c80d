//! Collector self-metrics and registration of every exported family.
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters
//! - `_seconds` suffix for histograms measuring duration

use crate::report;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Describe every metric vigil exports.
///
/// Safe to call more than once.
pub fn register_core_metrics() {
    describe_gauge!("vigil_info", "Version information");

    describe_histogram!(
        "vigil_collection_duration_seconds",
        "Time a batch collection made its caller wait"
    );
    describe_counter!(
        "vigil_collection_timeouts_total",
        "Batch collections that hit their deadline with scrapes outstanding"
    );
    describe_counter!(
        "vigil_collection_skipped_total",
        "Sources skipped because a previous scrape was still running"
    );
    describe_gauge!("vigil_migrations_tracked", "VMs with an active migration poll queue");

    report::describe_all();
}

/// Publish the running version as a constant gauge.
pub fn set_version_info() {
    gauge!("vigil_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record one finished batch collection.
pub fn record_collection(duration_secs: f64, completed: bool) {
    histogram!("vigil_collection_duration_seconds").record(duration_secs);
    if !completed {
        counter!("vigil_collection_timeouts_total").increment(1);
    }
}

pub fn record_skipped_sources(count: u64) {
    counter!("vigil_collection_skipped_total").increment(count);
}

pub fn set_migrations_tracked(count: usize) {
    gauge!("vigil_migrations_tracked").set(count as f64);
}
