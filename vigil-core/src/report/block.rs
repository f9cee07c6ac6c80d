//! Block device I/O metrics.

use super::{nanoseconds_to_seconds, CollectorResult, MetricDesc, MetricFamily, VmReport};
use tracing::warn;

const STORAGE_IOPS_READ: MetricDesc = MetricDesc::counter(
    "vigil_vm_storage_iops_read_total",
    "Total number of I/O read operations.",
);
const STORAGE_IOPS_WRITE: MetricDesc = MetricDesc::counter(
    "vigil_vm_storage_iops_write_total",
    "Total number of I/O write operations.",
);
const STORAGE_READ_TRAFFIC_BYTES: MetricDesc = MetricDesc::counter(
    "vigil_vm_storage_read_traffic_bytes_total",
    "Total number of bytes read from storage.",
);
const STORAGE_WRITE_TRAFFIC_BYTES: MetricDesc = MetricDesc::counter(
    "vigil_vm_storage_write_traffic_bytes_total",
    "Total number of written bytes.",
);
// Fractional seconds do not fit an integer counter, so time totals are gauges
const STORAGE_READ_TIMES_SECONDS: MetricDesc = MetricDesc::gauge(
    "vigil_vm_storage_read_times_seconds_total",
    "Total time spent on read operations.",
);
const STORAGE_WRITE_TIMES_SECONDS: MetricDesc = MetricDesc::gauge(
    "vigil_vm_storage_write_times_seconds_total",
    "Total time spent on write operations.",
);
const STORAGE_FLUSH_REQUESTS: MetricDesc = MetricDesc::counter(
    "vigil_vm_storage_flush_requests_total",
    "Total storage flush requests.",
);
const STORAGE_FLUSH_TIMES_SECONDS: MetricDesc = MetricDesc::gauge(
    "vigil_vm_storage_flush_times_seconds_total",
    "Total time spent on cache flushing.",
);

/// Per-drive block I/O counters.
pub struct BlockMetrics;

impl MetricFamily for BlockMetrics {
    fn describe(&self) -> &'static [MetricDesc] {
        &[
            STORAGE_IOPS_READ,
            STORAGE_IOPS_WRITE,
            STORAGE_READ_TRAFFIC_BYTES,
            STORAGE_WRITE_TRAFFIC_BYTES,
            STORAGE_READ_TIMES_SECONDS,
            STORAGE_WRITE_TIMES_SECONDS,
            STORAGE_FLUSH_REQUESTS,
            STORAGE_FLUSH_TIMES_SECONDS,
        ]
    }

    fn collect(&self, report: &VmReport<'_>) -> Vec<CollectorResult> {
        let mut results = Vec::new();

        for (idx, block) in report.stats().domain.block.iter().enumerate() {
            let Some(name) = &block.name else {
                warn!(vm = %report.vm().key(), device = idx, "Name not set for block device");
                continue;
            };

            let mut labels = vec![("drive", name.as_str())];
            if let Some(alias) = block.alias.as_deref().filter(|a| !a.is_empty()) {
                labels.push(("alias", alias));
            }

            let counts = [
                (STORAGE_IOPS_READ, block.rd_reqs),
                (STORAGE_IOPS_WRITE, block.wr_reqs),
                (STORAGE_READ_TRAFFIC_BYTES, block.rd_bytes),
                (STORAGE_WRITE_TRAFFIC_BYTES, block.wr_bytes),
            ];
            for (metric, value) in counts {
                if let Some(value) = value {
                    results.push(report.result_with_labels(metric, value as f64, &labels));
                }
            }

            let times = [
                (STORAGE_READ_TIMES_SECONDS, block.rd_times),
                (STORAGE_WRITE_TIMES_SECONDS, block.wr_times),
            ];
            for (metric, ns) in times {
                if let Some(ns) = ns {
                    let seconds = nanoseconds_to_seconds(ns);
                    results.push(report.result_with_labels(metric, seconds, &labels));
                }
            }

            if let Some(reqs) = block.fl_reqs {
                let reqs = reqs as f64;
                results.push(report.result_with_labels(STORAGE_FLUSH_REQUESTS, reqs, &labels));
            }
            if let Some(ns) = block.fl_times {
                results.push(report.result_with_labels(
                    STORAGE_FLUSH_TIMES_SECONDS,
                    nanoseconds_to_seconds(ns),
                    &labels,
                ));
            }
        }

        results
    }
}
