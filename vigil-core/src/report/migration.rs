//! Live-migration progress metrics.

use super::{CollectorResult, MetricDesc, MetricFamily, VmReport};
use crate::migration::MigrationSample;
use crate::types::DomainJobInfo;
use metrics::counter;
use std::collections::BTreeMap;

const MIGRATE_DATA_REMAINING: MetricDesc = MetricDesc::gauge(
    "vigil_vm_migration_data_remaining_bytes",
    "Number of bytes that still need to be transferred.",
);
const MIGRATE_DATA_PROCESSED: MetricDesc = MetricDesc::gauge(
    "vigil_vm_migration_data_processed_bytes",
    "Number of bytes transferred from the beginning of the job.",
);
const MIGRATE_DIRTY_MEMORY_RATE: MetricDesc = MetricDesc::gauge(
    "vigil_vm_migration_dirty_memory_rate_bytes",
    "Number of memory pages dirtied by the guest per second.",
);
const MIGRATE_MEMORY_TRANSFER_RATE: MetricDesc = MetricDesc::gauge(
    "vigil_vm_migration_memory_transfer_rate_bytes",
    "Network throughput used while migrating memory in bytes per second.",
);
const MIGRATION_SAMPLES: MetricDesc = MetricDesc::counter(
    "vigil_vm_migration_samples_total",
    "Migration progress samples captured by background polling.",
);

/// Values of a job info snapshot that were actually reported.
fn job_info_values(job: &DomainJobInfo) -> impl Iterator<Item = (MetricDesc, f64)> {
    [
        (MIGRATE_DATA_REMAINING, job.data_remaining),
        (MIGRATE_DATA_PROCESSED, job.data_processed),
        (MIGRATE_DIRTY_MEMORY_RATE, job.mem_dirty_rate),
        (MIGRATE_MEMORY_TRANSFER_RATE, job.memory_bps),
    ]
    .into_iter()
    .filter_map(|(metric, value)| value.map(|v| (metric, v as f64)))
}

/// Migration progress from a one-off domain stats scrape.
pub struct MigrationMetrics;

impl MetricFamily for MigrationMetrics {
    fn describe(&self) -> &'static [MetricDesc] {
        &[
            MIGRATE_DATA_REMAINING,
            MIGRATE_DATA_PROCESSED,
            MIGRATE_DIRTY_MEMORY_RATE,
            MIGRATE_MEMORY_TRANSFER_RATE,
            MIGRATION_SAMPLES,
        ]
    }

    fn collect(&self, report: &VmReport<'_>) -> Vec<CollectorResult> {
        let Some(job) = &report.stats().domain.migrate_job_info else {
            return Vec::new();
        };
        job_info_values(job).map(|(metric, value)| report.result(metric, value)).collect()
    }
}

/// Metric values for one background migration sample.
///
/// Samples only carry the VM identity, so they are labelled by namespace and
/// name and keep their capture time.
pub fn sample_results(sample: &MigrationSample) -> Vec<CollectorResult> {
    let labels = BTreeMap::from([
        ("namespace".to_string(), sample.namespace.clone()),
        ("name".to_string(), sample.name.clone()),
    ]);

    job_info_values(&sample.job_info)
        .map(|(metric, value)| CollectorResult {
            metric,
            labels: labels.clone(),
            value,
            timestamp: Some(sample.timestamp),
        })
        .collect()
}

/// Record background migration samples oldest first.
///
/// Gauges end up holding the newest sample of each VM. Every sample also
/// bumps `vigil_vm_migration_samples_total`, so samples taken between two
/// exporter scrapes are still counted.
pub fn record_samples(samples: &[MigrationSample]) {
    let mut ordered: Vec<&MigrationSample> = samples.iter().collect();
    ordered.sort_by_key(|sample| sample.timestamp);

    for sample in ordered {
        for value in sample_results(sample) {
            value.record();
        }
        counter!(
            MIGRATION_SAMPLES.name,
            "namespace" => sample.namespace.clone(),
            "name" => sample.name.clone()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DomainStats, Vm, VmStats};
    use std::time::SystemTime;

    fn job() -> DomainJobInfo {
        DomainJobInfo {
            data_remaining: Some(4096),
            data_processed: None,
            mem_dirty_rate: Some(12),
            memory_bps: Some(1_000_000),
        }
    }

    #[test]
    fn test_collect_from_scrape() {
        let vm = Vm::new("ns", "a");
        let stats = VmStats {
            domain: DomainStats { migrate_job_info: Some(job()), ..Default::default() },
            filesystems: vec![],
        };

        let results = MigrationMetrics.collect(&VmReport::new(&vm, &stats));
        let names: Vec<_> = results.iter().map(|r| r.metric.name).collect();
        assert_eq!(
            names,
            vec![
                "vigil_vm_migration_data_remaining_bytes",
                "vigil_vm_migration_dirty_memory_rate_bytes",
                "vigil_vm_migration_memory_transfer_rate_bytes",
            ]
        );
    }

    #[test]
    fn test_sample_results_keep_timestamp() {
        let now = SystemTime::now();
        let sample = MigrationSample {
            namespace: "ns".to_string(),
            name: "a".to_string(),
            job_info: job(),
            timestamp: now,
        };

        let results = sample_results(&sample);
        assert_eq!(results.len(), 3);
        for result in &results {
            assert_eq!(result.timestamp, Some(now));
            assert_eq!(result.labels.len(), 2);
            assert_eq!(result.labels["namespace"], "ns");
        }
        assert_eq!(results[0].value, 4096.0);
    }
}
