//! Guest filesystem usage.

use super::{CollectorResult, MetricDesc, MetricFamily, VmReport};

const FILESYSTEM_CAPACITY_BYTES: MetricDesc = MetricDesc::gauge(
    "vigil_vm_filesystem_capacity_bytes",
    "Total VM filesystem capacity in bytes.",
);
const FILESYSTEM_USED_BYTES: MetricDesc =
    MetricDesc::gauge("vigil_vm_filesystem_used_bytes", "Used VM filesystem capacity in bytes.");

pub struct FilesystemMetrics;

impl MetricFamily for FilesystemMetrics {
    fn describe(&self) -> &'static [MetricDesc] {
        &[FILESYSTEM_CAPACITY_BYTES, FILESYSTEM_USED_BYTES]
    }

    fn collect(&self, report: &VmReport<'_>) -> Vec<CollectorResult> {
        let mut results = Vec::new();
        for fs in &report.stats().filesystems {
            let labels = [
                ("disk_name", fs.disk_name.as_str()),
                ("mount_point", fs.mount_point.as_str()),
                ("file_system_type", fs.file_system_type.as_str()),
            ];
            let (total, used) = (fs.total_bytes as f64, fs.used_bytes as f64);
            results.push(report.result_with_labels(FILESYSTEM_CAPACITY_BYTES, total, &labels));
            results.push(report.result_with_labels(FILESYSTEM_USED_BYTES, used, &labels));
        }
        results
    }
}
