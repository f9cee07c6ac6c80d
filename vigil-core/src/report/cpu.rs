//! CPU time metrics.

use super::{nanoseconds_to_seconds, CollectorResult, MetricDesc, MetricFamily, VmReport};
use tracing::warn;

// Fractional seconds do not fit an integer counter, so these totals are gauges
const CPU_USAGE_SECONDS: MetricDesc = MetricDesc::gauge(
    "vigil_vm_cpu_usage_seconds_total",
    "Total CPU time spent in all modes (sum of both vcpu and hypervisor usage).",
);
const CPU_USER_USAGE_SECONDS: MetricDesc = MetricDesc::gauge(
    "vigil_vm_cpu_user_usage_seconds_total",
    "Total CPU time spent in user mode.",
);
const CPU_SYSTEM_USAGE_SECONDS: MetricDesc = MetricDesc::gauge(
    "vigil_vm_cpu_system_usage_seconds_total",
    "Total CPU time spent in system mode.",
);

/// Domain CPU time counters.
pub struct CpuMetrics;

impl MetricFamily for CpuMetrics {
    fn describe(&self) -> &'static [MetricDesc] {
        &[CPU_USAGE_SECONDS, CPU_USER_USAGE_SECONDS, CPU_SYSTEM_USAGE_SECONDS]
    }

    fn collect(&self, report: &VmReport<'_>) -> Vec<CollectorResult> {
        let Some(cpu) = &report.stats().domain.cpu else {
            return Vec::new();
        };

        if cpu.time.is_none() && cpu.user.is_none() && cpu.system.is_none() {
            warn!(vm = %report.vm().key(), "No domain CPU stats are set");
        }

        [
            (CPU_USAGE_SECONDS, cpu.time),
            (CPU_USER_USAGE_SECONDS, cpu.user),
            (CPU_SYSTEM_USAGE_SECONDS, cpu.system),
        ]
        .into_iter()
        .filter_map(|(metric, ns)| ns.map(|ns| report.result(metric, nanoseconds_to_seconds(ns))))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CpuStats, DomainStats, Vm, VmStats};

    #[test]
    fn test_only_set_counters_are_emitted() {
        let vm = Vm::new("ns", "a");
        let stats = VmStats {
            domain: DomainStats {
                cpu: Some(CpuStats {
                    time: Some(3_500_000_000),
                    user: None,
                    system: Some(500_000_000),
                }),
                ..Default::default()
            },
            filesystems: vec![],
        };

        let results = CpuMetrics.collect(&VmReport::new(&vm, &stats));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metric, CPU_USAGE_SECONDS);
        assert_eq!(results[0].value, 3.5);
        assert_eq!(results[1].metric, CPU_SYSTEM_USAGE_SECONDS);
        assert_eq!(results[1].value, 0.5);
    }

    #[test]
    fn test_no_cpu_stats() {
        let vm = Vm::new("ns", "a");
        let stats = VmStats::default();
        assert!(CpuMetrics.collect(&VmReport::new(&vm, &stats)).is_empty());
    }
}
