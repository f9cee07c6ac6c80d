//! vCPU to node CPU affinity.

use super::{CollectorResult, MetricDesc, MetricFamily, VmReport};

const NODE_CPU_AFFINITY: MetricDesc = MetricDesc::gauge(
    "vigil_vm_node_cpu_affinity",
    "Number of VM CPU affinities to node physical cores.",
);

/// Count of vCPU/physical-CPU pinning pairs.
pub struct CpuAffinityMetrics;

impl MetricFamily for CpuAffinityMetrics {
    fn describe(&self) -> &'static [MetricDesc] {
        &[NODE_CPU_AFFINITY]
    }

    fn collect(&self, report: &VmReport<'_>) -> Vec<CollectorResult> {
        let Some(cpu_map) = &report.stats().domain.cpu_map else {
            return Vec::new();
        };

        let affinity_count = cpu_map.iter().flatten().filter(|pinned| **pinned).count();
        vec![report.result(NODE_CPU_AFFINITY, affinity_count as f64)]
    }
}
