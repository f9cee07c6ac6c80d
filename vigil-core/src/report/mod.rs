//! Conversion of scraped VM stats into metric values.
//!
//! Each metric family turns a [`VmReport`] into [`CollectorResult`]s; the
//! results are then recorded through the `metrics` facade and served by the
//! Prometheus exporter. Families only emit values the hypervisor actually
//! reported.

mod affinity;
mod block;
mod cpu;
mod filesystem;
mod migration;
mod network;

pub use affinity::CpuAffinityMetrics;
pub use block::BlockMetrics;
pub use cpu::CpuMetrics;
pub use filesystem::FilesystemMetrics;
pub use migration::{record_samples, sample_results, MigrationMetrics};
pub use network::NetworkMetrics;

use crate::collector::ScrapeResult;
use crate::types::{Vm, VmStats};
use metrics::{counter, describe_counter, describe_gauge, gauge, Label};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Prometheus metric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// Static description of an exported metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDesc {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
}

impl MetricDesc {
    pub const fn counter(name: &'static str, help: &'static str) -> Self {
        Self { name, help, kind: MetricKind::Counter }
    }

    pub const fn gauge(name: &'static str, help: &'static str) -> Self {
        Self { name, help, kind: MetricKind::Gauge }
    }

    fn describe(&self) {
        match self.kind {
            MetricKind::Counter => describe_counter!(self.name, self.help),
            MetricKind::Gauge => describe_gauge!(self.name, self.help),
        }
    }
}

/// A single metric value with its labels.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorResult {
    pub metric: MetricDesc,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    /// Capture time, for values sampled in the background
    pub timestamp: Option<SystemTime>,
}

impl CollectorResult {
    /// Record this value into the installed metrics recorder.
    ///
    /// Counters are monotonic integer totals read from the hypervisor, so they
    /// are set with `absolute` rather than incremented. Totals with a
    /// fractional part are declared as gauges and keep their full value.
    pub fn record(&self) {
        let labels: Vec<Label> =
            self.labels.iter().map(|(k, v)| Label::new(k.clone(), v.clone())).collect();
        match self.metric.kind {
            MetricKind::Counter => counter!(self.metric.name, labels).absolute(self.value as u64),
            MetricKind::Gauge => gauge!(self.metric.name, labels).set(self.value),
        }
    }
}

/// One VM's scraped stats, ready to be turned into metric values.
pub struct VmReport<'a> {
    vm: &'a Vm,
    stats: &'a VmStats,
    base_labels: BTreeMap<String, String>,
}

impl<'a> VmReport<'a> {
    pub fn new(vm: &'a Vm, stats: &'a VmStats) -> Self {
        let mut base_labels = BTreeMap::new();
        for (key, value) in &vm.labels {
            base_labels.insert(format!("label_{}", sanitize_label_name(key)), value.clone());
        }
        base_labels.insert("node".to_string(), vm.node_name.clone());
        base_labels.insert("namespace".to_string(), vm.namespace.clone());
        base_labels.insert("name".to_string(), vm.name.clone());

        Self { vm, stats, base_labels }
    }

    pub fn vm(&self) -> &Vm {
        self.vm
    }

    pub fn stats(&self) -> &VmStats {
        self.stats
    }

    /// Result carrying the VM's labels.
    pub fn result(&self, metric: MetricDesc, value: f64) -> CollectorResult {
        self.result_with_labels(metric, value, &[])
    }

    /// Result carrying the VM's labels plus `extra`.
    pub fn result_with_labels(
        &self,
        metric: MetricDesc,
        value: f64,
        extra: &[(&str, &str)],
    ) -> CollectorResult {
        let mut labels = self.base_labels.clone();
        for (key, value) in extra {
            labels.insert((*key).to_string(), (*value).to_string());
        }
        CollectorResult { metric, labels, value, timestamp: None }
    }
}

/// A group of related metrics computed from one VM report.
pub trait MetricFamily: Send + Sync {
    /// Metrics this family may emit.
    fn describe(&self) -> &'static [MetricDesc];

    /// Values for the given report.
    fn collect(&self, report: &VmReport<'_>) -> Vec<CollectorResult>;
}

/// Every family exported for a domain stats scrape.
pub fn families() -> [&'static dyn MetricFamily; 6] {
    [
        &CpuMetrics,
        &BlockMetrics,
        &NetworkMetrics,
        &FilesystemMetrics,
        &MigrationMetrics,
        &CpuAffinityMetrics,
    ]
}

/// Register descriptions of every family with the metrics recorder.
pub fn describe_all() {
    for family in families() {
        for desc in family.describe() {
            desc.describe();
        }
    }
}

/// All metric values for one scrape result.
pub fn scrape_results(result: &ScrapeResult) -> Vec<CollectorResult> {
    let report = VmReport::new(&result.vm, &result.stats);
    families().iter().flat_map(|family| family.collect(&report)).collect()
}

/// Replace characters Prometheus does not allow in label names.
fn sanitize_label_name(name: &str) -> String {
    name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect()
}

pub(crate) fn nanoseconds_to_seconds(ns: u64) -> f64 {
    ns as f64 / 1_000_000_000.0
}
