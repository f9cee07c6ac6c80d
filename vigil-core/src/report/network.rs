//! Network interface metrics.

use super::{CollectorResult, MetricDesc, MetricFamily, VmReport};

const NETWORK_TRAFFIC_BYTES_DEPRECATED: MetricDesc = MetricDesc::counter(
    "vigil_vm_network_traffic_bytes_total",
    "[Deprecated] Total number of bytes sent and received.",
);
const NETWORK_RECEIVE_BYTES: MetricDesc = MetricDesc::counter(
    "vigil_vm_network_receive_bytes_total",
    "Total network traffic received in bytes.",
);
const NETWORK_TRANSMIT_BYTES: MetricDesc = MetricDesc::counter(
    "vigil_vm_network_transmit_bytes_total",
    "Total network traffic transmitted in bytes.",
);
const NETWORK_RECEIVE_PACKETS: MetricDesc = MetricDesc::counter(
    "vigil_vm_network_receive_packets_total",
    "Total network traffic received packets.",
);
const NETWORK_TRANSMIT_PACKETS: MetricDesc = MetricDesc::counter(
    "vigil_vm_network_transmit_packets_total",
    "Total network traffic transmitted packets.",
);
const NETWORK_RECEIVE_ERRORS: MetricDesc = MetricDesc::counter(
    "vigil_vm_network_receive_errors_total",
    "Total network received error packets.",
);
const NETWORK_TRANSMIT_ERRORS: MetricDesc = MetricDesc::counter(
    "vigil_vm_network_transmit_errors_total",
    "Total network transmitted error packets.",
);
const NETWORK_RECEIVE_PACKETS_DROPPED: MetricDesc = MetricDesc::counter(
    "vigil_vm_network_receive_packets_dropped_total",
    "The total number of rx packets dropped on vNIC interfaces.",
);
const NETWORK_TRANSMIT_PACKETS_DROPPED: MetricDesc = MetricDesc::counter(
    "vigil_vm_network_transmit_packets_dropped_total",
    "The total number of tx packets dropped on vNIC interfaces.",
);

/// Per-interface network counters.
pub struct NetworkMetrics;

impl MetricFamily for NetworkMetrics {
    fn describe(&self) -> &'static [MetricDesc] {
        &[
            NETWORK_TRAFFIC_BYTES_DEPRECATED,
            NETWORK_RECEIVE_BYTES,
            NETWORK_TRANSMIT_BYTES,
            NETWORK_RECEIVE_PACKETS,
            NETWORK_TRANSMIT_PACKETS,
            NETWORK_RECEIVE_ERRORS,
            NETWORK_TRANSMIT_ERRORS,
            NETWORK_RECEIVE_PACKETS_DROPPED,
            NETWORK_TRANSMIT_PACKETS_DROPPED,
        ]
    }

    fn collect(&self, report: &VmReport<'_>) -> Vec<CollectorResult> {
        let mut results = Vec::new();

        for net in &report.stats().domain.net {
            let Some(name) = &net.name else {
                continue;
            };
            // The alias is the name users gave the interface
            let iface = net.alias.as_deref().unwrap_or(name);
            let labels = [("interface", iface)];

            if let Some(rx) = net.rx_bytes {
                results.push(report.result_with_labels(
                    NETWORK_TRAFFIC_BYTES_DEPRECATED,
                    rx as f64,
                    &[("interface", iface), ("type", "rx")],
                ));
                results.push(report.result_with_labels(NETWORK_RECEIVE_BYTES, rx as f64, &labels));
            }
            if let Some(tx) = net.tx_bytes {
                results.push(report.result_with_labels(
                    NETWORK_TRAFFIC_BYTES_DEPRECATED,
                    tx as f64,
                    &[("interface", iface), ("type", "tx")],
                ));
                results.push(report.result_with_labels(NETWORK_TRANSMIT_BYTES, tx as f64, &labels));
            }

            let counters = [
                (NETWORK_RECEIVE_PACKETS, net.rx_pkts),
                (NETWORK_TRANSMIT_PACKETS, net.tx_pkts),
                (NETWORK_RECEIVE_ERRORS, net.rx_errs),
                (NETWORK_TRANSMIT_ERRORS, net.tx_errs),
                (NETWORK_RECEIVE_PACKETS_DROPPED, net.rx_drop),
                (NETWORK_TRANSMIT_PACKETS_DROPPED, net.tx_drop),
            ];
            for (metric, value) in counters {
                if let Some(value) = value {
                    results.push(report.result_with_labels(metric, value as f64, &labels));
                }
            }
        }

        results
    }
}
