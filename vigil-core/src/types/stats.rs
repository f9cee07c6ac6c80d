//! Domain statistics reported by a VM's stats socket.
//!
//! Every counter is optional: the hypervisor only reports what it knows, and
//! an absent value must not be exported as zero.

use serde::{Deserialize, Serialize};

/// Everything a single scrape returns for one VM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VmStats {
    pub domain: DomainStats,
    #[serde(default)]
    pub filesystems: Vec<Filesystem>,
}

/// Hypervisor-level statistics for a domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainStats {
    pub name: String,
    pub uuid: String,
    pub cpu: Option<CpuStats>,
    pub block: Vec<BlockStats>,
    pub net: Vec<NetStats>,
    /// vCPU to physical CPU pinning map, indexed `[vcpu][cpu]`
    pub cpu_map: Option<Vec<Vec<bool>>>,
    pub migrate_job_info: Option<DomainJobInfo>,
}

/// CPU time counters, in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuStats {
    pub time: Option<u64>,
    pub user: Option<u64>,
    pub system: Option<u64>,
}

/// Per-disk block I/O counters. Times are in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockStats {
    pub name: Option<String>,
    pub alias: Option<String>,
    pub rd_reqs: Option<u64>,
    pub wr_reqs: Option<u64>,
    pub rd_bytes: Option<u64>,
    pub wr_bytes: Option<u64>,
    pub rd_times: Option<u64>,
    pub wr_times: Option<u64>,
    pub fl_reqs: Option<u64>,
    pub fl_times: Option<u64>,
}

/// Per-interface network counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetStats {
    pub name: Option<String>,
    pub alias: Option<String>,
    pub rx_bytes: Option<u64>,
    pub rx_pkts: Option<u64>,
    pub rx_errs: Option<u64>,
    pub rx_drop: Option<u64>,
    pub tx_bytes: Option<u64>,
    pub tx_pkts: Option<u64>,
    pub tx_errs: Option<u64>,
    pub tx_drop: Option<u64>,
}

/// Progress of the domain's current migration job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainJobInfo {
    /// Bytes still to be transferred
    pub data_remaining: Option<u64>,
    /// Bytes transferred since the job started
    pub data_processed: Option<u64>,
    /// Guest pages dirtied per second
    pub mem_dirty_rate: Option<u64>,
    /// Memory transfer throughput, bytes per second
    pub memory_bps: Option<u64>,
}

/// Guest filesystem usage as reported by the guest agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filesystem {
    pub disk_name: String,
    pub mount_point: String,
    pub file_system_type: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
}
