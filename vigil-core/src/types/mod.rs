//! Domain types shared by the collectors and the daemon.

pub mod stats;
pub mod vm;

pub use stats::{
    BlockStats, CpuStats, DomainJobInfo, DomainStats, Filesystem, NetStats, VmStats,
};
pub use vm::{vm_key, MigrationState, Vm};
