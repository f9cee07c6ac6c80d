use super::StatsClient;
use crate::collector::StatsSource;
use crate::error::Result;
use crate::paths::vm_socket_path;
use crate::types::{Vm, VmStats};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Stats source reading each VM's socket under a common directory.
#[derive(Debug, Clone)]
pub struct SocketStatsSource {
    socket_dir: PathBuf,
    timeout: Duration,
}

impl SocketStatsSource {
    pub fn new(socket_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { socket_dir: socket_dir.into(), timeout }
    }

    /// Client for `vm`'s socket.
    pub fn client(&self, vm: &Vm) -> StatsClient {
        StatsClient::new(vm_socket_path(&self.socket_dir, &vm.namespace, &vm.name), self.timeout)
    }
}

#[async_trait]
impl StatsSource for SocketStatsSource {
    async fn fetch(&self, vm: &Vm) -> Result<Option<VmStats>> {
        let client = self.client(vm);

        let Some(domain) = client.domain_stats().await? else {
            return Ok(None);
        };
        if domain.name.is_empty() {
            debug!(vm = %vm.key(), "Domain stats without a domain name");
            return Ok(None);
        }

        let filesystems = client.filesystems().await?;
        Ok(Some(VmStats { domain, filesystems }))
    }
}
