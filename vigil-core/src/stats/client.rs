use super::protocol::{StatsRequest, StatsResponse};
use super::{read_frame, write_frame};
use crate::error::{Result, VigilError};
use crate::types::{DomainStats, Filesystem, Vm};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;
use tracing::debug;

/// Client for one VM's stats socket.
///
/// Each call opens a fresh connection; connect and request are each bounded
/// by the client timeout.
#[derive(Debug, Clone)]
pub struct StatsClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl StatsClient {
    pub fn new(socket_path: impl AsRef<Path>, timeout: Duration) -> Self {
        Self { socket_path: socket_path.as_ref().to_path_buf(), timeout }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Current domain stats, `None` if the domain no longer exists.
    pub async fn domain_stats(&self) -> Result<Option<DomainStats>> {
        let resp = self.request(StatsRequest::DomainStats).await?;
        if !resp.exists {
            return Ok(None);
        }
        resp.stats
            .map(Some)
            .ok_or_else(|| VigilError::protocol("domain exists but no stats were returned"))
    }

    pub async fn filesystems(&self) -> Result<Vec<Filesystem>> {
        Ok(self.request(StatsRequest::Filesystems).await?.filesystems)
    }

    /// Identity and migration state reported by the VM itself.
    pub async fn vm_info(&self) -> Result<Vm> {
        self.request(StatsRequest::VmInfo)
            .await?
            .vm
            .ok_or_else(|| VigilError::protocol("vm_info response carries no VM"))
    }

    /// Send one request and wait for its response.
    pub async fn request(&self, request: StatsRequest) -> Result<StatsResponse> {
        debug!(path = %self.socket_path.display(), ?request, "Stats socket request");

        let mut stream = tokio::time::timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| self.timed_out())?
            .map_err(|e| VigilError::SocketConnect { path: self.socket_path.clone(), source: e })?;

        let exchange = async {
            write_frame(&mut stream, &request).await?;
            read_frame::<_, StatsResponse>(&mut stream).await
        };

        let resp = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| self.timed_out())??;
        resp.into_result()
    }

    fn timed_out(&self) -> VigilError {
        VigilError::SocketTimeout {
            path: self.socket_path.clone(),
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }
}
