//! Keeps the VM inventory in sync with the stats sockets on this node.
//!
//! Every VM running on the node exposes a socket in the socket directory. A
//! refresh asks each socket who it belongs to and mirrors the answers into
//! the inventory, which in turn publishes lifecycle events.

use crate::context::Collectors;
use metrics::{describe_gauge, gauge};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use vigil_core::{StatsClient, Vm, VmStore};

/// Outcome of one inventory refresh.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub seen: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Mirrors socket directory contents into a [`VmStore`].
pub struct InventoryWatcher {
    socket_dir: PathBuf,
    node_name: String,
    store: VmStore,
    client_timeout: Duration,
    refresh_timeout: Duration,
    permits: Arc<Semaphore>,
}

impl InventoryWatcher {
    pub fn new(ctx: &Collectors) -> Self {
        Self {
            socket_dir: ctx.config.socket_dir(),
            node_name: ctx.config.node_name.clone(),
            store: ctx.inventory.clone(),
            client_timeout: ctx.settings.socket_timeout,
            refresh_timeout: ctx.settings.collection_timeout,
            permits: Arc::new(Semaphore::new(ctx.settings.max_in_flight)),
        }
    }

    /// Query every socket once and update the inventory.
    ///
    /// Sockets are queried concurrently, at most `max_requests_in_flight` at a
    /// time, and the refresh stops waiting once the collection timeout passes.
    /// A socket that does not answer in time keeps its VM in the inventory; a
    /// VM whose socket is gone is removed.
    pub async fn refresh(&self) -> anyhow::Result<RefreshReport> {
        let mut report = RefreshReport::default();
        let mut alive = HashSet::new();

        let mut pending = Vec::new();
        for path in list_sockets(&self.socket_dir).await? {
            let permits = Arc::clone(&self.permits);
            let client = StatsClient::new(&path, self.client_timeout);
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await?;
                anyhow::Ok(client.vm_info().await?)
            });
            pending.push((path, handle));
        }

        // Late queries are detached; their VMs count as unanswered
        let deadline = Instant::now() + self.refresh_timeout;
        for (path, handle) in pending {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(Ok(vm))) => {
                    alive.insert(self.upsert(vm).await);
                    report.seen += 1;
                    continue;
                }
                Ok(Ok(Err(e))) => {
                    warn!(path = %path.display(), error = %e, "Failed to query VM info");
                }
                Ok(Err(e)) => {
                    warn!(path = %path.display(), error = %e, "VM info task failed");
                }
                Err(_) => {
                    warn!(
                        path = %path.display(),
                        timeout = ?self.refresh_timeout,
                        "VM info query timed out"
                    );
                }
            }
            report.failed += 1;
            if let Some(key) = self.key_for_socket(&path).await {
                alive.insert(key);
            }
        }

        for key in self.store.keys().await {
            if !alive.contains(&key) && self.store.remove(&key).await.is_some() {
                report.removed += 1;
            }
        }

        gauge!("vigil_inventory_vms").set(self.store.len().await as f64);
        debug!(?report, "Inventory refreshed");
        Ok(report)
    }

    /// Store `vm` and return its inventory key.
    async fn upsert(&self, mut vm: Vm) -> String {
        if vm.node_name.is_empty() {
            vm.node_name = self.node_name.clone();
        }
        let key = vm.key();
        self.store.upsert(vm).await;
        key
    }

    /// Refresh on `period` until shutdown.
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: broadcast::Receiver<()>) {
        describe_gauge!("vigil_inventory_vms", "VMs currently known on this node");
        info!(dir = %self.socket_dir.display(), interval = ?period, "Starting inventory watcher");

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        warn!(error = %e, "Inventory refresh failed");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        info!("Inventory watcher stopped");
    }

    /// Inventory key of the VM last seen behind `path`, if any.
    async fn key_for_socket(&self, path: &Path) -> Option<String> {
        let file_name = path.file_name()?.to_str()?;
        self.store.list().await.into_iter().find_map(|vm| {
            (vigil_core::paths::socket_file_name(&vm.namespace, &vm.name) == file_name)
                .then(|| vm.key())
        })
    }
}

/// Every `*.sock` entry in `dir`. A missing directory has no sockets.
async fn list_sockets(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(anyhow::anyhow!("Failed to read {}: {}", dir.display(), e)),
    };

    let mut sockets = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "sock") {
            sockets.push(path);
        }
    }
    sockets.sort();
    Ok(sockets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;
    use vigil_core::stats::{read_frame, write_frame, StatsRequest, StatsResponse};
    use vigil_core::{Config, MigrationState, Vm};

    /// Serve `vm_info` for `vm` on its socket under `dir`.
    fn serve_vm(dir: &Path, vm: Vm) -> tokio::task::JoinHandle<()> {
        let path = vigil_core::paths::vm_socket_path(dir, &vm.namespace, &vm.name);
        let listener = UnixListener::bind(path).unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let _: StatsRequest = read_frame(&mut stream).await.unwrap();
                let resp = StatsResponse { vm: Some(vm.clone()), ..Default::default() };
                write_frame(&mut stream, &resp).await.unwrap();
            }
        })
    }

    /// Accept connections on `path` and never answer them.
    fn serve_silent(path: &Path) -> tokio::task::JoinHandle<()> {
        let listener = UnixListener::bind(path).unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        })
    }

    fn config(dir: &Path) -> Config {
        Config {
            socket_dir: dir.to_string_lossy().to_string(),
            node_name: "node-1".to_string(),
            ..Config::default()
        }
    }

    fn collectors(dir: &Path) -> Collectors {
        Collectors::new(config(dir))
    }

    #[tokio::test]
    async fn test_refresh_adds_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = collectors(dir.path());
        let watcher = InventoryWatcher::new(&ctx);

        let a = serve_vm(dir.path(), Vm::new("ns", "a"));
        let _b = serve_vm(
            dir.path(),
            Vm::new("ns", "b").with_migration(MigrationState::in_progress()),
        );

        let report = watcher.refresh().await.unwrap();
        assert_eq!(report, RefreshReport { seen: 2, removed: 0, failed: 0 });
        assert_eq!(ctx.inventory.len().await, 2);
        assert_eq!(ctx.inventory.list().await[0].node_name, "node-1");

        a.abort();
        std::fs::remove_file(dir.path().join("ns_a.sock")).unwrap();

        let report = watcher.refresh().await.unwrap();
        assert_eq!(report.removed, 1);
        let names: Vec<String> = ctx.inventory.list().await.into_iter().map(|vm| vm.name).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[tokio::test]
    async fn test_unresponsive_socket_keeps_vm() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = collectors(dir.path());
        let watcher = InventoryWatcher::new(&ctx);

        let server = serve_vm(dir.path(), Vm::new("ns", "a"));
        watcher.refresh().await.unwrap();
        assert_eq!(ctx.inventory.len().await, 1);

        // Socket file stays but nobody answers
        server.abort();
        let _ = server.await;

        let report = watcher.refresh().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.removed, 0);
        assert_eq!(ctx.inventory.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_socket_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = collectors(&dir.path().join("absent"));
        let report = InventoryWatcher::new(&ctx).refresh().await.unwrap();
        assert_eq!(report, RefreshReport::default());
    }

    #[tokio::test]
    async fn test_silent_sockets_are_queried_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Collectors::new(Config {
            socket_timeout_ms: 200,
            max_requests_in_flight: 8,
            collection_timeout_ms: 5_000,
            ..config(dir.path())
        });
        let watcher = InventoryWatcher::new(&ctx);

        let _servers: Vec<_> = (0..6)
            .map(|i| serve_silent(&dir.path().join(format!("ns_vm-{i}.sock"))))
            .collect();

        let started = std::time::Instant::now();
        let report = watcher.refresh().await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(report.failed, 6);
        assert_eq!(report.seen, 0);
        // One socket timeout, not six in a row
        assert!(elapsed < Duration::from_millis(600), "refresh took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_in_flight_cap_bounds_queries() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Collectors::new(Config {
            socket_timeout_ms: 200,
            max_requests_in_flight: 2,
            collection_timeout_ms: 5_000,
            ..config(dir.path())
        });
        let watcher = InventoryWatcher::new(&ctx);

        let _servers: Vec<_> = (0..4)
            .map(|i| serve_silent(&dir.path().join(format!("ns_vm-{i}.sock"))))
            .collect();

        let started = std::time::Instant::now();
        let report = watcher.refresh().await.unwrap();

        assert_eq!(report.failed, 4);
        // Two waves of two
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_refresh_stops_at_collection_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Collectors::new(Config {
            socket_timeout_ms: 5_000,
            collection_timeout_ms: 100,
            ..config(dir.path())
        });
        let watcher = InventoryWatcher::new(&ctx);

        let server = serve_vm(dir.path(), Vm::new("ns", "a"));
        watcher.refresh().await.unwrap();
        assert_eq!(ctx.inventory.len().await, 1);

        server.abort();
        let _ = server.await;
        let path = dir.path().join("ns_a.sock");
        std::fs::remove_file(&path).unwrap();
        let _silent = serve_silent(&path);

        let started = std::time::Instant::now();
        let report = watcher.refresh().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(report.failed, 1);
        assert_eq!(report.removed, 0);
        assert_eq!(ctx.inventory.len().await, 1);
    }
}
