//! Node-local VM inventory.
//!
//! The store is the source of truth collectors read from: the domain stats
//! loop lists it every cycle and migration poll queues look VMs up in it to
//! decide when a migration is over.

use crate::error::Result;
use crate::events::{Event, EventBus, EventKind};
use crate::types::Vm;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Read-only access to the current state of a VM.
#[async_trait]
pub trait VmLookup: Send + Sync + 'static {
    /// Current VM for `key` (`namespace/name`), `None` if it no longer exists.
    async fn get(&self, key: &str) -> Result<Option<Vm>>;
}

/// In-memory VM inventory that announces changes on an event bus.
#[derive(Clone)]
pub struct VmStore {
    vms: Arc<RwLock<HashMap<String, Vm>>>,
    events: Option<EventBus>,
}

impl VmStore {
    /// Create an empty store that publishes no events.
    pub fn new() -> Self {
        Self { vms: Arc::new(RwLock::new(HashMap::new())), events: None }
    }

    /// Create an empty store publishing lifecycle events on `bus`.
    pub fn with_events(bus: EventBus) -> Self {
        Self { vms: Arc::new(RwLock::new(HashMap::new())), events: Some(bus) }
    }

    /// Insert or replace a VM.
    ///
    /// Publishes `vm.added` for a new VM and `vm.updated` when the stored
    /// state changed. Re-inserting an identical VM publishes nothing.
    pub async fn upsert(&self, vm: Vm) {
        let key = vm.key();
        let kind = {
            let mut vms = self.vms.write().await;
            match vms.insert(key.clone(), vm.clone()) {
                None => EventKind::VmAdded,
                Some(previous) if previous != vm => EventKind::VmUpdated,
                Some(_) => return,
            }
        };

        if kind == EventKind::VmAdded {
            info!(vm = %key, "VM added to inventory");
        } else {
            debug!(vm = %key, "VM updated in inventory");
        }
        self.publish(kind, vm);
    }

    /// Remove a VM, returning it if it was known.
    pub async fn remove(&self, key: &str) -> Option<Vm> {
        let removed = self.vms.write().await.remove(key);
        if let Some(vm) = &removed {
            info!(vm = %key, "VM removed from inventory");
            self.publish(EventKind::VmDeleted, vm.clone());
        }
        removed
    }

    /// Snapshot of every VM, sorted by key.
    pub async fn list(&self) -> Vec<Vm> {
        let vms = self.vms.read().await;
        let mut list: Vec<Vm> = vms.values().cloned().collect();
        list.sort_by_key(|vm| vm.key());
        list
    }

    /// Keys of every known VM.
    pub async fn keys(&self) -> Vec<String> {
        self.vms.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.vms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.vms.read().await.is_empty()
    }

    fn publish(&self, kind: EventKind, vm: Vm) {
        if let Some(bus) = &self.events {
            bus.publish(Event::new(kind, vm));
        }
    }
}

impl Default for VmStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VmLookup for VmStore {
    async fn get(&self, key: &str) -> Result<Option<Vm>> {
        Ok(self.vms.read().await.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MigrationState;
    use std::time::Duration;

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = VmStore::new();
        store.upsert(Vm::new("ns", "b")).await;
        store.upsert(Vm::new("ns", "a")).await;

        assert_eq!(store.len().await, 2);
        assert_eq!(store.get("ns/a").await.unwrap().unwrap().name, "a");
        assert!(store.get("ns/zzz").await.unwrap().is_none());

        let names: Vec<String> = store.list().await.into_iter().map(|vm| vm.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_events_published() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(vec![]);
        let store = VmStore::with_events(bus);

        let vm = Vm::new("ns", "a");
        store.upsert(vm.clone()).await;
        // Unchanged state is not an update
        store.upsert(vm.clone()).await;
        store.upsert(vm.clone().with_migration(MigrationState::in_progress())).await;
        store.remove("ns/a").await;
        assert!(store.remove("ns/a").await.is_none());

        let mut kinds = Vec::new();
        for _ in 0..3 {
            let event =
                tokio::time::timeout(Duration::from_millis(100), rx.recv()).await.unwrap().unwrap();
            kinds.push(event.kind);
        }
        assert_eq!(kinds, vec![EventKind::VmAdded, EventKind::VmUpdated, EventKind::VmDeleted]);
        assert!(store.is_empty().await);
    }
}
