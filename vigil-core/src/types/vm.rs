//! VM identity and lifecycle types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;

/// A VM instance known to the node.
///
/// The `namespace/name` pair is the stable identity used as the key in every
/// map the collectors maintain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vm {
    /// Namespace the VM belongs to
    pub namespace: String,

    /// VM name, unique within its namespace
    pub name: String,

    /// Node the VM is running on
    #[serde(default)]
    pub node_name: String,

    /// User labels, copied onto every exported metric
    #[serde(default)]
    pub labels: HashMap<String, String>,

    /// Live-migration state, present once a migration has been requested
    #[serde(default)]
    pub migration_state: Option<MigrationState>,
}

impl Vm {
    /// Create a VM with no labels and no migration state.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            node_name: String::new(),
            labels: HashMap::new(),
            migration_state: None,
        }
    }

    /// Identity key (`namespace/name`).
    pub fn key(&self) -> String {
        vm_key(&self.namespace, &self.name)
    }

    /// Whether a live migration is currently running for this VM.
    pub fn is_migrating(&self) -> bool {
        self.migration_state.as_ref().is_some_and(|m| !m.completed)
    }

    /// Attach a migration state.
    pub fn with_migration(mut self, state: MigrationState) -> Self {
        self.migration_state = Some(state);
        self
    }

    /// Set the node name.
    pub fn with_node(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    /// Add a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Build the identity key for a VM.
pub fn vm_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

/// Live-migration progress as reported by the VM's launcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationState {
    /// When the migration started
    pub started_at: Option<SystemTime>,

    /// Migration has ended (successfully or not)
    #[serde(default)]
    pub completed: bool,

    /// Migration ended in failure
    #[serde(default)]
    pub failed: bool,
}

impl MigrationState {
    /// A migration that started now and is still running.
    pub fn in_progress() -> Self {
        Self { started_at: Some(SystemTime::now()), completed: false, failed: false }
    }

    /// Mark this migration as finished.
    pub fn finished(mut self, failed: bool) -> Self {
        self.completed = true;
        self.failed = failed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_key() {
        let vm = Vm::new("default", "web-0");
        assert_eq!(vm.key(), "default/web-0");
    }

    #[test]
    fn test_is_migrating() {
        let vm = Vm::new("ns", "vm");
        assert!(!vm.is_migrating());

        let vm = vm.with_migration(MigrationState::in_progress());
        assert!(vm.is_migrating());

        let done = MigrationState::in_progress().finished(false);
        let vm = Vm::new("ns", "vm").with_migration(done);
        assert!(!vm.is_migrating());
    }

    #[test]
    fn test_vm_deserialize_defaults() {
        let vm: Vm = serde_json::from_str(r#"{"namespace":"ns","name":"a"}"#).unwrap();
        assert!(vm.labels.is_empty());
        assert!(vm.migration_state.is_none());
        assert_eq!(vm.node_name, "");
    }
}
