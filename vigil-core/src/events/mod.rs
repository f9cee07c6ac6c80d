//! Event bus for VM lifecycle events.
//!
//! The inventory publishes an event whenever it learns that a VM appeared,
//! changed or went away. Collectors subscribe to the kinds they care about.
//!
//! # Example
//!
//! ```ignore
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe(vec!["vm.updated".to_string()]);
//!
//! bus.publish(Event::new(EventKind::VmUpdated, vm));
//!
//! while let Some(event) = rx.recv().await {
//!     println!("{} {}", event.kind.as_str(), event.vm.key());
//! }
//! ```

use crate::types::Vm;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Maximum number of events buffered in the broadcast channel.
const EVENT_BUFFER_SIZE: usize = 256;

/// Lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    VmAdded,
    VmUpdated,
    VmDeleted,
}

impl EventKind {
    /// Get the event type string (e.g., "vm.updated").
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::VmAdded => "vm.added",
            EventKind::VmUpdated => "vm.updated",
            EventKind::VmDeleted => "vm.deleted",
        }
    }
}

/// A VM lifecycle event carrying the VM as last observed.
#[derive(Debug, Clone)]
pub struct Event {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    pub kind: EventKind,
    pub vm: Vm,
}

impl Event {
    /// Create a new event stamped with the current time.
    pub fn new(kind: EventKind, vm: Vm) -> Self {
        Self {
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as i64,
            kind,
            vm,
        }
    }
}

/// Event bus for publishing and subscribing to lifecycle events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: Event) {
        debug!(event_type = event.kind.as_str(), vm = %event.vm.key(), "Publishing event");
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events, optionally filtered by event type patterns.
    ///
    /// # Filter patterns
    ///
    /// - `"vm.*"` - All VM events
    /// - `"vm.updated"` - Only update events
    /// - Empty list - All events
    pub fn subscribe(&self, filters: Vec<String>) -> EventSubscriber {
        EventSubscriber { receiver: self.sender.subscribe(), filters }
    }

    /// Get the number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event subscriber with optional filtering.
pub struct EventSubscriber {
    receiver: broadcast::Receiver<Event>,
    filters: Vec<String>,
}

impl EventSubscriber {
    /// Receive the next matching event.
    ///
    /// Returns `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "Event subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return None;
                }
            }
        }
    }

    fn matches(&self, event: &Event) -> bool {
        if self.filters.is_empty() {
            return true;
        }

        let event_type = event.kind.as_str();
        self.filters.iter().any(|filter| match filter.strip_suffix(".*") {
            Some(prefix) => {
                event_type.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('.'))
            }
            None => filter == event_type,
        })
    }
}
