//! Publish/subscribe router keyed by message type.
//!
//! Subscribers are plain callbacks. Every inbound message that survives the
//! handshake rules is published under its own `type`, so application code
//! can listen for server pushes without touching the dispatcher.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error};

use crate::events::Message;

/// Callback invoked with a message.
pub type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&Message) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// In-memory registry mapping a message type to an ordered list of callbacks.
///
/// Insertion order is call order and the same callback may be registered
/// more than once. Cloning the bus shares the registry.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<HashMap<String, Vec<Handler>>>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, Vec<Handler>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a callback to the list for `kind`.
    pub fn subscribe(&self, kind: &str, callback: Handler) {
        self.registry()
            .entry(kind.to_string())
            .or_default()
            .push(callback);
    }

    /// Remove every callback registered for `kind`.
    pub fn unsubscribe_all(&self, kind: &str) {
        if let Some(list) = self.registry().get_mut(kind) {
            list.clear();
        }
    }

    /// Remove every registration of exactly this callback from `kind`.
    ///
    /// Matching is by identity (`Arc::ptr_eq`), not by behaviour.
    pub fn unsubscribe(&self, kind: &str, callback: &Handler) {
        if let Some(list) = self.registry().get_mut(kind) {
            list.retain(|h| !Arc::ptr_eq(h, callback));
        }
    }

    /// Invoke every subscriber of `kind` in registration order.
    ///
    /// Absent data is delivered as a message of that type with no fields.
    /// A panicking subscriber is logged and skipped; the rest still run.
    pub fn publish(&self, kind: &str, data: Option<&Message>) {
        // Snapshot so subscribers may (un)subscribe while being called.
        let snapshot: Vec<Handler> = match self.registry().get(kind) {
            Some(list) if !list.is_empty() => list.clone(),
            _ => return,
        };

        let empty;
        let data = match data {
            Some(msg) => msg,
            None => {
                empty = Message::new(kind);
                &empty
            }
        };

        debug!("publishing {kind} to {} subscriber(s)", snapshot.len());
        for (index, callback) in snapshot.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| callback(data))).is_err() {
                error!("subscriber #{index} for {kind} panicked; continuing delivery");
            }
        }
    }

    /// Number of callbacks registered for `kind`.
    pub fn subscriber_count(&self, kind: &str) -> usize {
        self.registry().get(kind).map_or(0, Vec::len)
    }
}
