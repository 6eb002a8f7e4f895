//! One-shot completion callbacks awaiting a reply.
//!
//! Each request that carries a `done` callback gets its own request id. A
//! reply that echoes the id of a request of its own type resolves exactly
//! that request; any other reply resolves the oldest pending request of the
//! same type. Two in-flight
//! requests of the same type therefore never overwrite each other.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, trace};
use uuid::Uuid;

use crate::events::Message;

/// Callback run once with the reply to a request.
pub type Completion = Box<dyn FnOnce(&Message) + Send>;

struct Pending {
    kind: String,
    completion: Completion,
}

/// Pending completions keyed by request id.
#[derive(Default)]
pub struct CompletionTable {
    pending: HashMap<Uuid, Pending>,
    by_kind: HashMap<String, VecDeque<Uuid>>,
}

impl CompletionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completion for a request of type `kind`.
    pub fn register(&mut self, kind: &str, completion: Completion) -> Uuid {
        let id = Uuid::new_v4();
        self.pending.insert(
            id,
            Pending {
                kind: kind.to_string(),
                completion,
            },
        );
        self.by_kind.entry(kind.to_string()).or_default().push_back(id);
        trace!("completion {id} registered for {kind}");
        id
    }

    /// Take the completion that `reply` answers, if any.
    ///
    /// The caller runs it; the table never invokes callbacks itself.
    pub fn resolve(&mut self, reply: &Message) -> Option<Completion> {
        let echoed = reply
            .request_id()
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .filter(|id| {
                self.pending
                    .get(id)
                    .is_some_and(|pending| pending.kind == reply.kind)
            });

        let id = match echoed {
            Some(id) => id,
            None => *self.by_kind.get(&reply.kind)?.front()?,
        };
        let pending = self.take_pending(id)?;
        debug!("completion {id} resolved by {}", reply.kind);
        Some(pending.completion)
    }

    /// Take the completion registered under `id`.
    pub fn take(&mut self, id: Uuid) -> Option<Completion> {
        self.take_pending(id).map(|pending| pending.completion)
    }

    /// Drop a pending completion without running it.
    pub fn cancel(&mut self, id: Uuid) -> bool {
        self.take_pending(id).is_some()
    }

    fn take_pending(&mut self, id: Uuid) -> Option<Pending> {
        let pending = self.pending.remove(&id)?;
        if let Some(queue) = self.by_kind.get_mut(&pending.kind) {
            queue.retain(|queued| *queued != id);
            if queue.is_empty() {
                self.by_kind.remove(&pending.kind);
            }
        }
        Some(pending)
    }

    /// Number of completions still waiting for a reply.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of completions waiting on a given type.
    pub fn pending_for(&self, kind: &str) -> usize {
        self.by_kind.get(kind).map_or(0, VecDeque::len)
    }
}
