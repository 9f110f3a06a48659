//! Pending request table.
//!
//! Owned by exactly one connection actor. Each entry is resolved at most
//! once and removed on resolution. When the connection ends the whole table
//! is drained, so nothing outlives the connection that created it.

use std::collections::BTreeMap;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use craft_core::{ActionData, ActionType, CraftError, Result};

/// Outcome delivered to a waiting caller.
pub type ReplyResult = Result<ActionData>;

/// Completion side of a pending request.
pub type ReplySender = oneshot::Sender<ReplyResult>;

struct Pending {
    action: ActionType,
    sent_at: Instant,
    waiter: Option<ReplySender>,
}

impl Pending {
    fn complete(self, id: u64, generation: u64, result: ReplyResult) {
        let elapsed_ms = u64::try_from(self.sent_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        trace!(generation, nonce = id, action = %self.action, elapsed_ms, "request resolved");

        let Some(tx) = self.waiter else {
            // Detached requests (heartbeats) only surface failures in the log.
            match result {
                Err(error) if error.is_connection_loss() => {
                    debug!(generation, nonce = id, action = %self.action, "detached request dropped with connection");
                }
                Err(error) => {
                    warn!(generation, nonce = id, action = %self.action, %error, "detached request failed");
                }
                Ok(_) => {}
            }
            return;
        };
        if let Err(Err(error)) = tx.send(result) {
            debug!(generation, nonce = id, action = %self.action, %error, "caller gone before failure");
        }
    }
}

/// Requests awaiting their reply, keyed by nonce.
pub struct CorrelationTable {
    generation: u64,
    pending: BTreeMap<u64, Pending>,
}

impl CorrelationTable {
    /// Empty table for the connection with this generation tag.
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            pending: BTreeMap::new(),
        }
    }

    /// Generation of the owning connection.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Record a request. `waiter` is `None` for fire-and-forget requests.
    ///
    /// Returns `false` and leaves the table unchanged if `id` is already
    /// pending.
    pub fn register(&mut self, id: u64, action: ActionType, waiter: Option<ReplySender>) -> bool {
        if self.pending.contains_key(&id) {
            warn!(generation = self.generation, nonce = id, %action, "duplicate nonce");
            return false;
        }
        let _ = self.pending.insert(
            id,
            Pending {
                action,
                sent_at: Instant::now(),
                waiter,
            },
        );
        true
    }

    /// Resolve `id` with `result`. Unknown ids are a no-op returning `false`.
    pub fn resolve(&mut self, id: u64, result: ReplyResult) -> bool {
        let Some(pending) = self.pending.remove(&id) else {
            return false;
        };
        pending.complete(id, self.generation, result);
        true
    }

    /// Resolve `id` from a reply frame.
    ///
    /// `ok == false` becomes [`CraftError::Request`] carrying the server's
    /// `message`, tagged with the action that was sent under `id`.
    pub fn resolve_reply(&mut self, id: u64, ok: bool, data: ActionData) -> bool {
        let Some(pending) = self.pending.remove(&id) else {
            return false;
        };
        let result = if ok {
            Ok(data)
        } else {
            Err(CraftError::Request {
                action: pending.action.as_str().to_string(),
                message: server_message(&data),
            })
        };
        pending.complete(id, self.generation, result);
        true
    }

    /// Resolve every pending request with a copy of `error`.
    ///
    /// Returns the resolved ids in ascending order.
    pub fn drain_all(&mut self, error: &CraftError) -> Vec<u64> {
        let drained = std::mem::take(&mut self.pending);
        let mut ids = Vec::with_capacity(drained.len());
        for (id, pending) in drained {
            pending.complete(id, self.generation, Err(error.clone()));
            ids.push(id);
        }
        ids
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn server_message(data: &ActionData) -> String {
    ["message", "error"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_str))
        .unwrap_or("unknown error")
        .to_string()
}
