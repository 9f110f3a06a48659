//! # craft-client
//!
//! Asynchronous client for a craft structure server.
//!
//! One [`Client`] owns at most one WebSocket connection. Requests are
//! correlated with their replies by nonce, so any number may be in flight
//! and they complete in whatever order the server answers. Server-pushed
//! events (block updates, transactions) and lifecycle changes reach
//! subscribers through an ordered, per-kind handler list.
//!
//! ## Module layout
//!
//! | module | role |
//! |--------|------|
//! | [`codec`] | JSON frame encoding and typed decoding |
//! | [`correlation`] | pending request table |
//! | [`router`] | event subscriptions and dispatch |
//! | [`engine`] | connection actor: socket, keepalive, teardown |
//! | [`client`] | public facade |
//! | [`transaction`] | answering player transactions |

#![deny(unsafe_code)]

pub mod client;
pub mod codec;
pub mod correlation;
pub mod engine;
pub mod events;
pub mod router;
pub mod transaction;

pub use client::{Client, ConnectionState, MoveItem};
pub use engine::PendingReply;
pub use events::{BlockUpdateEvent, ClientEvent, EventKind};
pub use transaction::Transaction;
