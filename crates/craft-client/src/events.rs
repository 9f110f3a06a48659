//! Events delivered to subscribers.

use craft_core::{Block, BlockUpdateCause, CraftError, Location};

use crate::transaction::Transaction;

/// A watched or polled block changed.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockUpdateEvent {
    /// Block coordinates relative to the structure.
    pub location: Location,
    /// What caused the update.
    pub cause: BlockUpdateCause,
    /// Block before the update.
    pub old: Block,
    /// Block after the update.
    pub block: Block,
}

/// Everything a subscriber can observe on a [`Client`](crate::Client).
#[derive(Clone, Debug)]
pub enum ClientEvent {
    /// The connection is authenticated and ready.
    Open,
    /// The connection closed and every pending request has been failed.
    Close,
    /// A non-fatal error: an undecodable frame or a transport failure.
    Error(CraftError),
    /// A block update pushed by the server.
    BlockUpdate(BlockUpdateEvent),
    /// A player started a transaction.
    Transaction(Transaction),
}

/// Discriminant of [`ClientEvent`], used as the subscription key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`ClientEvent::Open`]
    Open,
    /// [`ClientEvent::Close`]
    Close,
    /// [`ClientEvent::Error`]
    Error,
    /// [`ClientEvent::BlockUpdate`]
    BlockUpdate,
    /// [`ClientEvent::Transaction`]
    Transaction,
}

impl EventKind {
    /// Name used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Error => "error",
            Self::BlockUpdate => "block_update",
            Self::Transaction => "transaction",
        }
    }
}

impl ClientEvent {
    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Close => EventKind::Close,
            Self::Error(_) => EventKind::Error,
            Self::BlockUpdate(_) => EventKind::BlockUpdate,
            Self::Transaction(_) => EventKind::Transaction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(ClientEvent::Open.kind(), EventKind::Open);
        assert_eq!(ClientEvent::Close.kind(), EventKind::Close);
        assert_eq!(
            ClientEvent::Error(CraftError::Decode("x".into())).kind(),
            EventKind::Error
        );
        let update = BlockUpdateEvent {
            location: Location::new(0, 0, 0),
            cause: BlockUpdateCause::Place,
            old: Block::air(),
            block: Block::air(),
        };
        assert_eq!(ClientEvent::BlockUpdate(update).kind(), EventKind::BlockUpdate);
    }

    #[test]
    fn kind_names() {
        assert_eq!(EventKind::BlockUpdate.as_str(), "block_update");
        assert_eq!(EventKind::Transaction.as_str(), "transaction");
    }
}
