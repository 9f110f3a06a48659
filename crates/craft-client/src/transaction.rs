//! Player transactions.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use craft_core::{CraftError, Player, Result};

use crate::client::Client;
use crate::codec::TransactionRequest;

/// A transaction a player started with `/transact <amount> [query]`.
///
/// Clones share the replied flag, so a transaction can be answered once no
/// matter how many handlers saw it.
#[derive(Clone)]
pub struct Transaction {
    client: Client,
    request: Arc<TransactionRequest>,
    replied: Arc<AtomicBool>,
}

impl Transaction {
    pub(crate) fn new(client: Client, request: TransactionRequest) -> Self {
        Self {
            client,
            request: Arc::new(request),
            replied: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Identifier the server assigned to this transaction.
    pub fn nonce(&self) -> u64 {
        self.request.query_nonce
    }

    /// The paying player.
    pub fn player(&self) -> &Player {
        &self.request.player
    }

    /// Amount deposited.
    pub fn amount(&self) -> f64 {
        self.request.amount
    }

    /// Free text after the amount.
    pub fn query(&self) -> &str {
        &self.request.query
    }

    /// Whether `accept` or `deny` has been called.
    pub fn is_replied(&self) -> bool {
        self.replied.load(Ordering::Acquire)
    }

    /// Privately message the paying player.
    pub async fn tell(&self, message: &str) -> Result<()> {
        self.client
            .tell(self.player(), &format_private_message(message))
            .await
    }

    /// Accept the payment.
    pub async fn accept(&self) -> Result<()> {
        self.respond(true).await
    }

    /// Refund the payment.
    pub async fn deny(&self) -> Result<()> {
        self.respond(false).await
    }

    async fn respond(&self, accept: bool) -> Result<()> {
        if self.replied.swap(true, Ordering::AcqRel) {
            return Err(CraftError::AlreadyReplied);
        }
        self.client.respond_transaction(self.nonce(), accept).await
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("nonce", &self.nonce())
            .field("player", self.player())
            .field("amount", &self.amount())
            .field("query", &self.query())
            .field("replied", &self.is_replied())
            .finish_non_exhaustive()
    }
}

/// Chat strips leading whitespace from the first line, so multi-line
/// messages start on a fresh line.
fn format_private_message(message: &str) -> String {
    let prefix = if message.contains('\n') { "\n" } else { "" };
    format!("{prefix}{}", message.trim().replace('\t', ""))
}
