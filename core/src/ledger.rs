//! Wallet and coin ledger records.
//!
//! Entries are keyed by the intent that produced them: `source_intent_id` is
//! unique per ledger, so recording the same intent twice is a no-op.

use crate::types::{CustomerId, IntentId, Money, WorkerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by ledger stores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The backing database could not be reached.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// An amount does not fit the storage representation.
    #[error("Amount out of range: {0}")]
    OutOfRange(String),
}

/// Boxed future returned by ledger operations.
pub type LedgerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LedgerError>> + Send + 'a>>;

/// Credit to a worker's wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletEntry {
    /// Entry id.
    pub id: Uuid,
    /// Credited worker.
    pub worker_id: WorkerId,
    /// Amount credited.
    pub amount: Money,
    /// Human-readable reason.
    pub reason: String,
    /// Intent that produced this entry.
    pub source_intent_id: IntentId,
    /// When it was recorded.
    pub created_at: DateTime<Utc>,
}

/// Loyalty coins credited to a customer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinEntry {
    /// Entry id.
    pub id: Uuid,
    /// Credited customer.
    pub customer_id: CustomerId,
    /// Coins credited.
    pub coins: u64,
    /// Human-readable reason.
    pub reason: String,
    /// Intent that produced this entry.
    pub source_intent_id: IntentId,
    /// When it was recorded.
    pub created_at: DateTime<Utc>,
}

/// Outcome of recording an entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The entry was written.
    Recorded,
    /// An entry for the same source intent already existed; nothing written.
    Duplicate,
}

/// Durable wallet and coin ledgers.
pub trait LedgerStore: Send + Sync {
    /// Record a wallet credit unless one exists for `entry.source_intent_id`.
    ///
    /// # Errors
    ///
    /// `Unavailable` when the database could not be reached.
    fn record_wallet_entry(&self, entry: WalletEntry) -> LedgerFuture<'_, RecordOutcome>;

    /// Record a coin credit unless one exists for `entry.source_intent_id`.
    ///
    /// # Errors
    ///
    /// `Unavailable` when the database could not be reached.
    fn record_coin_entry(&self, entry: CoinEntry) -> LedgerFuture<'_, RecordOutcome>;

    /// Sum of a worker's wallet credits.
    ///
    /// # Errors
    ///
    /// `Unavailable` when the database could not be reached.
    fn wallet_balance(&self, worker_id: WorkerId) -> LedgerFuture<'_, Money>;

    /// Sum of a customer's coin credits.
    ///
    /// # Errors
    ///
    /// `Unavailable` when the database could not be reached.
    fn coin_balance(&self, customer_id: CustomerId) -> LedgerFuture<'_, u64>;
}
