//! In-memory wallet and coin ledgers.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use booking_core::ledger::{
    CoinEntry, LedgerError, LedgerFuture, LedgerStore, RecordOutcome, WalletEntry,
};
use booking_core::{CustomerId, IntentId, Money, WorkerId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Ledgers {
    wallet: Vec<WalletEntry>,
    coins: Vec<CoinEntry>,
    wallet_sources: HashSet<IntentId>,
    coin_sources: HashSet<IntentId>,
}

/// [`LedgerStore`] keeping entries in insertion order.
///
/// `source_intent_id` is unique per ledger, as in the production schema.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedgerStore {
    ledgers: Arc<Mutex<Ledgers>>,
    failing_writes: Arc<AtomicUsize>,
}

impl InMemoryLedgerStore {
    /// Create empty ledgers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail with `Unavailable`.
    pub fn fail_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// All wallet entries.
    #[must_use]
    pub fn wallet_entries(&self) -> Vec<WalletEntry> {
        self.ledgers.lock().unwrap().wallet.clone()
    }

    /// All coin entries.
    #[must_use]
    pub fn coin_entries(&self) -> Vec<CoinEntry> {
        self.ledgers.lock().unwrap().coins.clone()
    }

    fn check_write(&self) -> Result<(), LedgerError> {
        let failing = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            Err(LedgerError::Unavailable("injected ledger failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn record_wallet_entry(&self, entry: WalletEntry) -> LedgerFuture<'_, RecordOutcome> {
        Box::pin(async move {
            self.check_write()?;
            let mut ledgers = self.ledgers.lock().unwrap();
            if !ledgers.wallet_sources.insert(entry.source_intent_id.clone()) {
                return Ok(RecordOutcome::Duplicate);
            }
            ledgers.wallet.push(entry);
            Ok(RecordOutcome::Recorded)
        })
    }

    fn record_coin_entry(&self, entry: CoinEntry) -> LedgerFuture<'_, RecordOutcome> {
        Box::pin(async move {
            self.check_write()?;
            let mut ledgers = self.ledgers.lock().unwrap();
            if !ledgers.coin_sources.insert(entry.source_intent_id.clone()) {
                return Ok(RecordOutcome::Duplicate);
            }
            ledgers.coins.push(entry);
            Ok(RecordOutcome::Recorded)
        })
    }

    fn wallet_balance(&self, worker_id: WorkerId) -> LedgerFuture<'_, Money> {
        Box::pin(async move {
            let total = self
                .ledgers
                .lock()
                .unwrap()
                .wallet
                .iter()
                .filter(|e| e.worker_id == worker_id)
                .map(|e| e.amount.minor())
                .sum();
            Ok(Money::from_minor(total))
        })
    }

    fn coin_balance(&self, customer_id: CustomerId) -> LedgerFuture<'_, u64> {
        Box::pin(async move {
            Ok(self
                .ledgers
                .lock()
                .unwrap()
                .coins
                .iter()
                .filter(|e| e.customer_id == customer_id)
                .map(|e| e.coins)
                .sum())
        })
    }
}
