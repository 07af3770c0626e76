//! Applies wallet and coin intents to the ledger.

use crate::drain::{ApplyOutcome, ConsumeFuture, ConsumerError, IntentConsumer};
use crate::metrics::IntentMetrics;
use booking_core::environment::Clock;
use booking_core::ledger::{CoinEntry, LedgerError, LedgerStore, RecordOutcome, WalletEntry};
use booking_core::{Intent, IntentKind};
use std::sync::Arc;
use uuid::Uuid;

/// Name the ledger applier records in `applied_by`.
pub const LEDGER_CONSUMER: &str = "ledger";

/// Turns `credit_wallet` and `credit_coins` intents into ledger entries.
///
/// Idempotence comes from the ledger: each entry carries the intent id as
/// `source_intent_id`, and the store refuses a second entry for it.
pub struct LedgerApplier {
    ledger: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
}

impl LedgerApplier {
    /// Create an applier writing to `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, clock }
    }

    /// Apply one intent. Notification intents are skipped.
    ///
    /// # Errors
    ///
    /// Propagates [`LedgerError`] from the store; the intent can be retried.
    pub async fn apply_intent(&self, intent: &Intent) -> Result<ApplyOutcome, LedgerError> {
        let recorded = match &intent.kind {
            IntentKind::CreditWallet { worker_id, amount } => {
                self.ledger
                    .record_wallet_entry(WalletEntry {
                        id: Uuid::new_v4(),
                        worker_id: worker_id.clone(),
                        amount: *amount,
                        reason: format!("booking {} completed", intent.booking_id),
                        source_intent_id: intent.id.clone(),
                        created_at: self.clock.now(),
                    })
                    .await?
            },
            IntentKind::CreditCoins { customer_id, coins } => {
                self.ledger
                    .record_coin_entry(CoinEntry {
                        id: Uuid::new_v4(),
                        customer_id: customer_id.clone(),
                        coins: *coins,
                        reason: format!("loyalty coins for booking {}", intent.booking_id),
                        source_intent_id: intent.id.clone(),
                        created_at: self.clock.now(),
                    })
                    .await?
            },
            IntentKind::Notify { .. } => return Ok(ApplyOutcome::Skipped),
        };

        Ok(match recorded {
            RecordOutcome::Recorded => {
                tracing::info!(intent_id = %intent.id, kind = intent.kind.name(), "Ledger entry recorded");
                ApplyOutcome::Applied
            },
            RecordOutcome::Duplicate => {
                tracing::debug!(intent_id = %intent.id, "Ledger entry already recorded");
                IntentMetrics::record_duplicate();
                ApplyOutcome::Duplicate
            },
        })
    }
}

impl IntentConsumer for LedgerApplier {
    fn name(&self) -> &'static str {
        LEDGER_CONSUMER
    }

    fn consume<'a>(&'a self, intent: &'a Intent) -> ConsumeFuture<'a> {
        Box::pin(async move { self.apply_intent(intent).await.map_err(ConsumerError::from) })
    }
}
