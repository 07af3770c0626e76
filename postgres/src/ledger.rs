//! Wallet and coin ledgers.
//!
//! `source_intent_id` carries a unique constraint in both tables; an insert
//! that hits it is reported as [`RecordOutcome::Duplicate`].

use booking_core::ledger::{
    CoinEntry, LedgerError, LedgerFuture, LedgerStore, RecordOutcome, WalletEntry,
};
use booking_core::{CustomerId, Money, WorkerId};
use sqlx::PgPool;

/// [`LedgerStore`] over the `wallet_entries` and `coin_entries` tables.
#[derive(Clone, Debug)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

fn unavailable(context: &str) -> impl Fn(sqlx::Error) -> LedgerError + '_ {
    move |e| LedgerError::Unavailable(format!("{context}: {e}"))
}

fn to_bigint(value: u64) -> Result<i64, LedgerError> {
    i64::try_from(value).map_err(|_| LedgerError::OutOfRange(format!("{value} exceeds BIGINT")))
}

fn from_bigint(value: i64) -> Result<u64, LedgerError> {
    u64::try_from(value).map_err(|_| LedgerError::OutOfRange(format!("negative balance {value}")))
}

const fn outcome(rows_affected: u64) -> RecordOutcome {
    if rows_affected == 0 {
        RecordOutcome::Duplicate
    } else {
        RecordOutcome::Recorded
    }
}

impl PostgresLedgerStore {
    /// Create a ledger store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_wallet(&self, entry: WalletEntry) -> Result<RecordOutcome, LedgerError> {
        let result = sqlx::query(
            r"
            INSERT INTO wallet_entries (id, worker_id, amount_minor, reason, source_intent_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_intent_id) DO NOTHING
            ",
        )
        .bind(entry.id)
        .bind(entry.worker_id.as_str())
        .bind(to_bigint(entry.amount.minor())?)
        .bind(&entry.reason)
        .bind(entry.source_intent_id.as_str())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable("insert wallet entry"))?;

        Ok(outcome(result.rows_affected()))
    }

    async fn insert_coins(&self, entry: CoinEntry) -> Result<RecordOutcome, LedgerError> {
        let result = sqlx::query(
            r"
            INSERT INTO coin_entries (id, customer_id, coins, reason, source_intent_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_intent_id) DO NOTHING
            ",
        )
        .bind(entry.id)
        .bind(entry.customer_id.as_str())
        .bind(to_bigint(entry.coins)?)
        .bind(&entry.reason)
        .bind(entry.source_intent_id.as_str())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable("insert coin entry"))?;

        Ok(outcome(result.rows_affected()))
    }

    async fn sum(&self, query: &'static str, owner: &str) -> Result<u64, LedgerError> {
        let (total,): (i64,) = sqlx::query_as(query)
            .bind(owner)
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable("sum ledger"))?;
        from_bigint(total)
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn record_wallet_entry(&self, entry: WalletEntry) -> LedgerFuture<'_, RecordOutcome> {
        Box::pin(self.insert_wallet(entry))
    }

    fn record_coin_entry(&self, entry: CoinEntry) -> LedgerFuture<'_, RecordOutcome> {
        Box::pin(self.insert_coins(entry))
    }

    fn wallet_balance(&self, worker_id: WorkerId) -> LedgerFuture<'_, Money> {
        Box::pin(async move {
            let total = self
                .sum(
                    "SELECT COALESCE(SUM(amount_minor), 0)::BIGINT FROM wallet_entries WHERE worker_id = $1",
                    worker_id.as_str(),
                )
                .await?;
            Ok(Money::from_minor(total))
        })
    }

    fn coin_balance(&self, customer_id: CustomerId) -> LedgerFuture<'_, u64> {
        Box::pin(async move {
            self.sum(
                "SELECT COALESCE(SUM(coins), 0)::BIGINT FROM coin_entries WHERE customer_id = $1",
                customer_id.as_str(),
            )
            .await
        })
    }
}
