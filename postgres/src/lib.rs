//! `PostgreSQL` persistence for the booking engine.
//!
//! Implements the collaborator traits from `booking-core` on top of a shared
//! [`PgPool`]:
//!
//! - [`PostgresBookingStore`]: `BookingStore` and `IntentLog`
//! - [`PostgresWorkerDirectory`]: `WorkerDirectory`
//! - [`PostgresLedgerStore`]: `LedgerStore`
//!
//! Bookings live in one row each; their intent logs in `booking_intents`,
//! ordered by `position`. Queries are built at runtime with `sqlx::query`, so
//! the crate compiles without a database.
//!
//! # Example
//!
//! ```no_run
//! use booking_postgres::{PostgresBookingStore, connect, run_migrations};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("postgres://localhost/bookings", 10, Duration::from_secs(30)).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresBookingStore::new(pool);
//! # Ok(())
//! # }
//! ```

mod bookings;
mod ledger;
mod workers;

pub use bookings::PostgresBookingStore;
pub use ledger::PostgresLedgerStore;
pub use workers::PostgresWorkerDirectory;

use booking_core::StoreError;
use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open a connection pool.
///
/// # Errors
///
/// Returns the `sqlx` error if no connection could be established within
/// `acquire_timeout`.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
}

/// Apply pending schema migrations.
///
/// # Errors
///
/// Returns [`MigrateError`] if a migration fails or the recorded history
/// does not match the embedded one.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await?;
    tracing::info!(migrations = MIGRATOR.iter().count(), "Database schema up to date");
    Ok(())
}

/// Map a `sqlx` failure onto the store taxonomy.
///
/// Decoding problems mean the stored data is unusable; everything else is
/// treated as the database being unreachable.
fn db_error(context: &str, err: &sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::Serialization(format!("{context}: {err}")),
        _ => StoreError::Unavailable(format!("{context}: {err}")),
    }
}

fn to_db_int(field: &str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Serialization(format!("{field} {value} exceeds BIGINT")))
}

fn from_db_int(field: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Serialization(format!("negative {field}: {value}")))
}
