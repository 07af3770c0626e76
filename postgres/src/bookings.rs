//! Booking rows and their intent logs.

use crate::{db_error, from_db_int, to_db_int};
use booking_core::store::{BookingStore, IntentLog, PendingIntents, StoreFuture, merge_intent_log};
use booking_core::{
    Booking, BookingId, BookingStatus, CustomerId, Intent, IntentId, IntentKind, Money, ServiceId,
    StoreError, Version, WorkerId,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};

const BOOKING_COLUMNS: &str =
    "id, status, customer_id, worker_id, service_id, price_minor, scheduled_at, version";

const INTENT_COLUMNS: &str = "intent_id, booking_id, payload, applied_by, created_at";

/// [`BookingStore`] and [`IntentLog`] backed by `PostgreSQL`.
///
/// `compare_and_swap` locks the row with `SELECT ... FOR UPDATE`, checks the
/// version, then writes with `UPDATE ... WHERE version = $expected` and
/// appends the new intents in the same transaction. Either everything lands
/// or nothing does.
#[derive(Clone, Debug)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self, booking_id: &BookingId) -> Result<Booking, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin read", &e))?;
        // Row and log must come from the same snapshot.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("set isolation", &e))?;

        let row = sqlx::query(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
            .bind(booking_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("load booking", &e))?
            .ok_or_else(|| StoreError::NotFound(booking_id.clone()))?;
        let intent_log = load_intents(&mut tx, booking_id).await?;

        tx.commit().await.map_err(|e| db_error("end read", &e))?;
        row_to_booking(&row, intent_log)
    }

    async fn swap(
        &self,
        booking_id: &BookingId,
        expected: Version,
        next: Booking,
    ) -> Result<Booking, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin swap", &e))?;

        let locked = sqlx::query("SELECT version FROM bookings WHERE id = $1 FOR UPDATE")
            .bind(booking_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("lock booking", &e))?
            .ok_or_else(|| StoreError::NotFound(booking_id.clone()))?;
        let actual = read_version(&locked)?;
        if actual != expected {
            return Err(StoreError::VersionConflict {
                booking_id: booking_id.clone(),
                expected,
                actual,
            });
        }

        let stored_log = load_intents(&mut tx, booking_id).await?;
        let stored_len = stored_log.len();
        let intent_log = merge_intent_log(&stored_log, next.intent_log)?;
        let committed = expected.next()?;

        let updated = sqlx::query(
            r"
            UPDATE bookings
            SET status = $3,
                customer_id = $4,
                worker_id = $5,
                service_id = $6,
                price_minor = $7,
                scheduled_at = $8,
                version = $9,
                updated_at = NOW()
            WHERE id = $1 AND version = $2
            ",
        )
        .bind(booking_id.as_str())
        .bind(to_db_int("version", expected.value())?)
        .bind(next.status.as_str())
        .bind(next.customer_id.as_str())
        .bind(next.worker_id.as_ref().map(WorkerId::as_str))
        .bind(next.service_id.as_str())
        .bind(to_db_int("price", next.price.minor())?)
        .bind(next.scheduled_at)
        .bind(to_db_int("version", committed.value())?)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("update booking", &e))?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                booking_id: booking_id.clone(),
                expected,
                actual,
            });
        }

        for (position, intent) in intent_log.iter().enumerate().skip(stored_len) {
            insert_intent(&mut tx, position, intent).await?;
        }

        tx.commit().await.map_err(|e| db_error("commit swap", &e))?;

        tracing::debug!(
            booking_id = %booking_id,
            version = %committed,
            appended = intent_log.len() - stored_len,
            "Booking row swapped"
        );

        Ok(Booking {
            id: booking_id.clone(),
            version: committed,
            intent_log,
            ..next
        })
    }

    async fn insert(&self, booking: Booking) -> Result<Booking, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin create", &e))?;

        let inserted = sqlx::query(
            r"
            INSERT INTO bookings (
                id, status, customer_id, worker_id, service_id, price_minor, scheduled_at, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(booking.id.as_str())
        .bind(booking.status.as_str())
        .bind(booking.customer_id.as_str())
        .bind(booking.worker_id.as_ref().map(WorkerId::as_str))
        .bind(booking.service_id.as_str())
        .bind(to_db_int("price", booking.price.minor())?)
        .bind(booking.scheduled_at)
        .bind(to_db_int("version", booking.version.value())?)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("insert booking", &e))?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(booking.id));
        }

        for (position, intent) in booking.intent_log.iter().enumerate() {
            insert_intent(&mut tx, position, intent).await?;
        }

        tx.commit().await.map_err(|e| db_error("commit create", &e))?;
        tracing::info!(booking_id = %booking.id, status = %booking.status, "Booking created");
        Ok(booking)
    }

    async fn pending(
        &self,
        consumer: &str,
        after: Option<&BookingId>,
        limit: usize,
    ) -> Result<Vec<PendingIntents>, StoreError> {
        #[allow(clippy::cast_possible_wrap)] // Batch sizes are small
        let rows = sqlx::query(&format!(
            r"
            SELECT {INTENT_COLUMNS}
            FROM booking_intents
            WHERE NOT ($1 = ANY(applied_by))
              AND ($3::TEXT IS NULL OR booking_id > $3)
            ORDER BY booking_id, position
            LIMIT $2
            "
        ))
        .bind(consumer)
        .bind(limit as i64)
        .bind(after.map(BookingId::as_str))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("load unapplied intents", &e))?;

        let mut groups: Vec<PendingIntents> = Vec::new();
        for row in &rows {
            let intent = row_to_intent(row)?;
            let same_booking = groups
                .last()
                .is_some_and(|group| group.booking_id == intent.booking_id);
            if same_booking {
                if let Some(group) = groups.last_mut() {
                    group.intents.push(intent);
                }
            } else {
                groups.push(PendingIntents {
                    booking_id: intent.booking_id.clone(),
                    intents: vec![intent],
                });
            }
        }
        Ok(groups)
    }

    async fn mark(
        &self,
        booking_id: &BookingId,
        intent_id: &IntentId,
        consumer: &str,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r"
            UPDATE booking_intents
            SET applied_by = array_append(applied_by, $3)
            WHERE booking_id = $1 AND intent_id = $2 AND NOT ($3 = ANY(applied_by))
            ",
        )
        .bind(booking_id.as_str())
        .bind(intent_id.as_str())
        .bind(consumer)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("mark intent", &e))?;

        if updated.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing changed: either already marked, or no such intent.
        let exists = sqlx::query("SELECT 1 FROM booking_intents WHERE booking_id = $1 AND intent_id = $2")
            .bind(booking_id.as_str())
            .bind(intent_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("check intent", &e))?;

        if exists.is_some() {
            Ok(())
        } else {
            Err(StoreError::NotFound(booking_id.clone()))
        }
    }
}

impl BookingStore for PostgresBookingStore {
    fn get(&self, booking_id: BookingId) -> StoreFuture<'_, Booking> {
        Box::pin(async move { self.load(&booking_id).await })
    }

    fn compare_and_swap(
        &self,
        booking_id: BookingId,
        expected: Version,
        next: Booking,
    ) -> StoreFuture<'_, Booking> {
        Box::pin(async move { self.swap(&booking_id, expected, next).await })
    }

    fn create(&self, booking: Booking) -> StoreFuture<'_, Booking> {
        Box::pin(async move { self.insert(booking).await })
    }
}

impl IntentLog for PostgresBookingStore {
    fn unapplied(
        &self,
        consumer: &'static str,
        after: Option<BookingId>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<PendingIntents>> {
        Box::pin(async move { self.pending(consumer, after.as_ref(), limit).await })
    }

    fn mark_applied(
        &self,
        booking_id: BookingId,
        intent_id: IntentId,
        consumer: &'static str,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.mark(&booking_id, &intent_id, consumer).await })
    }
}

async fn load_intents(conn: &mut PgConnection, booking_id: &BookingId) -> Result<Vec<Intent>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {INTENT_COLUMNS} FROM booking_intents WHERE booking_id = $1 ORDER BY position"
    ))
    .bind(booking_id.as_str())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| db_error("load intent log", &e))?;

    rows.iter().map(row_to_intent).collect()
}

async fn insert_intent(conn: &mut PgConnection, position: usize, intent: &Intent) -> Result<(), StoreError> {
    let position = i32::try_from(position)
        .map_err(|_| StoreError::InvalidUpdate(format!("intent log of {} is too long", intent.booking_id)))?;
    let payload = serde_json::to_value(&intent.kind)
        .map_err(|e| StoreError::Serialization(format!("intent {}: {e}", intent.id)))?;
    let applied_by: Vec<String> = intent.applied_by.iter().cloned().collect();

    sqlx::query(
        r"
        INSERT INTO booking_intents (intent_id, booking_id, position, kind, payload, applied_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (intent_id) DO NOTHING
        ",
    )
    .bind(intent.id.as_str())
    .bind(intent.booking_id.as_str())
    .bind(position)
    .bind(intent.kind.name())
    .bind(payload)
    .bind(applied_by)
    .bind(intent.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error("append intent", &e))?;

    Ok(())
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name).map_err(|e| db_error(name, &e))
}

fn read_version(row: &PgRow) -> Result<Version, StoreError> {
    Ok(Version::new(from_db_int("version", column(row, "version")?)?))
}

fn row_to_booking(row: &PgRow, intent_log: Vec<Intent>) -> Result<Booking, StoreError> {
    let status: String = column(row, "status")?;
    let status: BookingStatus = status
        .parse()
        .map_err(|e| StoreError::Serialization(format!("booking status: {e}")))?;
    let worker_id: Option<String> = column(row, "worker_id")?;

    Ok(Booking {
        id: BookingId::new(column::<String>(row, "id")?),
        status,
        customer_id: CustomerId::new(column::<String>(row, "customer_id")?),
        worker_id: worker_id.map(WorkerId::new),
        service_id: ServiceId::new(column::<String>(row, "service_id")?),
        price: Money::from_minor(from_db_int("price", column(row, "price_minor")?)?),
        scheduled_at: column::<DateTime<Utc>>(row, "scheduled_at")?,
        version: read_version(row)?,
        intent_log,
    })
}

fn row_to_intent(row: &PgRow) -> Result<Intent, StoreError> {
    let id = IntentId::new(column::<String>(row, "intent_id")?);
    let payload: serde_json::Value = column(row, "payload")?;
    let kind: IntentKind = serde_json::from_value(payload)
        .map_err(|e| StoreError::Serialization(format!("intent {id}: {e}")))?;
    let applied_by: Vec<String> = column(row, "applied_by")?;

    Ok(Intent {
        id,
        booking_id: BookingId::new(column::<String>(row, "booking_id")?),
        kind,
        applied_by: applied_by.into_iter().collect(),
        created_at: column(row, "created_at")?,
    })
}
