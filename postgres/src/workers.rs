//! Read-only worker roster.

use crate::db_error;
use booking_core::store::StoreFuture;
use booking_core::worker::{Worker, WorkerDirectory};
use booking_core::{ServiceId, StoreError, WorkerId};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// Open load is derived from the bookings table rather than stored, so it
/// never drifts from the committed statuses.
const WORKER_SELECT: &str = r"
    SELECT w.id, w.services, w.active, w.capacity,
           (SELECT COUNT(*)
              FROM bookings b
             WHERE b.worker_id = w.id
               AND b.status IN ('assigned', 'accepted', 'in_progress')) AS open_bookings
    FROM workers w
";

/// [`WorkerDirectory`] over the `workers` table.
#[derive(Clone, Debug)]
pub struct PostgresWorkerDirectory {
    pool: PgPool,
}

impl PostgresWorkerDirectory {
    /// Create a directory over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or update a worker's roster entry. `open_bookings` is ignored.
    ///
    /// The roster is owned by the marketplace; this exists for seeding and
    /// tests.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the write fails.
    pub async fn upsert(&self, worker: &Worker) -> Result<(), StoreError> {
        let services: Vec<String> = worker.services.iter().map(|s| s.as_str().to_string()).collect();
        let capacity = i32::try_from(worker.capacity)
            .map_err(|_| StoreError::Serialization(format!("capacity {} too large", worker.capacity)))?;

        sqlx::query(
            r"
            INSERT INTO workers (id, services, active, capacity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET services = EXCLUDED.services,
                active = EXCLUDED.active,
                capacity = EXCLUDED.capacity
            ",
        )
        .bind(worker.id.as_str())
        .bind(services)
        .bind(worker.active)
        .bind(capacity)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("upsert worker", &e))?;

        Ok(())
    }

    async fn fetch(&self, worker_id: &WorkerId) -> Result<Option<Worker>, StoreError> {
        let row = sqlx::query(&format!("{WORKER_SELECT} WHERE w.id = $1"))
            .bind(worker_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("load worker", &e))?;

        row.as_ref().map(row_to_worker).transpose()
    }

    async fn qualified(&self, service_id: &ServiceId) -> Result<Vec<Worker>, StoreError> {
        let rows = sqlx::query(&format!("{WORKER_SELECT} WHERE $1 = ANY(w.services) ORDER BY w.id"))
            .bind(service_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("load candidates", &e))?;

        rows.iter().map(row_to_worker).collect()
    }
}

impl WorkerDirectory for PostgresWorkerDirectory {
    fn get(&self, worker_id: WorkerId) -> StoreFuture<'_, Option<Worker>> {
        Box::pin(async move { self.fetch(&worker_id).await })
    }

    fn candidates(&self, service_id: ServiceId) -> StoreFuture<'_, Vec<Worker>> {
        Box::pin(async move { self.qualified(&service_id).await })
    }
}

fn row_to_worker(row: &PgRow) -> Result<Worker, StoreError> {
    let decode = |e: sqlx::Error| db_error("worker row", &e);
    let id: String = row.try_get("id").map_err(decode)?;
    let services: Vec<String> = row.try_get("services").map_err(decode)?;
    let capacity: i32 = row.try_get("capacity").map_err(decode)?;
    let open: i64 = row.try_get("open_bookings").map_err(decode)?;

    Ok(Worker {
        id: WorkerId::new(id),
        services: services.into_iter().map(ServiceId::new).collect(),
        active: row.try_get("active").map_err(decode)?,
        capacity: u32::try_from(capacity).unwrap_or(0),
        open_bookings: u32::try_from(open).unwrap_or(u32::MAX),
    })
}
