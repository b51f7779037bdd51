//! PostgreSQL implementation of WorkItemStore
//!
//! Items live in the `work_items` table (see `migrations/`):
//! - Pending scans use the `(status, id)` index
//! - Each chunk write runs in its own transaction

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};

use super::store::*;
use crate::item::{ItemStatus, PartitionRange, WorkItem};

/// PostgreSQL implementation of WorkItemStore
///
/// Uses a connection pool shared by all partition workers; size the pool to
/// at least the configured thread count.
///
/// # Example
///
/// ```ignore
/// use chunkwise_batch::PostgresWorkItemStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/batch").await?;
/// let store = PostgresWorkItemStore::new(pool);
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresWorkItemStore {
    pool: PgPool,
}

impl PostgresWorkItemStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                StoreError::Database(e.to_string())
            })
    }
}

fn db_error(context: &str, e: sqlx::Error) -> StoreError {
    error!("{}: {}", context, e);
    StoreError::Database(e.to_string())
}

fn row_to_item(row: &PgRow) -> Result<WorkItem, StoreError> {
    let status: String = row.get("status");
    let status = ItemStatus::parse(&status)
        .ok_or_else(|| StoreError::Serialization(format!("unknown item status: {status}")))?;
    let retry_count: i32 = row.get("retry_count");

    Ok(WorkItem {
        id: row.get("id"),
        payload: row.get("payload"),
        status,
        error_message: row.get("error_message"),
        retry_count: u32::try_from(retry_count).map_err(|_| {
            StoreError::Serialization(format!("negative retry_count: {retry_count}"))
        })?,
        completed_at: row.get::<Option<DateTime<Utc>>, _>("completed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl WorkItemStore for PostgresWorkItemStore {
    #[instrument(skip(self))]
    async fn count_pending(&self) -> Result<u64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS pending FROM work_items WHERE status = 'pending'
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to count pending items", e))?;

        Ok(row.get::<i64, _>("pending") as u64)
    }

    #[instrument(skip(self))]
    async fn min_max_pending_id(&self) -> Result<Option<(i64, i64)>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT MIN(id) AS min_id, MAX(id) AS max_id
            FROM work_items
            WHERE status = 'pending'
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to query pending id bounds", e))?;

        let min_id: Option<i64> = row.get("min_id");
        let max_id: Option<i64> = row.get("max_id");
        Ok(min_id.zip(max_id))
    }

    #[instrument(skip(self))]
    async fn read_pending(
        &self,
        range: Option<&PartitionRange>,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<WorkItem>, StoreError> {
        let (min_id, max_id) = range
            .map(|r| (r.min_id, r.max_id))
            .unwrap_or((i64::MIN, i64::MAX));

        let rows = sqlx::query(
            r#"
            SELECT id, payload, status, error_message, retry_count,
                   completed_at, created_at, updated_at
            FROM work_items
            WHERE status = 'pending'
              AND id BETWEEN $1 AND $2
            ORDER BY id ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(min_id)
        .bind(max_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to read pending items", e))?;

        rows.iter().map(row_to_item).collect()
    }

    #[instrument(skip(self, items), fields(items = items.len()))]
    async fn write_all(&self, items: &[WorkItem]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin chunk transaction", e))?;

        for item in items {
            let retry_count = i32::try_from(item.retry_count).map_err(|_| {
                StoreError::Serialization(format!("retry_count overflow: {}", item.retry_count))
            })?;

            let result = sqlx::query(
                r#"
                UPDATE work_items
                SET status = $2,
                    error_message = $3,
                    retry_count = $4,
                    completed_at = $5,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(item.id)
            .bind(item.status.as_str())
            .bind(&item.error_message)
            .bind(retry_count)
            .bind(item.completed_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to update work item", e))?;

            // Dropping the transaction rolls back the rows already updated
            if result.rows_affected() == 0 {
                return Err(StoreError::ItemNotFound(item.id));
            }
        }

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit chunk", e))?;

        debug!(items = items.len(), "committed chunk");
        Ok(())
    }

    #[instrument(skip(self, payloads), fields(items = payloads.len()))]
    async fn insert_pending(
        &self,
        payloads: Vec<serde_json::Value>,
    ) -> Result<Vec<i64>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin insert transaction", e))?;

        let mut ids = Vec::with_capacity(payloads.len());
        for payload in &payloads {
            let row = sqlx::query(
                r#"
                INSERT INTO work_items (payload, status)
                VALUES ($1, 'pending')
                RETURNING id
                "#,
            )
            .bind(payload)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to insert work item", e))?;
            ids.push(row.get::<i64, _>("id"));
        }

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit inserts", e))?;

        Ok(ids)
    }

    #[instrument(skip(self))]
    async fn status_counts(
        &self,
        window: Option<UpdatedWindow>,
    ) -> Result<StatusCounts, StoreError> {
        let rows = match window {
            Some(window) => sqlx::query(
                r#"
                SELECT status, COUNT(*) AS total
                FROM work_items
                WHERE updated_at BETWEEN $1 AND $2
                GROUP BY status
                "#,
            )
            .bind(window.from)
            .bind(window.to)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query(
                r#"
                SELECT status, COUNT(*) AS total
                FROM work_items
                GROUP BY status
                "#,
            )
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(|e| db_error("Failed to count items by status", e))?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let status: String = row.get("status");
            let total = row.get::<i64, _>("total") as u64;
            match ItemStatus::parse(&status) {
                Some(ItemStatus::Pending) => counts.pending = total,
                Some(ItemStatus::Success) => counts.success = total,
                Some(ItemStatus::Failed) => counts.failed = total,
                None => {
                    return Err(StoreError::Serialization(format!(
                        "unknown item status: {status}"
                    )))
                }
            }
        }
        Ok(counts)
    }

    #[instrument(skip(self))]
    async fn list_by_status(&self, status: ItemStatus) -> Result<Vec<WorkItem>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, payload, status, error_message, retry_count,
                   completed_at, created_at, updated_at
            FROM work_items
            WHERE status = $1
            ORDER BY id ASC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list items by status", e))?;

        rows.iter().map(row_to_item).collect()
    }

    #[instrument(skip(self))]
    async fn reset_all_to_pending(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET status = 'pending',
                error_message = NULL,
                retry_count = 0,
                completed_at = NULL,
                updated_at = NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to reset work items", e))?;

        Ok(result.rows_affected())
    }
}
