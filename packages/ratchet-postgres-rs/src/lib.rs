//! PostgreSQL-backed worker store for the ratchet event engine.
//!
//! Implements [`ratchet::WorkerStore`] over two tables - `workers`
//! (pending) and `failed_workers` (dead-letter) - using `sqlx`. Apply
//! `migrations/0001_create_worker_tables.sql` before first use.
//!
//! # Claiming
//!
//! Fetching pending records claims them atomically: a `FOR UPDATE SKIP
//! LOCKED` subselect stamps a `claimed_until` lease before rows are
//! returned, so concurrent worker processes polling the same queue never
//! fetch the same record. Leases expire, which makes records visible
//! again if the worker that claimed them died; persisting an incremented
//! attempt counter clears the lease so a future poll can retry the
//! record.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ratchet_postgres::PostgresWorkerStore;
//!
//! let store = Arc::new(PostgresWorkerStore::new(pool));
//! let service = EventService::new(registry.clone())
//!     .with_driver_options(QueueDriver::new(store.clone()), options);
//! let worker = WorkerService::new(store, registry);
//! ```

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use ratchet::{FailedWorkerRecord, WorkerRecord, WorkerStore};

/// Row shape of the `workers` table.
///
/// `claimed_until` is a storage-level concern and does not surface on the
/// engine's record model.
#[derive(Debug, Clone, FromRow)]
struct WorkerRow {
    id: Uuid,
    event_name: String,
    queue_name: String,
    payload: serde_json::Value,
    attempts: i32,
    retries: i32,
    #[allow(dead_code)]
    claimed_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WorkerRow> for WorkerRecord {
    fn from(row: WorkerRow) -> Self {
        WorkerRecord {
            id: row.id,
            event_name: row.event_name,
            queue_name: row.queue_name,
            payload: row.payload,
            attempts: row.attempts,
            retries: row.retries,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Row shape of the `failed_workers` table.
#[derive(Debug, Clone, FromRow)]
struct FailedWorkerRow {
    id: Uuid,
    event_name: String,
    queue_name: String,
    payload: serde_json::Value,
    attempts: i32,
    retries: i32,
    error_message: String,
    error_trace: String,
    failed_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FailedWorkerRow> for FailedWorkerRecord {
    fn from(row: FailedWorkerRow) -> Self {
        FailedWorkerRecord {
            id: row.id,
            event_name: row.event_name,
            queue_name: row.queue_name,
            payload: row.payload,
            attempts: row.attempts,
            retries: row.retries,
            message: row.error_message,
            trace: row.error_trace,
            failed_at: row.failed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// PostgreSQL-backed implementation of [`WorkerStore`].
pub struct PostgresWorkerStore {
    pool: PgPool,
    claim_lease_ms: i64,
}

impl PostgresWorkerStore {
    /// Create a store with the default one-minute claim lease.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            claim_lease_ms: 60_000,
        }
    }

    /// Create a store with a custom claim lease duration.
    pub fn with_claim_lease(pool: PgPool, lease_ms: i64) -> Self {
        Self {
            pool,
            claim_lease_ms: lease_ms,
        }
    }

    /// The configured claim lease in milliseconds.
    pub fn claim_lease_ms(&self) -> i64 {
        self.claim_lease_ms
    }
}

#[async_trait]
impl WorkerStore for PostgresWorkerStore {
    async fn insert_worker(&self, record: &WorkerRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workers (id, event_name, queue_name, payload, attempts, retries, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(&record.event_name)
        .bind(&record.queue_name)
        .bind(&record.payload)
        .bind(record.attempts)
        .bind(record.retries)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(record_id = %record.id, queue = %record.queue_name, "inserted worker record");
        Ok(())
    }

    async fn update_worker(&self, record: &WorkerRecord) -> Result<()> {
        // Clearing the lease makes a retried record visible to later polls.
        sqlx::query(
            r#"
            UPDATE workers
            SET attempts = $1,
                retries = $2,
                payload = $3,
                claimed_until = NULL,
                updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(record.attempts)
        .bind(record.retries)
        .bind(&record.payload)
        .bind(record.updated_at)
        .bind(record.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_worker(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM workers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn pending_workers(&self, queue: Option<&str>) -> Result<Vec<WorkerRecord>> {
        let rows = sqlx::query_as::<_, WorkerRow>(
            r#"
            WITH claimed AS (
                UPDATE workers
                SET claimed_until = NOW() + ($2 || ' milliseconds')::INTERVAL,
                    updated_at = NOW()
                WHERE id IN (
                    SELECT id FROM workers
                    WHERE ($1::TEXT IS NULL OR queue_name = $1)
                      AND (claimed_until IS NULL OR claimed_until < NOW())
                    ORDER BY created_at ASC
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING id, event_name, queue_name, payload, attempts, retries,
                          claimed_until, created_at, updated_at
            )
            SELECT id, event_name, queue_name, payload, attempts, retries,
                   claimed_until, created_at, updated_at
            FROM claimed
            ORDER BY created_at ASC
            "#,
        )
        .bind(queue)
        .bind(self.claim_lease_ms.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(WorkerRecord::from).collect())
    }

    async fn insert_failed_worker(&self, record: &FailedWorkerRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO failed_workers (id, event_name, queue_name, payload, attempts, retries,
                                        error_message, error_trace, failed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(&record.event_name)
        .bind(&record.queue_name)
        .bind(&record.payload)
        .bind(record.attempts)
        .bind(record.retries)
        .bind(&record.message)
        .bind(&record.trace)
        .bind(record.failed_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(record_id = %record.id, event = %record.event_name, "inserted failed worker record");
        Ok(())
    }

    async fn failed_workers(&self, queue: Option<&str>) -> Result<Vec<FailedWorkerRecord>> {
        let rows = sqlx::query_as::<_, FailedWorkerRow>(
            r#"
            SELECT id, event_name, queue_name, payload, attempts, retries,
                   error_message, error_trace, failed_at, created_at, updated_at
            FROM failed_workers
            WHERE ($1::TEXT IS NULL OR queue_name = $1)
            ORDER BY created_at ASC
            "#,
        )
        .bind(queue)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FailedWorkerRecord::from).collect())
    }
}

impl std::fmt::Debug for PostgresWorkerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresWorkerStore")
            .field("claim_lease_ms", &self.claim_lease_ms)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_row_conversion() {
        let now = Utc::now();
        let row = WorkerRow {
            id: Uuid::now_v7(),
            event_name: "send_welcome_email".to_string(),
            queue_name: "default".to_string(),
            payload: serde_json::json!({ "user_id": "u1" }),
            attempts: 1,
            retries: 3,
            claimed_until: Some(now),
            created_at: now,
            updated_at: now,
        };
        let id = row.id;

        let record = WorkerRecord::from(row);
        assert_eq!(record.id, id);
        assert_eq!(record.event_name, "send_welcome_email");
        assert_eq!(record.attempts, 1);
        assert_eq!(record.retries, 3);
        assert_eq!(record.payload, serde_json::json!({ "user_id": "u1" }));
    }

    #[test]
    fn test_failed_worker_row_conversion() {
        let now = Utc::now();
        let row = FailedWorkerRow {
            id: Uuid::now_v7(),
            event_name: "send_welcome_email".to_string(),
            queue_name: "default".to_string(),
            payload: serde_json::Value::Null,
            attempts: 3,
            retries: 3,
            error_message: "smtp unreachable".to_string(),
            error_trace: "smtp unreachable\ncaused by: timeout".to_string(),
            failed_at: now,
            created_at: now,
            updated_at: now,
        };

        let record = FailedWorkerRecord::from(row);
        assert_eq!(record.message, "smtp unreachable");
        assert!(record.trace.contains("timeout"));
        assert_eq!(record.attempts, 3);
    }
}
