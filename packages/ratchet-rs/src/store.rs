//! Worker store: the single persistence seam for queued work.
//!
//! [`WorkerStore`] is the only component that talks to the underlying
//! persistence engine. The queue driver writes pending records through it,
//! and the worker service reads, updates, deletes, and promotes records
//! through it - neither ever reaches into storage directly.
//!
//! # Implementer notes
//!
//! - `pending_workers` and `failed_workers` must return records in
//!   ascending `created_at` order (oldest first), which is what gives the
//!   worker loop its FIFO fairness across retries.
//! - Multi-process deployments should claim records atomically inside
//!   `pending_workers` (e.g. `FOR UPDATE SKIP LOCKED` with a lease) so two
//!   pollers do not fetch the same record; the PostgreSQL store does this.
//! - `update_worker` persists an incremented attempt counter and must make
//!   the record visible to subsequent polls again.

use anyhow::Result;
use uuid::Uuid;

use crate::record::{FailedWorkerRecord, WorkerRecord};

/// Persistence-backed access to the pending and failed worker stores.
#[async_trait::async_trait]
pub trait WorkerStore: Send + Sync {
    /// Persist a new pending record. Called by the queue driver at
    /// dispatch time.
    async fn insert_worker(&self, record: &WorkerRecord) -> Result<()>;

    /// Persist an updated pending record (attempt counter, timestamps).
    async fn update_worker(&self, record: &WorkerRecord) -> Result<()>;

    /// Remove a pending record, on success or after promotion.
    async fn delete_worker(&self, id: Uuid) -> Result<()>;

    /// All pending records, oldest first. `queue` filters to one logical
    /// partition; `None` scans every partition.
    async fn pending_workers(&self, queue: Option<&str>) -> Result<Vec<WorkerRecord>>;

    /// Persist a promoted dead-letter record.
    async fn insert_failed_worker(&self, record: &FailedWorkerRecord) -> Result<()>;

    /// All failed records, oldest first. Read-only, administrative.
    async fn failed_workers(&self, queue: Option<&str>) -> Result<Vec<FailedWorkerRecord>>;
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! In-memory store for exercising the full dispatch/worker lifecycle
    //! in tests without persistence infrastructure.

    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use uuid::Uuid;

    use crate::record::{FailedWorkerRecord, WorkerRecord};

    use super::WorkerStore;

    /// Mutex-held in-memory implementation of [`WorkerStore`].
    ///
    /// Cloning shares the same underlying state, so tests can keep a
    /// handle for assertions while the driver and worker hold their own.
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryWorkerStore {
        pending: Arc<Mutex<Vec<WorkerRecord>>>,
        failed: Arc<Mutex<Vec<FailedWorkerRecord>>>,
    }

    impl InMemoryWorkerStore {
        /// Create a new empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seed a pending record directly, bypassing dispatch.
        pub fn seed_worker(&self, record: WorkerRecord) -> Uuid {
            let id = record.id;
            self.pending.lock().unwrap().push(record);
            id
        }

        /// Look up a pending record by id.
        pub fn get_worker(&self, id: Uuid) -> Option<WorkerRecord> {
            self.pending
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned()
        }

        /// Look up a failed record by id.
        pub fn get_failed_worker(&self, id: Uuid) -> Option<FailedWorkerRecord> {
            self.failed
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned()
        }

        /// Number of pending records.
        pub fn worker_count(&self) -> usize {
            self.pending.lock().unwrap().len()
        }

        /// Number of failed records.
        pub fn failed_count(&self) -> usize {
            self.failed.lock().unwrap().len()
        }

        /// Clear both stores. Useful between test cases.
        pub fn clear(&self) {
            self.pending.lock().unwrap().clear();
            self.failed.lock().unwrap().clear();
        }
    }

    #[async_trait::async_trait]
    impl WorkerStore for InMemoryWorkerStore {
        async fn insert_worker(&self, record: &WorkerRecord) -> Result<()> {
            self.pending.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn update_worker(&self, record: &WorkerRecord) -> Result<()> {
            let mut pending = self.pending.lock().unwrap();
            if let Some(existing) = pending.iter_mut().find(|r| r.id == record.id) {
                *existing = record.clone();
            }
            Ok(())
        }

        async fn delete_worker(&self, id: Uuid) -> Result<()> {
            self.pending.lock().unwrap().retain(|r| r.id != id);
            Ok(())
        }

        async fn pending_workers(&self, queue: Option<&str>) -> Result<Vec<WorkerRecord>> {
            let mut records: Vec<WorkerRecord> = self
                .pending
                .lock()
                .unwrap()
                .iter()
                .filter(|r| queue.map_or(true, |q| r.queue_name == q))
                .cloned()
                .collect();
            records.sort_by_key(|r| r.created_at);
            Ok(records)
        }

        async fn insert_failed_worker(&self, record: &FailedWorkerRecord) -> Result<()> {
            self.failed.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn failed_workers(&self, queue: Option<&str>) -> Result<Vec<FailedWorkerRecord>> {
            let mut records: Vec<FailedWorkerRecord> = self
                .failed
                .lock()
                .unwrap()
                .iter()
                .filter(|r| queue.map_or(true, |q| r.queue_name == q))
                .cloned()
                .collect();
            records.sort_by_key(|r| r.created_at);
            Ok(records)
        }
    }

}
