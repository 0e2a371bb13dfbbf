//! Worker service: drains the pending queue and settles every record.
//!
//! One [`run`](WorkerService::run) invocation fetches the pending records
//! for a queue (already FIFO by `created_at`) and processes them strictly
//! sequentially - each record is fully resolved (deleted on success,
//! attempt-incremented, or promoted to the failed store) before the next
//! is touched. Per-record errors are absorbed into that bookkeeping and
//! never cross the loop's boundary, so one bad record can never block or
//! crash the batch.
//!
//! ```text
//! run(options)
//!     │
//!     ├─ sleep(run_after_seconds)           (optional pre-loop delay)
//!     ├─ store.pending_workers(queue)       (oldest first)
//!     │      └─ empty ──► log "no queued items", return
//!     └─ for each record, in order:
//!            ├─ reconstruct event from registry by name
//!            ├─ execute()                   (panics absorbed like errors)
//!            ├─ ok   ──► delete record
//!            └─ err  ──► attempts += 1, persist
//!                        └─ attempts >= retries ──► write failed record,
//!                                                   delete pending record
//! ```
//!
//! The engine does not schedule itself: a CLI invocation or supervisor
//! calls [`run`](WorkerService::run) (or the polling
//! [`run_loop`](WorkerService::run_loop)) and decides whether to call
//! again. `run_once` is that caller-level signal, not an engine-enforced
//! cancellation; there is no per-record timeout.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::core::DEFAULT_QUEUE;
use crate::record::{FailedWorkerRecord, WorkerFailure, WorkerRecord};
use crate::registry::EventRegistry;
use crate::store::WorkerStore;

/// Options for one worker run.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Logical partition to drain.
    pub queue_name: String,
    /// Fallback retry ceiling for records that carry no positive ceiling
    /// of their own. The record's own `retries` wins when present.
    pub retries: i32,
    /// Signals the caller (and `run_loop`) not to reschedule after one
    /// pass.
    pub run_once: bool,
    /// Coarse delay before any work, in seconds.
    pub run_after_seconds: Option<u64>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            queue_name: DEFAULT_QUEUE.to_string(),
            retries: 3,
            run_once: false,
            run_after_seconds: None,
        }
    }
}

impl WorkerOptions {
    /// Options draining the given queue, with defaults otherwise.
    pub fn for_queue(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            ..Default::default()
        }
    }

    /// Set the fallback retry ceiling.
    pub fn with_retries(mut self, retries: i32) -> Self {
        self.retries = retries;
        self
    }

    /// Mark this run as one-shot.
    pub fn with_run_once(mut self, run_once: bool) -> Self {
        self.run_once = run_once;
        self
    }

    /// Set the pre-loop delay in seconds.
    pub fn with_run_after_seconds(mut self, seconds: u64) -> Self {
        self.run_after_seconds = Some(seconds);
        self
    }
}

/// Drains pending worker records: executes due work and manages the
/// attempt/failure bookkeeping.
pub struct WorkerService {
    store: Arc<dyn WorkerStore>,
    registry: Arc<EventRegistry>,
}

impl WorkerService {
    /// Create a worker over the given store and registry.
    pub fn new(store: Arc<dyn WorkerStore>, registry: Arc<EventRegistry>) -> Self {
        Self { store, registry }
    }

    /// Drain the queue once.
    ///
    /// Returns after the last fetched record has been resolved. An empty
    /// queue is a normal, non-error outcome. Per-record failures are
    /// absorbed into retry/promotion bookkeeping; only a failure to fetch
    /// the batch itself is returned to the caller.
    pub async fn run(&self, options: &WorkerOptions) -> Result<()> {
        if let Some(seconds) = options.run_after_seconds {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
        }

        let records = self
            .store
            .pending_workers(Some(&options.queue_name))
            .await?;

        if records.is_empty() {
            info!(queue = %options.queue_name, "no queued items");
            return Ok(());
        }

        debug!(
            queue = %options.queue_name,
            count = records.len(),
            "fetched pending worker records"
        );

        for record in records {
            self.process_record(record, options.retries).await;
        }

        Ok(())
    }

    /// Poll the queue until shutdown is flagged.
    ///
    /// Runs [`run`](Self::run) on the given interval. Honors
    /// `options.run_once` by returning after the first pass. Fetch
    /// failures are logged and the loop continues on the next tick.
    pub async fn run_loop(
        &self,
        options: &WorkerOptions,
        poll_interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> Result<()> {
        info!(
            queue = %options.queue_name,
            poll_interval_ms = poll_interval.as_millis() as u64,
            "worker loop starting"
        );

        loop {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.run(options).await {
                error!(queue = %options.queue_name, error = %e, "worker run failed");
            }

            if options.run_once {
                break;
            }

            tokio::time::sleep(poll_interval).await;
        }

        info!(queue = %options.queue_name, "worker loop stopped");
        Ok(())
    }

    /// Resolve a single record: success-deletion, attempt increment, or
    /// failure-promotion. Never returns an error.
    async fn process_record(&self, mut record: WorkerRecord, fallback_retries: i32) {
        let record_id = record.id;

        match self.execute_record(&record).await {
            Ok(()) => {
                debug!(record_id = %record_id, event = %record.event_name, "worker record succeeded");
                if let Err(e) = self.store.delete_worker(record_id).await {
                    error!(record_id = %record_id, error = %e, "failed to delete completed worker record");
                }
            }
            Err(e) => {
                record.record_attempt();
                warn!(
                    record_id = %record_id,
                    event = %record.event_name,
                    attempts = record.attempts,
                    retries = record.retries,
                    error = %e,
                    "worker record failed"
                );

                if let Err(update_err) = self.store.update_worker(&record).await {
                    error!(record_id = %record_id, error = %update_err, "failed to persist attempt count");
                }

                let ceiling = if record.retries > 0 {
                    record.retries
                } else {
                    fallback_retries
                };

                if record.attempts >= ceiling {
                    self.promote_to_failed(&record, &e).await;
                }
            }
        }
    }

    /// Terminal transition: write the dead-letter record, then remove the
    /// pending one.
    async fn promote_to_failed(&self, record: &WorkerRecord, error: &anyhow::Error) {
        let failed = FailedWorkerRecord::from_worker(record, WorkerFailure::from_error(error));

        if let Err(e) = self.store.insert_failed_worker(&failed).await {
            // Leave the pending record in place so the work is not lost.
            error!(record_id = %record.id, error = %e, "failed to persist failed worker record");
            return;
        }

        if let Err(e) = self.store.delete_worker(record.id).await {
            error!(record_id = %record.id, error = %e, "failed to delete promoted worker record");
            return;
        }

        warn!(
            record_id = %record.id,
            event = %record.event_name,
            attempts = record.attempts,
            "worker record promoted to failed store"
        );
    }

    /// Reconstruct the record's event and execute it. Panics during
    /// execution are converted into errors so they flow through the same
    /// retry path as any other failure.
    async fn execute_record(&self, record: &WorkerRecord) -> Result<()> {
        let name = record.event_name.trim();
        if name.is_empty() {
            return Err(anyhow!("worker record {} has no event name", record.id));
        }

        let event = self.registry.reconstruct(name, record.payload.clone())?;

        let result = AssertUnwindSafe(event.execute()).catch_unwind().await;
        match result {
            Ok(inner) => inner,
            Err(panic_info) => {
                let panic_msg = extract_panic_message(&panic_info);
                Err(anyhow!("event {} panicked: {}", name, panic_msg))
            }
        }
    }
}

impl std::fmt::Debug for WorkerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerService").finish_non_exhaustive()
    }
}

/// Extract a human-readable message from a panic payload.
fn extract_panic_message(panic_info: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
