//! Delivery drivers: pluggable strategies behind one dispatch contract.
//!
//! A driver turns a dispatch call into either immediate execution or
//! durable enqueuing:
//!
//! - [`SyncDriver`] runs `event.execute()` in the caller's context. No
//!   persistence, no retry; failure propagates synchronously. Meant for
//!   low-latency, best-effort events - in-test assertions, fire-and-forget
//!   notifications.
//! - [`QueueDriver`] persists a worker record and returns. The event's
//!   side effects have *not* run when dispatch returns; decoupling "the
//!   caller asked for this" from "it actually happened" is what makes the
//!   retry semantics possible.
//!
//! Drivers receive their dependencies at construction and their configured
//! options bag as explicit context on each dispatch - there is no
//! post-construction wiring.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::config::QueueDriverOptions;
use crate::core::{Event, QUEUE_DRIVER, SYNC_DRIVER};
use crate::record::WorkerRecord;
use crate::store::WorkerStore;

/// A pluggable delivery strategy, selected by name at dispatch time.
#[async_trait::async_trait]
pub trait Driver: Send + Sync {
    /// The name the driver is selected by.
    fn name(&self) -> &'static str;

    /// Deliver one event. `options` is the bag configured for this driver
    /// in the dispatch service; validation of its shape is the driver's
    /// responsibility.
    async fn dispatch(&self, event: &dyn Event, options: &serde_json::Value) -> Result<()>;
}

/// Executes events inline, in the dispatch caller's context.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncDriver;

impl SyncDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Driver for SyncDriver {
    fn name(&self) -> &'static str {
        SYNC_DRIVER
    }

    async fn dispatch(&self, event: &dyn Event, _options: &serde_json::Value) -> Result<()> {
        event.execute().await
    }
}

/// Persists events as pending worker records for out-of-band execution.
pub struct QueueDriver {
    store: Arc<dyn WorkerStore>,
}

impl QueueDriver {
    /// Create a queue driver writing through the given store.
    pub fn new(store: Arc<dyn WorkerStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Driver for QueueDriver {
    fn name(&self) -> &'static str {
        QUEUE_DRIVER
    }

    async fn dispatch(&self, event: &dyn Event, options: &serde_json::Value) -> Result<()> {
        // Options are validated before anything is persisted; a bad bag
        // aborts the dispatch with no record left behind.
        let options = QueueDriverOptions::from_value(options)?;

        let record = WorkerRecord::for_event(event, options.retries);
        self.store.insert_worker(&record).await?;

        debug!(
            record_id = %record.id,
            event = %record.event_name,
            queue = %record.queue_name,
            retries = record.retries,
            "queued worker record"
        );

        Ok(())
    }
}

impl std::fmt::Debug for QueueDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueDriver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::{Deserialize, Serialize};

    use crate::core::EventType;
    use crate::error::RatchetError;
    use crate::store::testing::InMemoryWorkerStore;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct CountedEvent {
        #[serde(skip)]
        calls: Option<Arc<AtomicUsize>>,
    }

    #[async_trait::async_trait]
    impl Event for CountedEvent {
        fn name(&self) -> &'static str {
            Self::NAME
        }

        fn payload(&self) -> serde_json::Value {
            serde_json::json!({})
        }

        async fn execute(&self) -> Result<()> {
            if let Some(calls) = &self.calls {
                calls.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        }
    }

    impl EventType for CountedEvent {
        const NAME: &'static str = "counted_event";
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct WelcomeEmail {
        user_id: String,
    }

    #[async_trait::async_trait]
    impl Event for WelcomeEmail {
        fn name(&self) -> &'static str {
            Self::NAME
        }

        fn driver_name(&self) -> &str {
            QUEUE_DRIVER
        }

        fn payload(&self) -> serde_json::Value {
            serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
        }

        async fn execute(&self) -> Result<()> {
            Ok(())
        }
    }

    impl EventType for WelcomeEmail {
        const NAME: &'static str = "send_welcome_email";
    }

    fn queue_options() -> serde_json::Value {
        serde_json::json!({
            "queue_name": "default",
            "retries": 2,
            "run_after_seconds": 0
        })
    }

    #[tokio::test]
    async fn test_sync_driver_executes_inline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let event = CountedEvent {
            calls: Some(calls.clone()),
        };

        SyncDriver::new()
            .dispatch(&event, &serde_json::Value::Null)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_sync_driver_propagates_failure() {
        #[derive(Debug)]
        struct FailingEvent;

        #[async_trait::async_trait]
        impl Event for FailingEvent {
            fn name(&self) -> &'static str {
                "failing_event"
            }

            fn payload(&self) -> serde_json::Value {
                serde_json::Value::Null
            }

            async fn execute(&self) -> Result<()> {
                Err(anyhow::anyhow!("smtp unreachable"))
            }
        }

        let result = SyncDriver::new()
            .dispatch(&FailingEvent, &serde_json::Value::Null)
            .await;

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("smtp unreachable"));
    }

    #[tokio::test]
    async fn test_queue_driver_persists_one_record() {
        let store = InMemoryWorkerStore::new();
        let driver = QueueDriver::new(Arc::new(store.clone()));

        let event = WelcomeEmail {
            user_id: "u1".to_string(),
        };
        driver.dispatch(&event, &queue_options()).await.unwrap();

        let pending = store.pending_workers(None).await.unwrap();
        assert_eq!(pending.len(), 1);

        let record = &pending[0];
        assert_eq!(record.event_name, "send_welcome_email");
        assert_eq!(record.queue_name, "default");
        assert_eq!(record.attempts, 0);
        assert_eq!(record.retries, 2);
        assert_eq!(record.payload, serde_json::json!({ "user_id": "u1" }));
    }

    #[tokio::test]
    async fn test_queue_driver_does_not_execute() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = InMemoryWorkerStore::new();
        let driver = QueueDriver::new(Arc::new(store.clone()));

        let event = CountedEvent {
            calls: Some(calls.clone()),
        };
        driver.dispatch(&event, &queue_options()).await.unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert_eq!(store.worker_count(), 1);
    }

    #[tokio::test]
    async fn test_queue_driver_rejects_bad_options_without_persisting() {
        let store = InMemoryWorkerStore::new();
        let driver = QueueDriver::new(Arc::new(store.clone()));

        let event = WelcomeEmail {
            user_id: "u1".to_string(),
        };
        let result = driver
            .dispatch(&event, &serde_json::json!({ "queue_name": "default" }))
            .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RatchetError>(),
            Some(RatchetError::InvalidDriverOptions { .. })
        ));
        assert_eq!(store.worker_count(), 0);
    }
}
