//! End-to-end lifecycle tests: dispatch through the queue driver, drain
//! with the worker service, and observe the pending/failed stores.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::{Event, EventType, QUEUE_DRIVER};
use crate::dispatch::EventService;
use crate::driver::{QueueDriver, SyncDriver};
use crate::registry::EventRegistry;
use crate::store::testing::InMemoryWorkerStore;
use crate::store::WorkerStore;
use crate::worker::{WorkerOptions, WorkerService};

/// The concrete scenario's event: queued, payload `{ "user_id": "u1" }`,
/// fails every execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SendWelcomeEmail {
    user_id: String,
}

#[async_trait::async_trait]
impl Event for SendWelcomeEmail {
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
        Err(anyhow::anyhow!("smtp relay rejected {}", self.user_id))
    }
}

impl EventType for SendWelcomeEmail {
    const NAME: &'static str = "send_welcome_email";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RefreshCache {
    entry: String,
}

#[async_trait::async_trait]
impl Event for RefreshCache {
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

impl EventType for RefreshCache {
    const NAME: &'static str = "refresh_cache";
}

fn engine(
    retries: i32,
) -> (
    Arc<EventRegistry>,
    InMemoryWorkerStore,
    EventService,
    WorkerService,
) {
    let registry = Arc::new(EventRegistry::new());
    crate::register_events!(registry, SendWelcomeEmail, RefreshCache);
    registry.set_initialized();

    let store = InMemoryWorkerStore::new();
    let service = EventService::new(registry.clone())
        .with_driver(SyncDriver)
        .with_driver_options(
            QueueDriver::new(Arc::new(store.clone())),
            serde_json::json!({
                "queue_name": "default",
                "retries": retries,
                "run_after_seconds": 0
            }),
        );
    let worker = WorkerService::new(Arc::new(store.clone()), registry.clone());

    (registry, store, service, worker)
}

#[tokio::test]
async fn test_welcome_email_exhausts_two_retries() {
    let (_registry, store, service, worker) = engine(2);

    service
        .dispatch(&SendWelcomeEmail {
            user_id: "u1".to_string(),
        })
        .await
        .unwrap();

    // Exactly one pending record, untouched by execution.
    let pending = store.pending_workers(Some("default")).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 0);
    assert_eq!(pending[0].event_name, "send_welcome_email");
    assert_eq!(pending[0].payload, serde_json::json!({ "user_id": "u1" }));

    // Two consecutive failing runs exhaust the budget.
    let options = WorkerOptions::default().with_run_after_seconds(0);
    worker.run(&options).await.unwrap();
    worker.run(&options).await.unwrap();

    assert_eq!(store.worker_count(), 0);

    let failed = store.failed_workers(Some("default")).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempts, 2);
    assert!(!failed[0].message.is_empty());
    assert!(failed[0].message.contains("u1"));
    assert!(!failed[0].trace.is_empty());
}

#[tokio::test]
async fn test_successful_queued_event_leaves_no_trace() {
    let (_registry, store, service, worker) = engine(3);

    service
        .dispatch(&RefreshCache {
            entry: "popular-posts".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(store.worker_count(), 1);

    worker.run(&WorkerOptions::default()).await.unwrap();

    assert_eq!(store.worker_count(), 0);
    assert_eq!(store.failed_count(), 0);
}

#[tokio::test]
async fn test_record_survives_failures_below_the_ceiling() {
    let (_registry, store, service, worker) = engine(3);

    service
        .dispatch(&SendWelcomeEmail {
            user_id: "u2".to_string(),
        })
        .await
        .unwrap();

    worker.run(&WorkerOptions::default()).await.unwrap();
    worker.run(&WorkerOptions::default()).await.unwrap();

    // Two of three attempts spent: still pending, nothing dead-lettered.
    let pending = store.pending_workers(None).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 2);
    assert_eq!(store.failed_count(), 0);
}

#[tokio::test]
async fn test_mocked_event_never_reaches_the_queue() {
    let (_registry, store, service, _worker) = engine(2);

    service.mock_event::<SendWelcomeEmail>();
    service
        .dispatch(&SendWelcomeEmail {
            user_id: "u3".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(store.worker_count(), 0);
    assert!(service.assert_dispatched::<SendWelcomeEmail, _>(|p| p["user_id"] == "u3"));
}

#[tokio::test]
async fn test_registry_clear_makes_dispatch_fail_again() {
    let (registry, _store, service, _worker) = engine(2);

    registry.clear();

    let err = service
        .dispatch(&RefreshCache {
            entry: "x".to_string(),
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("refresh_cache"));
}

#[tokio::test]
async fn test_sync_events_bypass_the_store_entirely() {
    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Inline {
        #[serde(skip)]
        calls: Option<Arc<AtomicUsize>>,
    }

    #[async_trait::async_trait]
    impl Event for Inline {
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

    impl EventType for Inline {
        const NAME: &'static str = "inline";
    }

    let (registry, store, service, _worker) = engine(2);
    registry.register::<Inline>();

    let calls = Arc::new(AtomicUsize::new(0));
    service
        .dispatch(&Inline {
            calls: Some(calls.clone()),
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(store.worker_count(), 0);
}
