//! # Ratchet
//!
//! Event dispatch with durable queue-backed workers, bounded retries, and
//! a dead-letter store.
//!
//! ## Core Concepts
//!
//! Application code raises a named [`Event`] through the [`EventService`].
//! The event's driver decides what delivery means:
//!
//! - **sync**: execute the event inline, in the caller's context. Fast,
//!   best-effort, no durability.
//! - **queue**: persist a [`WorkerRecord`] and return immediately. A
//!   [`WorkerService`], invoked out-of-band by a scheduler or CLI, later
//!   reconstructs the event from its registered name and serialized
//!   payload, executes it, and settles the record.
//!
//! ## Architecture
//!
//! ```text
//! Application code
//!     │
//!     ▼ dispatch()
//! EventService ──► EventRegistry (is this type registered?)
//!     │
//!     ├─ mocked? ──► dispatched-events log (tests only)
//!     │
//!     ├─► SyncDriver ───► Event::execute()
//!     │
//!     └─► QueueDriver ──► WorkerStore::insert_worker()
//!                               │
//!                        ┌──────┘
//!                        ▼
//!                WorkerService::run()       (caller-scheduled)
//!                        │
//!                        ├─► reconstruct event via EventRegistry
//!                        ├─► execute()
//!                        ├─ ok  ──► delete record
//!                        └─ err ──► attempts += 1
//!                                   └─ attempts >= retries ──► failed store
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Dispatch validates first** - unregistered types and unknown
//!    drivers fail synchronously; nothing is persisted or executed.
//! 2. **Queued dispatch is fire-and-forget** - the side effects have not
//!    run when `dispatch` returns; durability lives in the worker record.
//! 3. **One record at a time** - a worker run resolves each record fully
//!    before touching the next; a bad record cannot block the batch.
//! 4. **Every record ends somewhere** - success deletes it; exhausting
//!    the retry ceiling promotes it to the failed store. Never both,
//!    never neither.
//! 5. **Worker errors never escape** - failures (including panics) inside
//!    record processing become attempt/promotion bookkeeping, not crashes.
//!
//! ## Delivery guarantees
//!
//! Logical delivery is exactly-once under retry; physical delivery is
//! at-least-once. A crash between an event's side effects and the
//! record's deletion re-executes the event on the next run, so queued
//! event handlers should be idempotent.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ratchet::{
//!     register_events, EventRegistry, EventService, QueueDriver, SyncDriver,
//!     WorkerOptions, WorkerService,
//! };
//!
//! // 1. Register event types once at boot
//! let registry = Arc::new(EventRegistry::new());
//! register_events!(registry, SendWelcomeEmail, ResizeAvatar);
//! registry.set_initialized();
//!
//! // 2. Wire the service with its drivers
//! let store: Arc<dyn ratchet::WorkerStore> = Arc::new(my_store);
//! let service = EventService::new(registry.clone())
//!     .with_driver(SyncDriver)
//!     .with_driver_options(
//!         QueueDriver::new(store.clone()),
//!         serde_json::json!({
//!             "queue_name": "default",
//!             "retries": 3,
//!             "run_after_seconds": 0
//!         }),
//!     );
//!
//! // 3. Raise events
//! service.dispatch(&SendWelcomeEmail { user_id }).await?;
//!
//! // 4. Drain the queue from a scheduled entry point
//! let worker = WorkerService::new(store, registry);
//! worker.run(&WorkerOptions::default()).await?;
//! ```

// Core modules
mod config;
mod core;
mod dispatch;
mod driver;
mod error;
mod record;
mod registry;
mod store;
mod worker;

// Lifecycle tests (test-only)
#[cfg(test)]
mod lifecycle_tests;

// Re-export core traits and constants
pub use crate::core::{Event, EventType, DEFAULT_QUEUE, QUEUE_DRIVER, SYNC_DRIVER};

// Re-export registry types
pub use registry::EventRegistry;

// Re-export configuration types
pub use config::{DriverEntry, QueueDriverOptions};

// Re-export driver types
pub use driver::{Driver, QueueDriver, SyncDriver};

// Re-export dispatch types
pub use dispatch::{DispatchedEvent, EventService};

// Re-export record models
pub use record::{FailedWorkerRecord, WorkerFailure, WorkerRecord};

// Re-export the store seam
pub use store::WorkerStore;

// Re-export the in-memory store (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub use store::testing::InMemoryWorkerStore;

// Re-export worker types
pub use worker::{WorkerOptions, WorkerService};

// Re-export commonly used external types
pub use async_trait::async_trait;
