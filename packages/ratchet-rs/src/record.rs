//! Worker record models: the durable representation of queued work.
//!
//! A [`WorkerRecord`] is one pending unit of work: the registered event
//! name, its serialized payload, the retry ceiling fixed at dispatch time,
//! and the attempt counter the worker service advances on failure. A
//! [`FailedWorkerRecord`] is its terminal counterpart, written exactly once
//! when the retry budget is exhausted and never mutated afterward.
//!
//! A logical unit of work lives in exactly one of the two stores at any
//! time - pending or failed - and once enqueued it always ends in
//! success-deletion or failure-promotion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::core::Event;

/// A pending unit of queued work.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct WorkerRecord {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,

    /// Registered event type name, used to reconstruct the event at
    /// processing time.
    pub event_name: String,

    /// Logical partition, used for filtering and monitoring.
    #[builder(default = crate::core::DEFAULT_QUEUE.to_string())]
    pub queue_name: String,

    /// Serialized event payload. Round-trips through JSON semantics.
    #[builder(default = serde_json::Value::Null)]
    pub payload: serde_json::Value,

    /// Completed failed tries. Starts at 0, incremented once per failure.
    #[builder(default = 0)]
    pub attempts: i32,

    /// Retry ceiling configured at dispatch time. Once `attempts >=
    /// retries` the record is terminal.
    #[builder(default = 3)]
    pub retries: i32,

    /// Defines FIFO processing order.
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,

    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl WorkerRecord {
    /// Build the record persisted by the queue driver for a dispatched
    /// event: payload and names taken from the event, `attempts` at zero.
    pub fn for_event(event: &dyn Event, retries: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            event_name: event.name().to_string(),
            queue_name: event.queue_name().to_string(),
            payload: event.payload(),
            attempts: 0,
            retries,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the retry budget is exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.retries
    }

    /// Record one completed failed try and refresh `updated_at`.
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
        self.updated_at = Utc::now();
    }
}

/// Error captured at the moment a record's retries were exhausted.
///
/// Kept as two fields - the human-readable message and the full error
/// chain rendering - so failed records are greppable and structured log
/// ingestion does not have to split a concatenated string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub message: String,
    pub trace: String,
}

impl WorkerFailure {
    /// Capture an error's message and its full chain rendering.
    pub fn from_error(error: &anyhow::Error) -> Self {
        Self {
            message: error.to_string(),
            trace: format!("{:?}", error),
        }
    }
}

/// A permanently failed unit of work: the dead-letter record.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct FailedWorkerRecord {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,

    pub event_name: String,

    #[builder(default = crate::core::DEFAULT_QUEUE.to_string())]
    pub queue_name: String,

    #[builder(default = serde_json::Value::Null)]
    pub payload: serde_json::Value,

    /// Attempts accumulated before promotion.
    pub attempts: i32,

    pub retries: i32,

    /// Error message captured when retries were exhausted.
    pub message: String,

    /// Full error chain rendering captured alongside the message.
    pub trace: String,

    /// When the record was promoted to the failed store.
    #[builder(default = Utc::now())]
    pub failed_at: DateTime<Utc>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,

    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl FailedWorkerRecord {
    /// Promote a pending record, carrying over its identity, payload, and
    /// accumulated counters.
    pub fn from_worker(record: &WorkerRecord, failure: WorkerFailure) -> Self {
        Self {
            id: record.id,
            event_name: record.event_name.clone(),
            queue_name: record.queue_name.clone(),
            payload: record.payload.clone(),
            attempts: record.attempts,
            retries: record.retries,
            message: failure.message,
            trace: failure.trace,
            failed_at: Utc::now(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
