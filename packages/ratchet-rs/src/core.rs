//! Core traits for dispatchable events.
//!
//! # Overview
//!
//! An [`Event`] is a named, payload-carrying unit of intent: something that
//! should happen. Events are raised through the
//! [`EventService`](crate::EventService), which routes them to a delivery
//! driver by name:
//!
//! - the **sync** driver executes the event inline, in the caller's context
//! - the **queue** driver persists a worker record and returns; an
//!   out-of-band [`WorkerService`](crate::WorkerService) executes it later
//!
//! Listeners and subscribers - types whose semantics are "react to"
//! rather than "make happen" - are structurally identical to events for
//! dispatch and registry purposes; they implement the same traits.
//!
//! # Two traits
//!
//! [`Event`] is object-safe so the service, drivers, and worker can handle
//! `&dyn Event` / `Box<dyn Event>`. [`EventType`] adds the statically-known
//! `NAME` and a `DeserializeOwned` bound, which is what registration and
//! queue-side reconstruction need: a record's stored payload round-trips
//! through `serde_json::from_value::<E>` to rebuild the event.
//!
//! # Example
//!
//! ```ignore
//! use ratchet::{Event, EventType, QUEUE_DRIVER};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct SendWelcomeEmail {
//!     user_id: String,
//! }
//!
//! #[ratchet::async_trait]
//! impl Event for SendWelcomeEmail {
//!     fn name(&self) -> &'static str {
//!         Self::NAME
//!     }
//!
//!     fn driver_name(&self) -> &str {
//!         QUEUE_DRIVER
//!     }
//!
//!     fn payload(&self) -> serde_json::Value {
//!         serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
//!     }
//!
//!     async fn execute(&self) -> anyhow::Result<()> {
//!         // send the email
//!         Ok(())
//!     }
//! }
//!
//! impl EventType for SendWelcomeEmail {
//!     const NAME: &'static str = "send_welcome_email";
//! }
//! ```

use anyhow::Result;
use serde::de::DeserializeOwned;

use crate::error::RatchetError;

/// Logical queue partition used when no queue is named at construction.
pub const DEFAULT_QUEUE: &str = "default";

/// Name of the synchronous, execute-inline driver.
pub const SYNC_DRIVER: &str = "sync";

/// Name of the durable, queue-backed driver.
pub const QUEUE_DRIVER: &str = "queue";

/// A named, payload-carrying unit of intent.
///
/// Events are created by application code immediately before dispatch and
/// discarded after [`execute`](Event::execute) completes (sync path) or
/// after being re-hydrated from a worker record (queued path). They carry
/// no identity of their own - durability lives in the worker record, not
/// the event.
#[async_trait::async_trait]
pub trait Event: std::fmt::Debug + Send + Sync + 'static {
    /// Stable type identifier. Used for registry lookup and to reconstruct
    /// the event from a worker record. Must not change once records exist
    /// in the queue.
    fn name(&self) -> &'static str;

    /// Logical partition the event is persisted under when queued.
    fn queue_name(&self) -> &str {
        DEFAULT_QUEUE
    }

    /// The delivery driver this event is routed to.
    fn driver_name(&self) -> &str {
        SYNC_DRIVER
    }

    /// Serialized payload carried through dispatch.
    ///
    /// Anything that round-trips through JSON semantics is valid:
    /// objects, arrays, strings, numbers, booleans, or null.
    fn payload(&self) -> serde_json::Value;

    /// Payload self-validation hook, checked at dispatch time before any
    /// driver is invoked. The default accepts everything.
    fn validate(&self) -> Result<(), RatchetError> {
        Ok(())
    }

    /// The event's side effects.
    ///
    /// Invoked inline by the sync driver, or by the worker service after
    /// reconstruction from a persisted record.
    async fn execute(&self) -> Result<()>;
}

/// A statically-named event type, required for registration.
///
/// `NAME` must equal what [`Event::name`] returns for every instance;
/// registration and reconstruction key off it without an instance in hand.
pub trait EventType: Event + DeserializeOwned {
    /// Stable type identifier, shared with [`Event::name`].
    const NAME: &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    #[async_trait::async_trait]
    impl Event for Ping {
        fn name(&self) -> &'static str {
            Self::NAME
        }

        fn payload(&self) -> serde_json::Value {
            serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
        }

        async fn execute(&self) -> Result<()> {
            Ok(())
        }
    }

    impl EventType for Ping {
        const NAME: &'static str = "ping";
    }

    #[test]
    fn test_default_queue_and_driver() {
        let ping = Ping { n: 1 };
        assert_eq!(ping.queue_name(), DEFAULT_QUEUE);
        assert_eq!(ping.driver_name(), SYNC_DRIVER);
        assert_eq!(ping.name(), "ping");
    }

    #[test]
    fn test_payload_round_trips() {
        let ping = Ping { n: 7 };
        let payload = ping.payload();
        let back: Ping = serde_json::from_value(payload).unwrap();
        assert_eq!(back.n, 7);
    }

    #[test]
    fn test_validate_defaults_to_ok() {
        let ping = Ping { n: 1 };
        assert!(ping.validate().is_ok());
    }
}
