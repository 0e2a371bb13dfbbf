//! Structured error types for dispatch and driver configuration.
//!
//! `RatchetError` provides pattern-matchable errors instead of generic
//! `anyhow::Error`. Dispatch-time failures (unregistered event, unknown
//! driver, bad driver options, invalid payload) indicate programming or
//! configuration mistakes: they are surfaced synchronously to the caller
//! and are never retried.
//!
//! Worker-loop failures are deliberately *not* represented here - any
//! error raised while reconstructing or executing a queued event is
//! absorbed into the record's attempt/promotion bookkeeping and never
//! crosses the worker's boundary.
//!
//! # Example
//!
//! ```ignore
//! use ratchet::{EventService, RatchetError};
//!
//! let result = service.dispatch(&event).await;
//! if let Err(e) = result {
//!     if let Some(err) = e.downcast_ref::<RatchetError>() {
//!         match err {
//!             RatchetError::EventNotRegistered { name } => {
//!                 eprintln!("unknown event type: {}", name);
//!             }
//!             RatchetError::DriverNotConfigured { name } => {
//!                 eprintln!("no such driver: {}", name);
//!             }
//!             _ => eprintln!("dispatch failed: {}", err),
//!         }
//!     }
//! }
//! ```

use thiserror::Error;

/// Structured error type for dispatch and configuration failures.
///
/// Each variant includes context about what went wrong. All variants are
/// caller-visible and fatal to the dispatch attempt that raised them.
#[derive(Debug, Error)]
pub enum RatchetError {
    /// The event's type name is not present in the event registry.
    #[error("event type {name} is not registered; register it with EventRegistry::register before dispatching")]
    EventNotRegistered {
        /// The unregistered event type name.
        name: String,
    },

    /// No driver with the requested name exists in the service's driver map.
    #[error("no driver named {name} is configured")]
    DriverNotConfigured {
        /// The missing driver name.
        name: String,
    },

    /// The driver's configured options failed schema validation.
    ///
    /// Raised before anything is persisted - a queued dispatch that hits
    /// this error leaves no worker record behind.
    #[error("invalid options for driver {driver}: {message}")]
    InvalidDriverOptions {
        /// The driver whose options were rejected.
        driver: &'static str,
        /// What the validation rejected.
        message: String,
    },

    /// The event's payload failed its own declared validation.
    #[error("invalid payload for event {name}: {message}")]
    InvalidPayload {
        /// The event type name.
        name: String,
        /// What the validation rejected.
        message: String,
    },

    /// A driver is already registered under this name.
    #[error("driver {name} is already registered")]
    DriverAlreadyRegistered {
        /// The duplicated driver name.
        name: &'static str,
    },
}
