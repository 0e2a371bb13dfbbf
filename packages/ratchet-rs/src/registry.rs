//! Event registry: the ledger of event types allowed to be dispatched.
//!
//! The registry maps event type names to reconstruction functions that
//! rebuild a typed event from a worker record's stored JSON payload. The
//! dispatch service consults it to validate dispatch targets; the worker
//! service uses it to re-hydrate queued events at processing time.
//!
//! The registry is an explicitly constructed instance, shared by `Arc` -
//! there is no process-global state. Application wiring registers its
//! event types once at boot, on the main thread, before any dispatch
//! occurs; after that the registry is effectively read-only. [`clear`]
//! exists solely so test teardown can guarantee isolation between cases.
//!
//! [`clear`]: EventRegistry::clear
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ratchet::{register_events, EventRegistry};
//!
//! let registry = Arc::new(EventRegistry::new());
//! register_events!(registry, SendWelcomeEmail, ResizeAvatar);
//! registry.set_initialized();
//!
//! assert!(registry.contains("send_welcome_email"));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, Result};

use crate::core::{Event, EventType};

/// Reconstructs a typed event from a stored JSON payload.
type ReconstructFn = Box<dyn Fn(serde_json::Value) -> Result<Box<dyn Event>> + Send + Sync>;

struct EventEntry {
    reconstruct: ReconstructFn,
}

/// Ledger of registered event types, keyed by their stable names.
///
/// Registration is idempotent: registering the same type twice leaves a
/// single entry and keeps the first reconstruction function.
#[derive(Default)]
pub struct EventRegistry {
    entries: RwLock<HashMap<&'static str, EventEntry>>,
    initialized: AtomicBool,
}

impl EventRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event type under its stable name.
    ///
    /// A no-op if the name is already registered.
    pub fn register<E: EventType>(&self) {
        let mut entries = self.entries.write().expect("event registry lock poisoned");
        entries.entry(E::NAME).or_insert_with(|| EventEntry {
            reconstruct: Box::new(|payload| {
                let event: E = serde_json::from_value(payload)
                    .map_err(|e| anyhow!("failed to deserialize event {}: {}", E::NAME, e))?;
                Ok(Box::new(event) as Box<dyn Event>)
            }),
        });
    }

    /// Check whether a type name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .expect("event registry lock poisoned")
            .contains_key(name)
    }

    /// Rebuild a typed event from its registered name and stored payload.
    ///
    /// Returns an error if the name is not registered or the payload does
    /// not deserialize into the registered type.
    pub fn reconstruct(&self, name: &str, payload: serde_json::Value) -> Result<Box<dyn Event>> {
        let entries = self.entries.read().expect("event registry lock poisoned");
        let entry = entries
            .get(name)
            .ok_or_else(|| anyhow!("unknown event type: {}", name))?;
        (entry.reconstruct)(payload)
    }

    /// All registered type names, for introspection and testing.
    pub fn event_names(&self) -> Vec<&'static str> {
        self.entries
            .read()
            .expect("event registry lock poisoned")
            .keys()
            .copied()
            .collect()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .expect("event registry lock poisoned")
            .len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One-shot boot flag: whether built-in registration has already run.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Mark built-in registration as done.
    pub fn set_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    /// Reset the registration list and the boot flag.
    ///
    /// Test teardown only.
    pub fn clear(&self) {
        self.entries
            .write()
            .expect("event registry lock poisoned")
            .clear();
        self.initialized.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("event_names", &self.event_names())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Registers several event types on a registry in one statement.
///
/// # Example
///
/// ```ignore
/// use ratchet::register_events;
///
/// register_events!(registry, SendWelcomeEmail, ResizeAvatar, SyncContacts);
/// ```
#[macro_export]
macro_rules! register_events {
    ($registry:expr, $($event:ty),+ $(,)?) => {
        $(
            $registry.register::<$event>();
        )+
    };
}

pub use register_events;
