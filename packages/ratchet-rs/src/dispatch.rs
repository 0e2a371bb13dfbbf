//! Event dispatch service: validation, driver routing, and test-mode
//! interception.
//!
//! [`EventService`] is the sole way application code raises an event. A
//! dispatch call is validated against the event registry, checked against
//! the mock list, then delegated to the driver named by the event:
//!
//! ```text
//! dispatch(event)
//!     │
//!     ├─ registry lookup ── unknown type ──► EventNotRegistered
//!     ├─ payload validation ── rejected ───► InvalidPayload
//!     ├─ driver lookup ── unknown name ────► DriverNotConfigured
//!     ├─ mocked? ──► record (name, payload) into the log, return
//!     └─ driver.dispatch(event, options)
//! ```
//!
//! There is no in-flight state exposed to callers: sync dispatch is a
//! single step, and a queued dispatch's in-flight state lives in the
//! persisted worker record, not here.
//!
//! # Mock mode
//!
//! Tests can intercept dispatch per event type without touching real
//! drivers:
//!
//! ```ignore
//! service.mock_event::<SendWelcomeEmail>();
//!
//! service.dispatch(&SendWelcomeEmail { user_id: "u1".into() }).await?;
//!
//! assert!(service.assert_dispatched::<SendWelcomeEmail, _>(|payload| {
//!     payload["user_id"] == "u1"
//! }));
//!
//! service.reset_mock_events();
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::DriverEntry;
use crate::core::{Event, EventType};
use crate::driver::Driver;
use crate::error::RatchetError;
use crate::registry::EventRegistry;

/// A dispatch recorded by mock mode instead of being delivered.
#[derive(Debug, Clone)]
pub struct DispatchedEvent {
    /// The event's registered type name.
    pub name: String,
    /// The payload the event carried.
    pub payload: serde_json::Value,
    /// When the dispatch was intercepted.
    pub dispatched_at: DateTime<Utc>,
}

/// Orchestrates event validation, driver selection, and execution.
pub struct EventService {
    registry: Arc<EventRegistry>,
    drivers: HashMap<&'static str, DriverEntry>,
    mocked: Mutex<HashSet<&'static str>>,
    dispatched: Mutex<Vec<DispatchedEvent>>,
}

impl EventService {
    /// Create a service over the given registry, with no drivers
    /// configured yet.
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        Self {
            registry,
            drivers: HashMap::new(),
            mocked: Mutex::new(HashSet::new()),
            dispatched: Mutex::new(Vec::new()),
        }
    }

    /// Register a driver with no options.
    ///
    /// # Panics
    ///
    /// Panics if a driver with the same name is already registered.
    /// Use `try_with_driver` for a non-panicking version.
    pub fn with_driver<D: Driver + 'static>(self, driver: D) -> Self {
        self.with_driver_options(driver, serde_json::Value::Null)
    }

    /// Register a driver together with its options bag.
    ///
    /// # Panics
    ///
    /// Panics if a driver with the same name is already registered.
    pub fn with_driver_options<D: Driver + 'static>(
        self,
        driver: D,
        options: serde_json::Value,
    ) -> Self {
        self.try_with_driver_options(driver, options)
            .unwrap_or_else(|e| panic!("{}", e))
    }

    /// Non-panicking driver registration.
    pub fn try_with_driver<D: Driver + 'static>(self, driver: D) -> Result<Self, RatchetError> {
        self.try_with_driver_options(driver, serde_json::Value::Null)
    }

    /// Non-panicking driver registration with options.
    pub fn try_with_driver_options<D: Driver + 'static>(
        mut self,
        driver: D,
        options: serde_json::Value,
    ) -> Result<Self, RatchetError> {
        let name = driver.name();
        if self.drivers.contains_key(name) {
            return Err(RatchetError::DriverAlreadyRegistered { name });
        }
        self.drivers.insert(
            name,
            DriverEntry {
                driver: Arc::new(driver),
                options,
            },
        );
        Ok(self)
    }

    /// Dispatch one event to its configured driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the event type is not registered, its payload
    /// fails validation, the named driver is not configured, or the driver
    /// itself fails (sync execution error, queue persistence error,
    /// driver-option validation error).
    pub async fn dispatch(&self, event: &dyn Event) -> Result<()> {
        let name = event.name();
        if !self.registry.contains(name) {
            return Err(RatchetError::EventNotRegistered {
                name: name.to_string(),
            }
            .into());
        }

        event.validate()?;

        let driver_name = event.driver_name();
        let entry =
            self.drivers
                .get(driver_name)
                .ok_or_else(|| RatchetError::DriverNotConfigured {
                    name: driver_name.to_string(),
                })?;

        if self.is_mocked(name) {
            self.dispatched.lock().unwrap().push(DispatchedEvent {
                name: name.to_string(),
                payload: event.payload(),
                dispatched_at: Utc::now(),
            });
            debug!(event = %name, "dispatch intercepted by mock mode");
            return Ok(());
        }

        entry.driver.dispatch(event, &entry.options).await
    }

    /// The options bag configured for a driver, if any driver with that
    /// name is registered.
    pub fn driver_options(&self, name: &str) -> Option<&serde_json::Value> {
        self.drivers.get(name).map(|entry| &entry.options)
    }

    /// Check if a driver name is registered.
    pub fn has_driver(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Access the registry this service validates against.
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    // =========================================================================
    // Mock mode
    // =========================================================================

    /// Intercept future dispatches of `E`: they are recorded into the
    /// dispatched-events log instead of reaching a driver.
    pub fn mock_event<E: EventType>(&self) {
        self.mocked.lock().unwrap().insert(E::NAME);
    }

    /// Clear the mock list and the dispatched-events log.
    pub fn reset_mock_events(&self) {
        self.mocked.lock().unwrap().clear();
        self.dispatched.lock().unwrap().clear();
    }

    fn is_mocked(&self, name: &str) -> bool {
        self.mocked.lock().unwrap().contains(name)
    }

    /// Whether at least one dispatch of `E` was recorded.
    pub fn was_dispatched<E: EventType>(&self) -> bool {
        self.dispatched
            .lock()
            .unwrap()
            .iter()
            .any(|d| d.name == E::NAME)
    }

    /// All recorded dispatches of `E`, in dispatch order.
    pub fn dispatched_of_type<E: EventType>(&self) -> Vec<DispatchedEvent> {
        self.dispatched
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.name == E::NAME)
            .cloned()
            .collect()
    }

    /// Total number of recorded dispatches.
    pub fn dispatched_count(&self) -> usize {
        self.dispatched.lock().unwrap().len()
    }

    /// Assert that `E` was dispatched and test its payloads against a
    /// predicate.
    ///
    /// Returns whether any recorded payload satisfies the predicate.
    ///
    /// # Panics
    ///
    /// Panics if no dispatch of `E` was recorded at all, independent of
    /// the predicate.
    pub fn assert_dispatched<E, F>(&self, predicate: F) -> bool
    where
        E: EventType,
        F: Fn(&serde_json::Value) -> bool,
    {
        let dispatched = self.dispatched_of_type::<E>();
        assert!(
            !dispatched.is_empty(),
            "Expected event '{}' to have been dispatched, but no dispatch of that type was recorded",
            E::NAME
        );
        dispatched.iter().any(|d| predicate(&d.payload))
    }
}

impl std::fmt::Debug for EventService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventService")
            .field("drivers", &self.drivers.keys().collect::<Vec<_>>())
            .field("dispatched_count", &self.dispatched_count())
            .finish_non_exhaustive()
    }
}
