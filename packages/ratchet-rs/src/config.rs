//! Driver configuration: name-keyed entries and the queue driver's
//! option schema.
//!
//! Each configured driver carries an opaque, driver-specific options bag
//! (a `serde_json::Value`). The bag is handed to the driver as explicit
//! context on every dispatch and validated there - so a misconfigured
//! queue driver fails the dispatch call loudly, before anything is
//! persisted, rather than failing later inside a worker run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::driver::Driver;
use crate::error::RatchetError;

/// A configured driver: the implementation plus its options bag.
#[derive(Clone)]
pub struct DriverEntry {
    pub driver: Arc<dyn Driver>,
    pub options: serde_json::Value,
}

impl std::fmt::Debug for DriverEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverEntry")
            .field("driver", &self.driver.name())
            .field("options", &self.options)
            .finish()
    }
}

/// Options contract for the queue driver.
///
/// Values outside these types (or missing required fields) cause a
/// configuration error at dispatch time, not at worker-run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueDriverOptions {
    /// Default logical partition for the worker run that drains this
    /// driver's records.
    pub queue_name: String,

    /// Retry ceiling stamped onto every record this driver persists.
    pub retries: i32,

    /// Coarse pre-loop delay for the worker run, in seconds.
    pub run_after_seconds: u64,

    /// Signals the worker-run caller not to reschedule after one pass.
    #[serde(default)]
    pub run_once: bool,
}

impl QueueDriverOptions {
    /// Validate and deserialize an options bag.
    pub fn from_value(options: &serde_json::Value) -> Result<Self, RatchetError> {
        serde_json::from_value(options.clone()).map_err(|e| RatchetError::InvalidDriverOptions {
            driver: crate::core::QUEUE_DRIVER,
            message: e.to_string(),
        })
    }
}
