//! Process-wide log-store driver registry.
//!
//! Same discipline as the stable-store registry: explicit registration
//! during program setup, panic on duplicates, `DriverNotFound` on unknown
//! lookups, reader/writer locked for read-heavy steady state.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use palisade_core::Error;

use crate::LogStore;

/// A named factory that constructs a [`LogStore`] from a path.
pub trait LogDriver: Send + Sync {
    /// Open (creating if necessary) a log store rooted at `path`.
    fn open(&self, path: &Path) -> palisade_core::Result<Box<dyn LogStore>>;
}

static LOG_DRIVERS: Lazy<RwLock<HashMap<String, Arc<dyn LogDriver>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a log-store driver under `name`.
///
/// # Panics
///
/// Panics if a driver is already registered under `name`.
pub fn register_log_driver(name: &str, driver: Arc<dyn LogDriver>) {
    let mut drivers = LOG_DRIVERS.write();
    if drivers.contains_key(name) {
        panic!("log store driver '{name}' registered twice");
    }
    debug!(driver = name, "registered log store driver");
    drivers.insert(name.to_string(), driver);
}

/// Open a log store with the driver registered under `name`.
pub fn open_log_store(name: &str, path: &Path) -> palisade_core::Result<Box<dyn LogStore>> {
    let driver = LOG_DRIVERS
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| Error::DriverNotFound {
            driver: name.to_string(),
        })?;
    driver.open(path)
}

/// Names of all registered log-store drivers, sorted.
pub fn log_driver_names() -> Vec<String> {
    let mut names: Vec<String> = LOG_DRIVERS.read().keys().cloned().collect();
    names.sort();
    names
}
