//! Process-wide stable-store driver registry.
//!
//! Drivers are registered by name during program setup — an explicit call,
//! not a module-initializer side effect — and looked up when stores are
//! opened. Duplicate registration is a programming error and panics;
//! lookups are read-heavy and safe under concurrent calls.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::{StableStore, StoreDriver};

static STORE_DRIVERS: Lazy<RwLock<HashMap<String, Arc<dyn StoreDriver>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a stable-store driver under `name`.
///
/// # Panics
///
/// Panics if a driver is already registered under `name`.
pub fn register_store_driver(name: &str, driver: Arc<dyn StoreDriver>) {
    let mut drivers = STORE_DRIVERS.write();
    if drivers.contains_key(name) {
        panic!("stable store driver '{name}' registered twice");
    }
    debug!(driver = name, "registered stable store driver");
    drivers.insert(name.to_string(), driver);
}

/// Open a store with the driver registered under `name`.
///
/// Returns `DriverNotFound` if no such driver has been registered.
pub fn open_store(name: &str, path: &Path) -> Result<Box<dyn StableStore>> {
    let driver = STORE_DRIVERS
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| Error::DriverNotFound {
            driver: name.to_string(),
        })?;
    driver.open(path)
}

/// Names of all registered stable-store drivers, sorted.
pub fn store_driver_names() -> Vec<String> {
    let mut names: Vec<String> = STORE_DRIVERS.read().keys().cloned().collect();
    names.sort();
    names
}
