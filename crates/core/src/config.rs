//! Store configuration.

use serde::{Deserialize, Serialize};

/// Tuning knobs shared by on-disk store drivers.
///
/// Deserializable so embedding processes can lift it straight out of their
/// own config files; every field has a safe default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Synchronously flush each batch write to the OS before returning.
    ///
    /// Batches carry committed consensus entries, so the default favors
    /// durability over write latency.
    pub sync_writes: bool,
    /// Create the backing database if it does not exist yet.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            sync_writes: true,
            create_if_missing: true,
        }
    }
}
