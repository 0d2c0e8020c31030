//! The stable-store abstraction.
//!
//! A [`StableStore`] is the local, durable, region-partitioned key-value
//! engine a replication engine applies committed commands to. The trait is
//! object-safe so stores can travel through the driver registry as
//! `Box<dyn StableStore>`; a statically-known driver can of course be used
//! directly.
//!
//! Snapshots and iterators are borrow-scoped: a snapshot cannot outlive its
//! store, an iterator cannot outlive its snapshot, and releasing either is
//! the drop of the value.

use std::path::Path;

use crate::batch::Batch;
use crate::error::Result;
use crate::range::Range;

/// A local persistent store partitioned into named regions.
///
/// All methods take `&self`; implementations guard their region set with a
/// reader/writer lock (create/drop exclusive, everything else shared).
pub trait StableStore: Send + Sync {
    /// Create a region.
    ///
    /// Fails with `RegionAlreadyExists` if the region is present and with
    /// `InvalidRegionName` if the name does not satisfy
    /// [`validate_region_name`]. Not idempotent: callers either check
    /// [`has_region`] first or handle the collision error.
    ///
    /// [`validate_region_name`]: crate::region::validate_region_name
    /// [`has_region`]: StableStore::has_region
    fn create_region(&self, name: &str) -> Result<()>;

    /// Close and remove a region's storage.
    ///
    /// Fails with `RegionNotFound` if the region is absent.
    fn drop_region(&self, name: &str) -> Result<()>;

    /// Non-failing existence query.
    fn has_region(&self, name: &str) -> bool;

    /// The current region set, sorted by name.
    fn regions(&self) -> Vec<String>;

    /// Create an empty batch.
    ///
    /// The batch binds to the live region set of this store: region
    /// membership is checked when the batch is written, not here.
    fn create_batch(&self) -> Batch {
        Batch::new()
    }

    /// Atomically apply a batch.
    ///
    /// If any region the batch references does not exist at write time, the
    /// call fails before any effect is visible, with an error naming every
    /// missing region. Per-region atomicity is guaranteed; cross-region
    /// atomicity is best-effort and driver-dependent.
    fn write(&self, batch: &Batch) -> Result<()>;

    /// Acquire a consistent point-in-time view across all current regions.
    ///
    /// The view is released when the returned value is dropped.
    fn snapshot(&self) -> Result<Box<dyn StoreSnapshot + '_>>;

    /// Serialize every key/value pair of `region` into a checkpoint.
    fn create_checkpoint(&self, region: &str) -> Result<Vec<u8>>;

    /// Replace the contents of `region` with a checkpoint.
    ///
    /// The region is created if absent. The operation is not atomic with
    /// respect to concurrent readers, which may observe intermediate states;
    /// concurrent writers produce unspecified interleavings.
    fn restore_to_checkpoint(&self, region: &str, checkpoint: &[u8]) -> Result<()>;

    /// Close all regions, aggregating errors. Idempotent.
    fn close(&self) -> Result<()>;
}

/// A point-in-time read view over every region of a store.
///
/// Safe for concurrent readers; released on drop.
pub trait StoreSnapshot {
    /// Read `key` in `region`.
    ///
    /// Returns `KeyNotFound` for an absent key and `RegionNotFound` for an
    /// unknown region.
    fn get(&self, region: &str, key: &[u8]) -> Result<Vec<u8>>;

    /// Read several keys in `region`; absent keys yield `None` without error.
    fn multi_get(&self, region: &str, keys: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>>;

    /// Whether `key` exists in `region`.
    fn has(&self, region: &str, key: &[u8]) -> Result<bool>;

    /// Iterate `region` over `range`, with cache-fill disabled.
    ///
    /// The iterator borrows this snapshot and cannot outlive it.
    fn iter<'s>(&'s self, region: &str, range: Range) -> Result<Box<dyn RegionIter + 's>>;
}

/// A restartable cursor over a key range of one region of a snapshot.
///
/// Not safe for concurrent use. Movement methods return whether the cursor
/// now rests on a valid pair. [`key`]/[`value`] borrow from the cursor and
/// are invalidated by the next movement call; callers who retain them must
/// copy. When the cursor is not on a valid pair they return empty slices.
///
/// [`key`]: RegionIter::key
/// [`value`]: RegionIter::value
pub trait RegionIter {
    /// Move to the first pair of the range.
    fn first(&mut self) -> bool;
    /// Move to the last pair of the range.
    fn last(&mut self) -> bool;
    /// Move to the first pair whose key is `>= key`, within the range.
    fn seek(&mut self, key: &[u8]) -> bool;
    /// Advance to the next pair.
    fn next(&mut self) -> bool;
    /// Step back to the previous pair.
    fn prev(&mut self) -> bool;
    /// Key of the current pair.
    fn key(&self) -> &[u8];
    /// Value of the current pair.
    fn value(&self) -> &[u8];
    /// Terminal error encountered by the cursor, if any.
    fn status(&self) -> Result<()>;
}

/// A named factory that constructs a [`StableStore`] from a path.
///
/// The only extension point exposed to out-of-tree code; see
/// [`register_store_driver`].
///
/// [`register_store_driver`]: crate::registry::register_store_driver
pub trait StoreDriver: Send + Sync {
    /// Open (creating if necessary) a store rooted at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn StableStore>>;
}
