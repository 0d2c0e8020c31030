//! Write batches.
//!
//! A [`Batch`] is a driver-agnostic value: an ordered list of put/delete
//! operations per region. Drivers resolve the named regions against their
//! live region set when the batch is written, so a batch may reference a
//! region created after the batch itself — and writing to a region dropped
//! in the meantime fails with `RegionNotFound` before any effect is visible.
//!
//! Batches are not thread-safe; use one batch per writer.

use std::collections::HashMap;

/// One operation inside a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert or overwrite `key`.
    Put {
        /// Key bytes.
        key: Vec<u8>,
        /// Value bytes; may be empty.
        value: Vec<u8>,
    },
    /// Remove `key` if present.
    Delete {
        /// Key bytes.
        key: Vec<u8>,
    },
}

/// An ordered set of operations applied atomically by [`StableStore::write`].
///
/// Operation order is preserved within a region; ordering between regions is
/// unspecified beyond atomicity of the whole batch.
///
/// [`StableStore::write`]: crate::store::StableStore::write
#[derive(Clone, Debug, Default)]
pub struct Batch {
    ops: HashMap<String, Vec<WriteOp>>,
    len: usize,
}

impl Batch {
    /// Create an empty batch.
    pub fn new() -> Batch {
        Batch::default()
    }

    /// Append a put of `key` → `value` in `region`. Bytes are copied.
    pub fn put(&mut self, region: &str, key: &[u8], value: &[u8]) {
        self.ops
            .entry(region.to_string())
            .or_default()
            .push(WriteOp::Put {
                key: key.to_vec(),
                value: value.to_vec(),
            });
        self.len += 1;
    }

    /// Append a delete of `key` in `region`. Bytes are copied.
    pub fn delete(&mut self, region: &str, key: &[u8]) {
        self.ops
            .entry(region.to_string())
            .or_default()
            .push(WriteOp::Delete { key: key.to_vec() });
        self.len += 1;
    }

    /// Number of operations appended since creation or the last [`reset`].
    ///
    /// [`reset`]: Batch::reset
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Clear the batch for reuse.
    pub fn reset(&mut self) {
        self.ops.clear();
        self.len = 0;
    }

    /// The regions this batch touches.
    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.ops.keys().map(String::as_str)
    }

    /// Operations grouped by region, in per-region append order.
    pub fn per_region(&self) -> impl Iterator<Item = (&str, &[WriteOp])> {
        self.ops.iter().map(|(r, ops)| (r.as_str(), ops.as_slice()))
    }
}
