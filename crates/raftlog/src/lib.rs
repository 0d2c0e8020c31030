//! Durable consensus log storage.
//!
//! [`LogStore`] mirrors the read surface of the consensus library's
//! `Storage` trait and adds the mutation operations the library leaves to
//! the application: appending entries, persisting hard state, installing
//! and creating snapshots, and compaction. The trait is object-safe so log
//! stores can travel through the driver registry; [`ConsensusStorage`]
//! adapts any `Arc<dyn LogStore>` back into a `raft::Storage` for the node.
//!
//! Errors speak `raft::Error` directly — `Compacted`, `Unavailable` and
//! `SnapshotOutOfDate` are interpreted by the consensus library, not by
//! application code.

#![warn(clippy::all)]

mod registry;
mod sled_store;

use std::sync::Arc;

use raft::eraftpb::{ConfState, Entry, HardState, Snapshot};
use raft::{GetEntriesContext, RaftState, Storage, StorageError};

pub use registry::{log_driver_names, open_log_store, register_log_driver, LogDriver};
pub use sled_store::{register_driver as register_sled_driver, SledLogStore, SledLogStoreDriver};

/// Result alias at the consensus boundary.
pub type Result<T> = raft::Result<T>;

/// A durable raft log store.
///
/// Index bookkeeping follows the consensus library's in-memory storage: the
/// store always holds a *dummy entry* carrying the term and index of the
/// last compaction point (or snapshot), so `first_index()` is the dummy's
/// index plus one and `term(first_index() - 1)` stays answerable.
pub trait LogStore: Send + Sync {
    /// Persisted `HardState` and `ConfState` (the latter from snapshot
    /// metadata).
    fn initial_state(&self) -> Result<RaftState>;

    /// Entries in `[lo, hi)` whose cumulative encoded size stays below
    /// `max_size` (the first entry is always returned).
    ///
    /// Errors with `Compacted` if `lo` is at or below the dummy index.
    ///
    /// # Panics
    ///
    /// Panics if `hi > last_index() + 1`; asking for unappended entries is a
    /// consensus-library invariant violation, and continuing would diverge
    /// replicas.
    fn entries(&self, lo: u64, hi: u64, max_size: Option<u64>) -> Result<Vec<Entry>>;

    /// Term of entry `i`; `Compacted` below the dummy index, `Unavailable`
    /// above the last entry.
    fn term(&self, i: u64) -> Result<u64>;

    /// Index of the first available (non-dummy) entry.
    fn first_index(&self) -> Result<u64>;

    /// Index of the last stored entry.
    fn last_index(&self) -> Result<u64>;

    /// The most recent snapshot (metadata and state-machine data).
    fn snapshot(&self) -> Result<Snapshot>;

    /// Persist the hard state durably.
    fn set_hard_state(&self, hs: &HardState) -> Result<()>;

    /// Persist entries.
    ///
    /// Entries below `first_index()` are dropped (already compacted away);
    /// entries overlapping the existing suffix overwrite it, and stale
    /// entries past the new last index are removed in the same transaction.
    fn append(&self, entries: &[Entry]) -> Result<()>;

    /// Install a snapshot from the consensus layer.
    ///
    /// Errors with `SnapshotOutOfDate` if the incoming index is at or below
    /// the stored snapshot's index. On success every log entry is removed
    /// and a dummy entry at the snapshot's index/term anchors subsequent
    /// `first_index`/`term` queries.
    fn apply_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// Record that the state machine has applied through `i`, storing
    /// `(term(i), i, conf_state, data)` as the new snapshot.
    ///
    /// Errors with `SnapshotOutOfDate` if `i` is at or below the stored
    /// snapshot's index.
    ///
    /// # Panics
    ///
    /// Panics if `i > last_index()`.
    fn create_snapshot(
        &self,
        i: u64,
        conf_state: Option<ConfState>,
        data: Vec<u8>,
    ) -> Result<Snapshot>;

    /// Discard entries with index below `compact_index`; the entry at
    /// `compact_index` becomes the new dummy.
    ///
    /// Errors with `Compacted` if `compact_index` is at or below the dummy
    /// index.
    ///
    /// # Panics
    ///
    /// Panics if `compact_index > last_index()`.
    fn compact(&self, compact_index: u64) -> Result<()>;
}

/// Adapter presenting an `Arc<dyn LogStore>` as the consensus library's
/// `Storage`.
#[derive(Clone)]
pub struct ConsensusStorage {
    store: Arc<dyn LogStore>,
}

impl ConsensusStorage {
    /// Wrap a log store for handing to a consensus node.
    pub fn new(store: Arc<dyn LogStore>) -> ConsensusStorage {
        ConsensusStorage { store }
    }

    /// The wrapped store.
    pub fn log_store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }
}

impl Storage for ConsensusStorage {
    fn initial_state(&self) -> raft::Result<RaftState> {
        self.store.initial_state()
    }

    fn entries(
        &self,
        low: u64,
        high: u64,
        max_size: impl Into<Option<u64>>,
        _context: GetEntriesContext,
    ) -> raft::Result<Vec<Entry>> {
        self.store.entries(low, high, max_size.into())
    }

    fn term(&self, idx: u64) -> raft::Result<u64> {
        self.store.term(idx)
    }

    fn first_index(&self) -> raft::Result<u64> {
        self.store.first_index()
    }

    fn last_index(&self) -> raft::Result<u64> {
        self.store.last_index()
    }

    fn snapshot(&self, request_index: u64, _to: u64) -> raft::Result<Snapshot> {
        let snapshot = self.store.snapshot()?;
        if snapshot.get_metadata().get_index() < request_index {
            return Err(raft::Error::Store(
                StorageError::SnapshotTemporarilyUnavailable,
            ));
        }
        Ok(snapshot)
    }
}
