//! Reference log-store driver over sled.
//!
//! A single tree holds three keyspace partitions, distinguished by a
//! one-byte prefix:
//!
//! ```text
//! 0x00                  → HardState blob
//! 0x01                  → Snapshot blob
//! 0xFF ‖ index (8 BE)   → log entries
//! ```
//!
//! The entry prefix is `0xFF` so it sorts after everything else: a prefix
//! scan seeded with it sees only entries, and the tree's greatest key is
//! always the last entry. Multi-key mutations run inside sled transactions
//! and are followed by an explicit flush where durability is required
//! (hard state, snapshots, appended entries).
//!
//! sled transactions cannot iterate, so operations that clear a key range
//! collect the key set by scanning first and remove inside the
//! transaction. The log store has a single writer (the consensus node's
//! persistence thread), which makes that two-step benign.

use std::path::Path;
use std::sync::Arc;

use protobuf::Message;
use raft::eraftpb::{ConfState, Entry, HardState, Snapshot};
use raft::{RaftState, StorageError};
use sled::transaction::TransactionError;
use tracing::{debug, info};

use crate::registry::{register_log_driver, LogDriver};
use crate::LogStore;

/// Registry name of this driver.
pub const DRIVER_NAME: &str = "sled";

const HARD_STATE_KEY: [u8; 1] = [0x00];
const SNAPSHOT_KEY: [u8; 1] = [0x01];
// MUST be the last-sorting prefix; see the module docs.
const LOG_PREFIX: u8 = 0xFF;

fn log_key(index: u64) -> [u8; 9] {
    let mut key = [LOG_PREFIX; 9];
    key[1..].copy_from_slice(&index.to_be_bytes());
    key
}

fn entry_index(key: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&key[1..9]);
    u64::from_be_bytes(buf)
}

fn store_err(err: sled::Error) -> raft::Error {
    raft::Error::Store(StorageError::Other(Box::new(err)))
}

fn proto_err(err: protobuf::ProtobufError) -> raft::Error {
    raft::Error::Store(StorageError::Other(Box::new(err)))
}

fn corruption(msg: &str) -> raft::Error {
    raft::Error::Store(StorageError::Other(msg.to_string().into()))
}

fn tx_err(err: TransactionError<raft::Error>) -> raft::Error {
    match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => store_err(err),
    }
}

fn decode_entry(bytes: &[u8]) -> raft::Result<Entry> {
    Entry::parse_from_bytes(bytes).map_err(proto_err)
}

/// A [`LogStore`] backed by one sled tree.
pub struct SledLogStore {
    db: sled::Db,
}

impl SledLogStore {
    /// Open (creating if necessary) a log store rooted at `path`.
    ///
    /// A fresh store installs the dummy entry at index 0, term 0, matching
    /// the consensus library's notion of an empty log.
    pub fn open(path: impl AsRef<Path>) -> palisade_core::Result<SledLogStore> {
        let path = path.as_ref();
        let db = sled::open(path)
            .map_err(|err| palisade_core::Error::Storage(err.to_string()))?;
        let store = SledLogStore { db };
        store
            .ensure_dummy()
            .map_err(|err| palisade_core::Error::Storage(err.to_string()))?;
        info!(path = %path.display(), "opened sled log store");
        Ok(store)
    }

    fn ensure_dummy(&self) -> raft::Result<()> {
        match self.db.scan_prefix([LOG_PREFIX]).next() {
            Some(Ok(_)) => Ok(()),
            Some(Err(err)) => Err(store_err(err)),
            None => {
                let dummy = Entry::new();
                let bytes = dummy.write_to_bytes().map_err(proto_err)?;
                self.db
                    .insert(log_key(0), bytes)
                    .map_err(store_err)?;
                self.db.flush().map_err(store_err)?;
                Ok(())
            }
        }
    }

    /// Index of the dummy entry: the compaction point the log is anchored
    /// to. `first_index()` is this plus one.
    fn dummy_index(&self) -> raft::Result<u64> {
        match self.db.scan_prefix([LOG_PREFIX]).next() {
            Some(kv) => {
                let (key, _) = kv.map_err(store_err)?;
                Ok(entry_index(&key))
            }
            None => Err(corruption("log store holds no entries")),
        }
    }

    fn physical_last(&self) -> raft::Result<u64> {
        match self.db.last().map_err(store_err)? {
            Some((key, _)) if key[0] == LOG_PREFIX => Ok(entry_index(&key)),
            _ => Err(corruption("log store holds no entries")),
        }
    }

    fn read_snapshot(&self) -> raft::Result<Snapshot> {
        match self.db.get(SNAPSHOT_KEY).map_err(store_err)? {
            Some(bytes) => Snapshot::parse_from_bytes(&bytes).map_err(proto_err),
            None => Ok(Snapshot::new()),
        }
    }
}

impl LogStore for SledLogStore {
    fn initial_state(&self) -> raft::Result<RaftState> {
        let hard_state = match self.db.get(HARD_STATE_KEY).map_err(store_err)? {
            Some(bytes) => HardState::parse_from_bytes(&bytes).map_err(proto_err)?,
            None => HardState::new(),
        };
        let mut meta = self.read_snapshot()?.take_metadata();
        Ok(RaftState {
            hard_state,
            conf_state: meta.take_conf_state(),
        })
    }

    fn entries(&self, lo: u64, hi: u64, max_size: Option<u64>) -> raft::Result<Vec<Entry>> {
        let dummy = self.dummy_index()?;
        if lo <= dummy {
            return Err(raft::Error::Store(StorageError::Compacted));
        }
        let last = self.physical_last()?;
        if hi > last + 1 {
            panic!("entries' hi({hi}) is out of bound lastindex({last})");
        }

        let max = max_size.unwrap_or(u64::MAX);
        let mut entries = Vec::new();
        let mut size: u64 = 0;
        for kv in self.db.range(log_key(lo)..log_key(hi)) {
            let (_, value) = kv.map_err(store_err)?;
            let entry = decode_entry(&value)?;
            let entry_size = u64::from(entry.compute_size());
            // Always yield at least one entry, even oversized.
            if !entries.is_empty() && size + entry_size > max {
                break;
            }
            size += entry_size;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn term(&self, i: u64) -> raft::Result<u64> {
        let dummy = self.dummy_index()?;
        if i < dummy {
            return Err(raft::Error::Store(StorageError::Compacted));
        }
        match self.db.get(log_key(i)).map_err(store_err)? {
            Some(bytes) => Ok(decode_entry(&bytes)?.get_term()),
            None => Err(raft::Error::Store(StorageError::Unavailable)),
        }
    }

    fn first_index(&self) -> raft::Result<u64> {
        Ok(self.dummy_index()? + 1)
    }

    fn last_index(&self) -> raft::Result<u64> {
        self.physical_last()
    }

    fn snapshot(&self) -> raft::Result<Snapshot> {
        self.read_snapshot()
    }

    fn set_hard_state(&self, hs: &HardState) -> raft::Result<()> {
        let bytes = hs.write_to_bytes().map_err(proto_err)?;
        self.db.insert(HARD_STATE_KEY, bytes).map_err(store_err)?;
        // Consensus correctness requires the hard state to survive a crash.
        self.db.flush().map_err(store_err)?;
        Ok(())
    }

    fn append(&self, entries: &[Entry]) -> raft::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let first = self.first_index()?;
        let last = self.physical_last()?;
        let first_new = entries[0].get_index();
        let last_new = first_new + entries.len() as u64 - 1;

        // Entirely compacted away already.
        if last_new < first {
            return Ok(());
        }
        // Drop the prefix that compaction has made stale.
        let entries = if first_new < first {
            &entries[(first - first_new) as usize..]
        } else {
            entries
        };

        let mut writes = Vec::with_capacity(entries.len());
        for entry in entries {
            writes.push((
                log_key(entry.get_index()).to_vec(),
                entry.write_to_bytes().map_err(proto_err)?,
            ));
        }
        // Overwriting a suffix shortens the log; stale entries past the new
        // last index go away in the same transaction.
        let mut removals = Vec::new();
        for index in (last_new + 1)..=last {
            removals.push(log_key(index).to_vec());
        }

        self.db
            .transaction::<_, _, raft::Error>(move |tx| {
                for (key, value) in &writes {
                    tx.insert(key.clone(), value.clone())?;
                }
                for key in &removals {
                    tx.remove(key.clone())?;
                }
                Ok(())
            })
            .map_err(tx_err)?;
        self.db.flush().map_err(store_err)?;
        debug!(
            first = entries[0].get_index(),
            last = last_new,
            "appended entries"
        );
        Ok(())
    }

    fn apply_snapshot(&self, snapshot: &Snapshot) -> raft::Result<()> {
        let stored = self.read_snapshot()?;
        let incoming = snapshot.get_metadata();
        if incoming.get_index() <= stored.get_metadata().get_index() {
            return Err(raft::Error::Store(StorageError::SnapshotOutOfDate));
        }

        let snapshot_bytes = snapshot.write_to_bytes().map_err(proto_err)?;
        let mut dummy = Entry::new();
        dummy.set_index(incoming.get_index());
        dummy.set_term(incoming.get_term());
        let dummy_bytes = dummy.write_to_bytes().map_err(proto_err)?;
        let dummy_key = log_key(incoming.get_index()).to_vec();

        let mut removals = Vec::new();
        for kv in self.db.scan_prefix([LOG_PREFIX]) {
            let (key, _) = kv.map_err(store_err)?;
            removals.push(key.to_vec());
        }

        self.db
            .transaction::<_, _, raft::Error>(move |tx| {
                tx.insert(SNAPSHOT_KEY.to_vec(), snapshot_bytes.clone())?;
                for key in &removals {
                    tx.remove(key.clone())?;
                }
                tx.insert(dummy_key.clone(), dummy_bytes.clone())?;
                Ok(())
            })
            .map_err(tx_err)?;
        self.db.flush().map_err(store_err)?;
        info!(
            index = incoming.get_index(),
            term = incoming.get_term(),
            "installed snapshot"
        );
        Ok(())
    }

    fn create_snapshot(
        &self,
        i: u64,
        conf_state: Option<ConfState>,
        data: Vec<u8>,
    ) -> raft::Result<Snapshot> {
        let mut snapshot = self.read_snapshot()?;
        if i <= snapshot.get_metadata().get_index() {
            return Err(raft::Error::Store(StorageError::SnapshotOutOfDate));
        }
        let last = self.physical_last()?;
        if i > last {
            panic!("snapshot {i} is out of bound lastindex({last})");
        }
        let term = match self.db.get(log_key(i)).map_err(store_err)? {
            Some(bytes) => decode_entry(&bytes)?.get_term(),
            None => return Err(raft::Error::Store(StorageError::Unavailable)),
        };

        {
            let meta = snapshot.mut_metadata();
            meta.set_index(i);
            meta.set_term(term);
            if let Some(cs) = conf_state {
                meta.set_conf_state(cs);
            }
        }
        snapshot.set_data(data.into());

        let bytes = snapshot.write_to_bytes().map_err(proto_err)?;
        self.db.insert(SNAPSHOT_KEY, bytes).map_err(store_err)?;
        self.db.flush().map_err(store_err)?;
        info!(index = i, term, "created snapshot");
        Ok(snapshot)
    }

    fn compact(&self, compact_index: u64) -> raft::Result<()> {
        let dummy = self.dummy_index()?;
        if compact_index <= dummy {
            return Err(raft::Error::Store(StorageError::Compacted));
        }
        let last = self.physical_last()?;
        if compact_index > last {
            panic!("compact {compact_index} is out of bound lastindex({last})");
        }

        let mut removals = Vec::new();
        for kv in self.db.range(log_key(dummy)..log_key(compact_index)) {
            let (key, _) = kv.map_err(store_err)?;
            removals.push(key.to_vec());
        }
        self.db
            .transaction::<_, _, raft::Error>(move |tx| {
                for key in &removals {
                    tx.remove(key.clone())?;
                }
                Ok(())
            })
            .map_err(tx_err)?;
        self.db.flush().map_err(store_err)?;
        debug!(compact_index, "compacted log");
        Ok(())
    }
}

/// Driver for [`SledLogStore`].
pub struct SledLogStoreDriver;

impl LogDriver for SledLogStoreDriver {
    fn open(&self, path: &Path) -> palisade_core::Result<Box<dyn LogStore>> {
        Ok(Box::new(SledLogStore::open(path)?))
    }
}

/// Register this driver under [`DRIVER_NAME`].
///
/// Call once during program setup; registering twice panics.
pub fn register_driver() {
    register_log_driver(DRIVER_NAME, Arc::new(SledLogStoreDriver));
}
