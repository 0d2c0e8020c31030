//! # Palisade
//!
//! An embeddable, replicated key-value database. A cluster of peers agrees
//! on an ordered log of mutation commands through a consensus protocol;
//! each peer applies those commands deterministically to a local,
//! crash-durable key-value engine partitioned into named **regions**.
//! Periodic per-region checkpoints allow log compaction and fast recovery
//! of lagging or new peers.
//!
//! # Pieces
//!
//! | Piece | What it is |
//! |-------|------------|
//! | [`StableStore`] | Local durable region-partitioned KV engine (drivers: RocksDB, in-memory) |
//! | [`LogStore`] | Durable consensus log satisfying the consensus library's storage contract (driver: sled) |
//! | [`ReplicationEngine`] | Binds a consensus node to one region: propose, apply, checkpoint, restore |
//! | [`CheckpointWriter`]/[`CheckpointReader`] | Self-describing compressed record stream for snapshots |
//! | [`Command`] | The replicated command wire format |
//!
//! # Quick start (single peer, scripted node)
//!
//! ```no_run
//! use std::sync::Arc;
//! use palisade::{Command, KvCommandHandler, ReplicationEngine};
//!
//! # fn main() -> palisade::Result<()> {
//! // The consensus node (raft driver loop) is owned by the embedding
//! // process; it hands the engine its channel bundle and snapshotter.
//! # let channels: palisade::NodeChannels = unimplemented!();
//! # let snapshotter: Arc<dyn palisade::Snapshotter> = unimplemented!();
//! let store = Arc::new(palisade::RocksStore::open("./data/stable-store-1")?);
//! let engine = ReplicationEngine::new(
//!     "kv",
//!     snapshotter,
//!     channels,
//!     store,
//!     Arc::new(KvCommandHandler),
//! )?;
//!
//! engine.propose(&Command::put([(b"user:name".to_vec(), b"Alice".to_vec())]))?;
//! // ...once the cluster commits it:
//! let value = engine.get(b"user:name")?;
//! # Ok(())
//! # }
//! ```
//!
//! Driver registries ([`register_store_driver`], [`register_log_driver`])
//! let embedding processes select engines by name from configuration; the
//! bundled drivers register through [`register_rocks_driver`] and
//! [`register_sled_log_driver`].

pub use palisade_core::{
    open_store, register_store_driver, restore_region_checkpoint, store_driver_names,
    validate_region_name, write_region_checkpoint, AggregateError, Batch, CheckpointReader,
    CheckpointWriter, Command, Error, KeyValue, MemoryStore, MemoryStoreDriver, Range, RegionIter,
    Result, StableStore, StoreConfig, StoreDriver, StoreSnapshot, WriteOp, BLOCK_RECORDS,
    RESERVED_REGION,
};
pub use palisade_engine::{
    Commit, CommandHandler, EngineState, KvCommandHandler, NodeChannels, NodeError,
    ReplicationEngine, Snapshotter,
};
pub use palisade_raftlog::{
    log_driver_names, open_log_store, register_log_driver,
    register_sled_driver as register_sled_log_driver, ConsensusStorage, LogDriver, LogStore,
    SledLogStore, SledLogStoreDriver,
};
pub use palisade_rocks::{
    register_driver as register_rocks_driver, RocksIter, RocksSnapshot, RocksStore,
    RocksStoreDriver,
};
