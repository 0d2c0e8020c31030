//! Core types and traits for palisade, an embeddable replicated
//! key-value database.
//!
//! This crate carries everything the drivers and the replication engine
//! share:
//!
//! - the [`StableStore`] / [`StoreSnapshot`] / [`RegionIter`] traits and the
//!   [`Batch`] type — the contract every storage driver implements
//! - the checkpoint codec (self-describing compressed record stream) used
//!   for snapshot transfer and local restore
//! - the replicated [`Command`] wire format
//! - the stable-store driver registry
//! - an in-memory reference driver
//!
//! The on-disk reference driver lives in `palisade-rocks`; the consensus
//! log store lives in `palisade-raftlog`; the replication engine lives in
//! `palisade-engine`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod checkpoint;
pub mod command;
pub mod config;
pub mod error;
pub mod memory;
pub mod range;
pub mod region;
pub mod registry;
pub mod store;

pub use batch::{Batch, WriteOp};
pub use checkpoint::{
    restore_region_checkpoint, write_region_checkpoint, CheckpointReader, CheckpointWriter,
    BLOCK_RECORDS,
};
pub use command::{Command, KeyValue};
pub use config::StoreConfig;
pub use error::{AggregateError, Error, Result};
pub use memory::{MemoryStore, MemoryStoreDriver};
pub use range::Range;
pub use region::{validate_region_name, RESERVED_REGION};
pub use registry::{open_store, register_store_driver, store_driver_names};
pub use store::{RegionIter, StableStore, StoreDriver, StoreSnapshot};
