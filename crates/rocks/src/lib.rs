//! RocksDB stable-store driver.
//!
//! One column family per region; the engine's `default` family is left to
//! RocksDB itself, which is why the region namespace reserves that name.
//! The handle type is `DBWithThreadMode<MultiThreaded>` so region lifecycle
//! (create/drop column family) works through `&self` alongside concurrent
//! reads and writes; the region set itself is mirrored in a
//! `parking_lot::RwLock` so membership checks and lifecycle changes follow
//! the create/drop-exclusive discipline of the trait contract.

#![warn(clippy::all)]

mod snapshot;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rocksdb::{
    ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode, MultiThreaded, Options,
    WriteBatch, WriteOptions,
};
use tracing::info;

use palisade_core::{
    checkpoint, validate_region_name, Batch, Error, Result, StableStore, StoreConfig, StoreDriver,
    StoreSnapshot, WriteOp, RESERVED_REGION,
};

pub use snapshot::{RocksIter, RocksSnapshot};

type Db = DBWithThreadMode<MultiThreaded>;

/// Registry name of this driver.
pub const DRIVER_NAME: &str = "rocksdb";

pub(crate) fn engine_err(err: rocksdb::Error) -> Error {
    Error::Storage(err.to_string())
}

fn cf_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(DBCompressionType::Lz4);
    opts
}

/// A [`StableStore`] backed by one RocksDB database, one column family per
/// region.
pub struct RocksStore {
    db: Db,
    regions: RwLock<BTreeSet<String>>,
    config: StoreConfig,
    closed: AtomicBool,
}

impl RocksStore {
    /// Open (creating if configured) a store rooted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<RocksStore> {
        RocksStore::open_with_config(path, StoreConfig::default())
    }

    /// Open with explicit [`StoreConfig`].
    pub fn open_with_config(path: impl AsRef<Path>, config: StoreConfig) -> Result<RocksStore> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.create_missing_column_families(true);

        // A missing database lists no families; RocksDB creates `default`.
        let families = Db::list_cf(&opts, path)
            .unwrap_or_else(|_| vec![RESERVED_REGION.to_string()]);
        let descriptors = families
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(name, cf_options()));

        let db = Db::open_cf_descriptors(&opts, path, descriptors).map_err(engine_err)?;
        let regions: BTreeSet<String> = families
            .into_iter()
            .filter(|name| name != RESERVED_REGION)
            .collect();
        info!(
            path = %path.display(),
            regions = regions.len(),
            "opened rocksdb stable store"
        );
        Ok(RocksStore {
            db,
            regions: RwLock::new(regions),
            config,
            closed: AtomicBool::new(false),
        })
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.config.sync_writes);
        opts
    }
}

impl StableStore for RocksStore {
    fn create_region(&self, name: &str) -> Result<()> {
        validate_region_name(name)?;
        let mut regions = self.regions.write();
        if regions.contains(name) {
            return Err(Error::RegionAlreadyExists {
                region: name.to_string(),
            });
        }
        self.db.create_cf(name, &cf_options()).map_err(engine_err)?;
        regions.insert(name.to_string());
        info!(region = name, "created region");
        Ok(())
    }

    fn drop_region(&self, name: &str) -> Result<()> {
        let mut regions = self.regions.write();
        if !regions.contains(name) {
            return Err(Error::RegionNotFound {
                region: name.to_string(),
            });
        }
        self.db.drop_cf(name).map_err(engine_err)?;
        regions.remove(name);
        info!(region = name, "dropped region");
        Ok(())
    }

    fn has_region(&self, name: &str) -> bool {
        self.regions.read().contains(name)
    }

    fn regions(&self) -> Vec<String> {
        self.regions.read().iter().cloned().collect()
    }

    fn write(&self, batch: &Batch) -> Result<()> {
        // Holding the shared lock for the whole write keeps drop_region from
        // racing between the membership check and the engine write.
        let regions = self.regions.read();

        let missing: Vec<Error> = batch
            .regions()
            .filter(|region| !regions.contains(*region))
            .map(|region| Error::RegionNotFound {
                region: region.to_string(),
            })
            .collect();
        if !missing.is_empty() {
            return Err(Error::aggregate(missing));
        }

        let mut wb = WriteBatch::default();
        for (region, ops) in batch.per_region() {
            let cf = self.db.cf_handle(region).ok_or_else(|| Error::RegionNotFound {
                region: region.to_string(),
            })?;
            for op in ops {
                match op {
                    WriteOp::Put { key, value } => wb.put_cf(&cf, key, value),
                    WriteOp::Delete { key } => wb.delete_cf(&cf, key),
                }
            }
        }
        self.db.write_opt(wb, &self.write_options()).map_err(engine_err)
    }

    fn snapshot(&self) -> Result<Box<dyn StoreSnapshot + '_>> {
        let regions = self.regions.read();
        let snapshot = RocksSnapshot::new(&self.db, regions.iter())?;
        Ok(Box::new(snapshot))
    }

    fn create_checkpoint(&self, region: &str) -> Result<Vec<u8>> {
        let snapshot = self.snapshot()?;
        checkpoint::write_region_checkpoint(snapshot.as_ref(), region)
    }

    fn restore_to_checkpoint(&self, region: &str, data: &[u8]) -> Result<()> {
        checkpoint::restore_region_checkpoint(self, region, data)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let regions = self.regions.read();
        let mut errors = Vec::new();
        for region in regions.iter() {
            if let Some(cf) = self.db.cf_handle(region) {
                if let Err(err) = self.db.flush_cf(&cf) {
                    errors.push(engine_err(err));
                }
            }
        }
        if let Err(err) = self.db.flush_wal(true) {
            errors.push(engine_err(err));
        }
        info!("closed rocksdb stable store");
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::aggregate(errors))
        }
    }
}

/// Driver for [`RocksStore`].
pub struct RocksStoreDriver {
    config: StoreConfig,
}

impl RocksStoreDriver {
    /// Driver with default configuration.
    pub fn new() -> RocksStoreDriver {
        RocksStoreDriver {
            config: StoreConfig::default(),
        }
    }

    /// Driver with explicit configuration.
    pub fn with_config(config: StoreConfig) -> RocksStoreDriver {
        RocksStoreDriver { config }
    }
}

impl Default for RocksStoreDriver {
    fn default() -> Self {
        RocksStoreDriver::new()
    }
}

impl StoreDriver for RocksStoreDriver {
    fn open(&self, path: &Path) -> Result<Box<dyn StableStore>> {
        let path: PathBuf = path.to_path_buf();
        Ok(Box::new(RocksStore::open_with_config(
            path,
            self.config.clone(),
        )?))
    }
}

/// Register this driver under [`DRIVER_NAME`].
///
/// Call once during program setup; registering twice panics.
pub fn register_driver() {
    palisade_core::register_store_driver(DRIVER_NAME, Arc::new(RocksStoreDriver::new()));
}
