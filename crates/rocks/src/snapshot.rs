//! Point-in-time views and cursors over the RocksDB store.

use std::collections::HashMap;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, DBRawIteratorWithThreadMode, ReadOptions, SnapshotWithThreadMode,
};

use palisade_core::{Error, Range, RegionIter, Result, StoreSnapshot};

use crate::{engine_err, Db};

/// A whole-database RocksDB snapshot covering every region.
///
/// Column-family handles are captured at acquisition, so the view stays
/// pinned to the region set of that moment: a region dropped afterwards
/// still reads consistently here, and a region created afterwards is not
/// visible.
pub struct RocksSnapshot<'db> {
    snap: SnapshotWithThreadMode<'db, Db>,
    handles: HashMap<String, Arc<BoundColumnFamily<'db>>>,
}

impl<'db> RocksSnapshot<'db> {
    pub(crate) fn new(
        db: &'db Db,
        regions: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<RocksSnapshot<'db>> {
        let mut handles = HashMap::new();
        for region in regions {
            let region = region.as_ref();
            let cf = db.cf_handle(region).ok_or_else(|| {
                Error::Storage(format!("column family missing for region '{region}'"))
            })?;
            handles.insert(region.to_string(), cf);
        }
        Ok(RocksSnapshot {
            snap: db.snapshot(),
            handles,
        })
    }

    fn cf(&self, region: &str) -> Result<&Arc<BoundColumnFamily<'db>>> {
        self.handles.get(region).ok_or_else(|| Error::RegionNotFound {
            region: region.to_string(),
        })
    }
}

impl StoreSnapshot for RocksSnapshot<'_> {
    fn get(&self, region: &str, key: &[u8]) -> Result<Vec<u8>> {
        let cf = self.cf(region)?;
        match self.snap.get_cf(cf, key).map_err(engine_err)? {
            Some(value) => Ok(value),
            None => Err(Error::KeyNotFound),
        }
    }

    fn multi_get(&self, region: &str, keys: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>> {
        let cf = self.cf(region)?;
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.snap.get_cf(cf, key).map_err(engine_err)?);
        }
        Ok(values)
    }

    fn has(&self, region: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(region)?;
        Ok(self.snap.get_cf(cf, key).map_err(engine_err)?.is_some())
    }

    fn iter<'s>(&'s self, region: &str, range: Range) -> Result<Box<dyn RegionIter + 's>> {
        let cf = self.cf(region)?;
        let mut opts = ReadOptions::default();
        opts.fill_cache(false);
        if let Some(start) = &range.start {
            opts.set_iterate_lower_bound(start.clone());
        }
        if let Some(end) = &range.end {
            opts.set_iterate_upper_bound(end.clone());
        }
        Ok(Box::new(RocksIter {
            inner: self.snap.raw_iterator_cf_opt(cf, opts),
        }))
    }
}

/// A raw RocksDB cursor bounded to one region and range.
pub struct RocksIter<'a> {
    inner: DBRawIteratorWithThreadMode<'a, Db>,
}

impl RegionIter for RocksIter<'_> {
    fn first(&mut self) -> bool {
        self.inner.seek_to_first();
        self.inner.valid()
    }

    fn last(&mut self) -> bool {
        self.inner.seek_to_last();
        self.inner.valid()
    }

    fn seek(&mut self, key: &[u8]) -> bool {
        self.inner.seek(key);
        self.inner.valid()
    }

    fn next(&mut self) -> bool {
        if !self.inner.valid() {
            return false;
        }
        self.inner.next();
        self.inner.valid()
    }

    fn prev(&mut self) -> bool {
        if !self.inner.valid() {
            return false;
        }
        self.inner.prev();
        self.inner.valid()
    }

    fn key(&self) -> &[u8] {
        self.inner.key().unwrap_or(&[])
    }

    fn value(&self) -> &[u8] {
        self.inner.value().unwrap_or(&[])
    }

    fn status(&self) -> Result<()> {
        self.inner.status().map_err(engine_err)
    }
}
