//! In-memory stable store.
//!
//! Reference driver for tests and small deployments: regions are
//! `BTreeMap`s behind one reader/writer lock, and a snapshot is a deep
//! clone of every region taken under the read lock. Expensive but exactly
//! consistent — writers hold the lock exclusively, so a snapshot observes
//! either all of a batch or none of it.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

use parking_lot::RwLock;
use tracing::info;

use crate::batch::{Batch, WriteOp};
use crate::checkpoint;
use crate::error::{Error, Result};
use crate::range::Range;
use crate::region::validate_region_name;
use crate::store::{RegionIter, StableStore, StoreDriver, StoreSnapshot};

type RegionMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// A stable store held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    regions: RwLock<BTreeMap<String, RegionMap>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl StableStore for MemoryStore {
    fn create_region(&self, name: &str) -> Result<()> {
        validate_region_name(name)?;
        let mut regions = self.regions.write();
        if regions.contains_key(name) {
            return Err(Error::RegionAlreadyExists {
                region: name.to_string(),
            });
        }
        regions.insert(name.to_string(), RegionMap::new());
        info!(region = name, "created region");
        Ok(())
    }

    fn drop_region(&self, name: &str) -> Result<()> {
        let mut regions = self.regions.write();
        if regions.remove(name).is_none() {
            return Err(Error::RegionNotFound {
                region: name.to_string(),
            });
        }
        info!(region = name, "dropped region");
        Ok(())
    }

    fn has_region(&self, name: &str) -> bool {
        self.regions.read().contains_key(name)
    }

    fn regions(&self) -> Vec<String> {
        self.regions.read().keys().cloned().collect()
    }

    fn write(&self, batch: &Batch) -> Result<()> {
        let mut regions = self.regions.write();

        let missing: Vec<Error> = batch
            .regions()
            .filter(|region| !regions.contains_key(*region))
            .map(|region| Error::RegionNotFound {
                region: region.to_string(),
            })
            .collect();
        if !missing.is_empty() {
            return Err(Error::aggregate(missing));
        }

        for (region, ops) in batch.per_region() {
            let map = regions.get_mut(region).expect("membership checked above");
            for op in ops {
                match op {
                    WriteOp::Put { key, value } => {
                        map.insert(key.clone(), value.clone());
                    }
                    WriteOp::Delete { key } => {
                        map.remove(key);
                    }
                }
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<Box<dyn StoreSnapshot + '_>> {
        let regions = self.regions.read();
        Ok(Box::new(MemorySnapshot {
            regions: regions.clone(),
        }))
    }

    fn create_checkpoint(&self, region: &str) -> Result<Vec<u8>> {
        let snapshot = self.snapshot()?;
        checkpoint::write_region_checkpoint(snapshot.as_ref(), region)
    }

    fn restore_to_checkpoint(&self, region: &str, data: &[u8]) -> Result<()> {
        checkpoint::restore_region_checkpoint(self, region, data)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A deep-cloned point-in-time view of a [`MemoryStore`].
pub struct MemorySnapshot {
    regions: BTreeMap<String, RegionMap>,
}

impl MemorySnapshot {
    fn region(&self, name: &str) -> Result<&RegionMap> {
        self.regions.get(name).ok_or_else(|| Error::RegionNotFound {
            region: name.to_string(),
        })
    }
}

impl StoreSnapshot for MemorySnapshot {
    fn get(&self, region: &str, key: &[u8]) -> Result<Vec<u8>> {
        self.region(region)?
            .get(key)
            .cloned()
            .ok_or(Error::KeyNotFound)
    }

    fn multi_get(&self, region: &str, keys: &[&[u8]]) -> Result<Vec<Option<Vec<u8>>>> {
        let map = self.region(region)?;
        Ok(keys.iter().map(|key| map.get(*key).cloned()).collect())
    }

    fn has(&self, region: &str, key: &[u8]) -> Result<bool> {
        Ok(self.region(region)?.contains_key(key))
    }

    fn iter<'s>(&'s self, region: &str, range: Range) -> Result<Box<dyn RegionIter + 's>> {
        let data = self.region(region)?;
        Ok(Box::new(MemoryIter {
            data,
            range,
            current: None,
        }))
    }
}

struct MemoryIter<'a> {
    data: &'a RegionMap,
    range: Range,
    current: Option<(&'a [u8], &'a [u8])>,
}

fn lower(range: &Range) -> Bound<&[u8]> {
    match &range.start {
        Some(start) => Bound::Included(start.as_slice()),
        None => Bound::Unbounded,
    }
}

fn upper(range: &Range) -> Bound<&[u8]> {
    match &range.end {
        Some(end) => Bound::Excluded(end.as_slice()),
        None => Bound::Unbounded,
    }
}

// BTreeMap::range panics on inverted bounds; an inverted or degenerate
// span is just an empty cursor here.
fn span_is_empty(lo: &Bound<&[u8]>, hi: &Bound<&[u8]>) -> bool {
    let low = match lo {
        Bound::Included(k) | Bound::Excluded(k) => *k,
        Bound::Unbounded => return false,
    };
    let high = match hi {
        Bound::Included(k) | Bound::Excluded(k) => *k,
        Bound::Unbounded => return false,
    };
    low > high || (low == high && matches!(lo, Bound::Excluded(_)))
}

fn select<'m>(
    data: &'m RegionMap,
    lo: Bound<&[u8]>,
    hi: Bound<&[u8]>,
    backwards: bool,
) -> Option<(&'m [u8], &'m [u8])> {
    if span_is_empty(&lo, &hi) {
        return None;
    }
    let mut span = data.range::<[u8], _>((lo, hi));
    let found = if backwards {
        span.next_back()
    } else {
        span.next()
    };
    found.map(|(k, v)| (k.as_slice(), v.as_slice()))
}

impl RegionIter for MemoryIter<'_> {
    fn first(&mut self) -> bool {
        self.current = select(self.data, lower(&self.range), upper(&self.range), false);
        self.current.is_some()
    }

    fn last(&mut self) -> bool {
        self.current = select(self.data, lower(&self.range), upper(&self.range), true);
        self.current.is_some()
    }

    fn seek(&mut self, key: &[u8]) -> bool {
        let from: &[u8] = match &self.range.start {
            Some(start) if start.as_slice() > key => start,
            _ => key,
        };
        self.current = select(self.data, Bound::Included(from), upper(&self.range), false);
        self.current.is_some()
    }

    fn next(&mut self) -> bool {
        let Some((cur, _)) = self.current else {
            return false;
        };
        self.current = select(self.data, Bound::Excluded(cur), upper(&self.range), false);
        self.current.is_some()
    }

    fn prev(&mut self) -> bool {
        let Some((cur, _)) = self.current else {
            return false;
        };
        self.current = select(self.data, lower(&self.range), Bound::Excluded(cur), true);
        self.current.is_some()
    }

    fn key(&self) -> &[u8] {
        self.current.map(|(k, _)| k).unwrap_or(&[])
    }

    fn value(&self) -> &[u8] {
        self.current.map(|(_, v)| v).unwrap_or(&[])
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}

/// Driver for [`MemoryStore`]; the path is ignored.
pub struct MemoryStoreDriver;

impl StoreDriver for MemoryStoreDriver {
    fn open(&self, _path: &Path) -> Result<Box<dyn StableStore>> {
        Ok(Box::new(MemoryStore::new()))
    }
}
