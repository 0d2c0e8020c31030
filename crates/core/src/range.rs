//! Key ranges for iteration.

/// A half-open key range `[start, end)` within one region.
///
/// `None` bounds are unbounded: `Range::all()` scans a whole region.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Range {
    /// Inclusive lower bound, or `None` for the start of the region.
    pub start: Option<Vec<u8>>,
    /// Exclusive upper bound, or `None` for the end of the region.
    pub end: Option<Vec<u8>>,
}

impl Range {
    /// The full keyspace of a region.
    pub fn all() -> Range {
        Range::default()
    }

    /// The range `[start, end)`.
    pub fn new(start: &[u8], end: &[u8]) -> Range {
        Range {
            start: Some(start.to_vec()),
            end: Some(end.to_vec()),
        }
    }

    /// The range covering every key that begins with `prefix`.
    ///
    /// The upper bound is the prefix with its last non-`0xFF` byte
    /// incremented; a prefix of all `0xFF` bytes is unbounded above.
    pub fn prefix(prefix: &[u8]) -> Range {
        let mut end = None;
        for i in (0..prefix.len()).rev() {
            if prefix[i] < 0xFF {
                let mut bound = prefix[..=i].to_vec();
                bound[i] += 1;
                end = Some(bound);
                break;
            }
        }
        Range {
            start: Some(prefix.to_vec()),
            end,
        }
    }

    /// Whether `key` falls inside this range.
    pub fn contains(&self, key: &[u8]) -> bool {
        if let Some(start) = &self.start {
            if key < start.as_slice() {
                return false;
            }
        }
        if let Some(end) = &self.end {
            if key >= end.as_slice() {
                return false;
            }
        }
        true
    }
}
