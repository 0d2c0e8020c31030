//! Error types shared across the palisade crates.
//!
//! A single `thiserror` enum covers the caller-facing taxonomy. Consensus-side
//! storage errors (`Compacted`, `Unavailable`, `SnapshotOutOfDate`) are not
//! here: the log store speaks `raft::Error` directly, since those values are
//! interpreted by the consensus library rather than by application code.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type alias for palisade operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the caller-facing surface of the store and engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Point read missed.
    #[error("key not found")]
    KeyNotFound,

    /// Operation names a region this store does not have.
    #[error("region '{region}' not found")]
    RegionNotFound {
        /// The missing region.
        region: String,
    },

    /// Create-region collision.
    #[error("region '{region}' already exists")]
    RegionAlreadyExists {
        /// The colliding region.
        region: String,
    },

    /// Region name failed validation.
    #[error("invalid region name '{region}': {reason}")]
    InvalidRegionName {
        /// The rejected name.
        region: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No driver registered under the requested name.
    #[error("driver '{driver}' not found")]
    DriverNotFound {
        /// The unknown driver name.
        driver: String,
    },

    /// The replication engine has shut down.
    #[error("replication engine is closed")]
    Closed,

    /// I/O error from the filesystem or a compression stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Checkpoint or command stream could not be encoded/decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Engine-level storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Several independent failures, every underlying cause preserved.
    #[error(transparent)]
    Aggregate(AggregateError),
}

impl Error {
    /// Collapse a list of failures into one error.
    ///
    /// A single cause is returned as itself; several causes become an
    /// [`Error::Aggregate`] that names each one.
    pub fn aggregate(mut errors: Vec<Error>) -> Error {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            Error::Aggregate(AggregateError { errors })
        }
    }

    /// Whether this error (or any aggregated cause) is `RegionNotFound`.
    pub fn is_region_not_found(&self) -> bool {
        match self {
            Error::RegionNotFound { .. } => true,
            Error::Aggregate(agg) => agg.errors.iter().any(Error::is_region_not_found),
            _ => false,
        }
    }

    /// Whether this error is a point-read miss.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound)
    }
}

/// A collection of failures reported as one error.
///
/// Produced by operations that touch several regions and must not hide any
/// individual cause behind the first one encountered.
#[derive(Debug)]
pub struct AggregateError {
    /// The underlying failures, in the order they occurred.
    pub errors: Vec<Error>,
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failures: ", self.errors.len())?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
