//! Region name rules.
//!
//! A region is a named, independent keyspace within a [`StableStore`].
//! Drivers that map regions onto column families reserve the engine's
//! `default` family for their own state, so that name is rejected here for
//! every driver.
//!
//! [`StableStore`]: crate::store::StableStore

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// Region name reserved for engine-internal state.
pub const RESERVED_REGION: &str = "default";

/// Characters a region name may contain.
pub const REGION_NAME_PATTERN: &str = r"[0-9A-Za-z_\-]+";

// Anchored: the whole name must match, not just a substring of it.
static REGION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^{REGION_NAME_PATTERN}$")).unwrap());

/// Validate a region name.
///
/// Accepts non-empty names made of `[0-9A-Za-z_\-]` and rejects the reserved
/// `default` name.
pub fn validate_region_name(name: &str) -> Result<()> {
    if name == RESERVED_REGION {
        return Err(Error::InvalidRegionName {
            region: name.to_string(),
            reason: format!("'{RESERVED_REGION}' is reserved for engine state"),
        });
    }
    if !REGION_NAME.is_match(name) {
        return Err(Error::InvalidRegionName {
            region: name.to_string(),
            reason: format!("allowed characters are {REGION_NAME_PATTERN}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_word_characters() {
        for name in ["users", "Users_2", "a", "a-b-c", "0"] {
            assert!(validate_region_name(name).is_ok(), "rejected {name}");
        }
    }

    #[test]
    fn rejects_empty_and_punctuation() {
        for name in ["", "a b", "a/b", "a.b", "ключ", "a\nb"] {
            assert!(validate_region_name(name).is_err(), "accepted {name:?}");
        }
    }

    #[test]
    fn rejects_partial_matches() {
        // The pattern must cover the whole name, not just one slice of it.
        assert!(validate_region_name("ok!bad").is_err());
    }

    #[test]
    fn rejects_reserved_name() {
        assert!(validate_region_name(RESERVED_REGION).is_err());
    }
}
