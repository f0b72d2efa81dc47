//! # Filter Module
//!
//! Probabilistic request deduplication sharded over the shared store.
//!
//! ## Overview
//!
//! - [`hash`]: the seeded hash family and a sizing helper.
//! - [`approximate`]: a bloom or counting-bloom filter split into shards.
//! - [`lock`]: TTL-bound advisory locks with bounded backoff.
//! - [`dedup`]: the `request_seen` gate the scheduler calls.
//!
//! Shards and locks are both addressed by the leading hex digits of a
//! fingerprint: one digit for up to 16 members, two for up to 256 and three
//! for up to 4096.

pub mod approximate;
pub mod dedup;
pub mod hash;
pub mod lock;

pub use approximate::ApproximateSet;
pub use dedup::DedupFilter;
pub use hash::{FilterSizing, HashFamily};
pub use lock::{AdvisoryLock, LockBackoff, LockPool};

use crate::error::{FrontierError, Result};

/// Hex digits needed to address `count` members.
pub(crate) fn prefix_width(count: usize) -> usize {
    match count {
        0..=16 => 1,
        17..=256 => 2,
        _ => 3,
    }
}

/// Value of the first `width` hex digits of `fingerprint`.
pub(crate) fn hex_index(fingerprint: &str, width: usize) -> Result<usize> {
    fingerprint
        .get(..width)
        .filter(|prefix| prefix.bytes().all(|b| b.is_ascii_hexdigit()))
        .and_then(|prefix| usize::from_str_radix(prefix, 16).ok())
        .ok_or_else(|| FrontierError::InvalidFingerprint(fingerprint.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_follows_member_count() {
        assert_eq!(prefix_width(1), 1);
        assert_eq!(prefix_width(16), 1);
        assert_eq!(prefix_width(17), 2);
        assert_eq!(prefix_width(256), 2);
        assert_eq!(prefix_width(4096), 3);
    }

    #[test]
    fn hex_index_rejects_short_or_non_hex_prefixes() {
        assert_eq!(hex_index("a3ff", 2).unwrap(), 0xa3);
        assert_eq!(hex_index("A3ff", 1).unwrap(), 0xa);
        assert!(hex_index("a", 2).is_err());
        assert!(hex_index("g0", 1).is_err());
        assert!(hex_index("+1", 2).is_err());
    }
}
