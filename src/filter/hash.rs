//! Seeded hash family and filter sizing.

use crate::config::{FilterParams, MAX_BIT, MAX_BLOCKS};
use crate::error::{FrontierError, Result};

/// Distinct small odd seeds, one per hash function.
const SEEDS: [u64; 32] = [
    5, 7, 11, 13, 31, 37, 61, 67, 73, 97, 101, 131, 137, 151, 173, 193, 211, 229, 241, 257, 263,
    281, 307, 331, 353, 373, 389, 409, 431, 449, 461, 487,
];

/// Most hash functions a filter may use.
pub const MAX_HASH_COUNT: usize = SEEDS.len();

/// `k` independent hash functions mapping a fingerprint to offsets in `[0, 2^bit)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashFamily {
    seeds: Vec<u64>,
    mask: u64,
}

impl HashFamily {
    pub fn new(bit: u8, hash_count: usize) -> Result<Self> {
        if bit == 0 || bit > MAX_BIT {
            return Err(FrontierError::config(format!(
                "bit must be between 1 and {}, got {}.",
                MAX_BIT, bit
            )));
        }
        if hash_count == 0 || hash_count > MAX_HASH_COUNT {
            return Err(FrontierError::config(format!(
                "hash_count must be between 1 and {}, got {}.",
                MAX_HASH_COUNT, hash_count
            )));
        }
        Ok(Self {
            seeds: SEEDS[..hash_count].to_vec(),
            mask: (1u64 << bit) - 1,
        })
    }

    pub fn hash_count(&self) -> usize {
        self.seeds.len()
    }

    /// Size of the offset range, `m`.
    pub fn size(&self) -> u64 {
        self.mask + 1
    }

    /// One offset per hash function, in seed order.
    pub fn offsets(&self, value: &str) -> Vec<u64> {
        self.seeds
            .iter()
            .map(|&seed| {
                let acc = value
                    .bytes()
                    .fold(0u64, |acc, byte| seed.wrapping_mul(acc).wrapping_add(byte as u64));
                acc & self.mask
            })
            .collect()
    }
}

/// Parameters derived from an expected item count and a target false-positive rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSizing {
    /// Total offsets, `m`.
    pub bits: u64,
    /// `ceil(log2 m)`, the per-shard `bit` setting.
    pub bit: u8,
    pub hash_count: usize,
    /// Total memory in bytes.
    pub memory_bytes: u64,
    pub block_count: usize,
}

impl FilterSizing {
    /// Sizes a filter for `capacity` items at false-positive rate `error_rate`,
    /// split into shards of at most `per_shard_bytes`.
    pub fn for_capacity(capacity: u64, error_rate: f64, per_shard_bytes: u64) -> Result<Self> {
        if capacity == 0 {
            return Err(FrontierError::config("capacity must be greater than 0."));
        }
        if !(error_rate > 0.0 && error_rate < 1.0) {
            return Err(FrontierError::config(format!(
                "error_rate must be in (0, 1), got {}.",
                error_rate
            )));
        }
        if per_shard_bytes == 0 {
            return Err(FrontierError::config("per_shard_bytes must be greater than 0."));
        }

        let ln2 = std::f64::consts::LN_2;
        let n = capacity as f64;
        let bits = (-n * error_rate.ln() / (ln2 * ln2)).ceil().max(1.0) as u64;
        let hash_count = ((bits as f64 / n) * ln2).ceil().max(1.0) as usize;
        let memory_bytes = bits.div_ceil(8);
        let block_count = memory_bytes.div_ceil(per_shard_bytes) as usize;
        let bit = (bits as f64).log2().ceil().max(1.0) as u8;

        Ok(Self {
            bits,
            bit,
            hash_count,
            memory_bytes,
            block_count,
        })
    }

    /// Converts into filter parameters, rejecting sizes the store cannot hold.
    pub fn to_params(&self) -> Result<FilterParams> {
        if self.hash_count > MAX_HASH_COUNT {
            return Err(FrontierError::config(format!(
                "sizing needs {} hash functions, at most {} are available.",
                self.hash_count, MAX_HASH_COUNT
            )));
        }
        if self.bit > MAX_BIT || self.block_count > MAX_BLOCKS {
            return Err(FrontierError::config(format!(
                "sizing of {} bits in {} blocks exceeds the store limits.",
                self.bits, self.block_count
            )));
        }
        let params = FilterParams {
            bit: self.bit,
            hash_count: self.hash_count,
            block_count: self.block_count.max(1),
        };
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_deterministic_and_in_range() {
        let family = HashFamily::new(10, 6).unwrap();
        let a = family.offsets("http://example.com/a");
        assert_eq!(a.len(), 6);
        assert_eq!(a, family.offsets("http://example.com/a"));
        assert!(a.iter().all(|&o| o < 1024));
        assert_ne!(a, family.offsets("http://example.com/b"));
    }

    #[test]
    fn seeds_give_distinct_functions() {
        let family = HashFamily::new(30, 6).unwrap();
        let offsets = family.offsets("0a1b2c3d4e5f");
        let mut unique = offsets.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), offsets.len());
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(HashFamily::new(0, 6).is_err());
        assert!(HashFamily::new(33, 6).is_err());
        assert!(HashFamily::new(20, 0).is_err());
        assert!(HashFamily::new(20, MAX_HASH_COUNT + 1).is_err());
    }

    #[test]
    fn sizing_matches_textbook_formulas() {
        // 1M items at 1% need ~9.59M bits and 7 hashes.
        let sizing = FilterSizing::for_capacity(1_000_000, 0.01, 512 * 1024 * 1024).unwrap();
        assert_eq!(sizing.bits, 9_585_059);
        assert_eq!(sizing.hash_count, 7);
        assert_eq!(sizing.memory_bytes, 1_198_133);
        assert_eq!(sizing.block_count, 1);
        assert_eq!(sizing.bit, 24);

        let params = sizing.to_params().unwrap();
        assert_eq!(params.hash_count, 7);
        assert_eq!(params.bit, 24);
    }

    #[test]
    fn small_shards_split_into_blocks() {
        let sizing = FilterSizing::for_capacity(1_000_000, 0.01, 100_000).unwrap();
        assert_eq!(sizing.block_count, 12);
    }

    #[test]
    fn sizing_rejects_nonsense_input() {
        assert!(FilterSizing::for_capacity(0, 0.01, 1024).is_err());
        assert!(FilterSizing::for_capacity(10, 1.5, 1024).is_err());
        assert!(FilterSizing::for_capacity(10, 0.01, 0).is_err());
    }
}
