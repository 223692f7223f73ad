//! Value hashing for cardinality collection.
//!
//! Counters only ever see 64-bit hashes. Every shard must hash with the same
//! function and seed, otherwise ordinals merged across shards would mix
//! unrelated hash spaces.

use std::hash::Hasher;

/// HASH_SEED is the xxhash seed shared by all shards.
pub const HASH_SEED: u64 = 0;

/// hash_key computes a hash of key. Hash is always non-zero.
pub fn hash_key(key: &[u8]) -> u64 {
    let mut xx_hash = twox_hash::XxHash64::with_seed(HASH_SEED);
    xx_hash.write(key);
    let mut h = xx_hash.finish();

    if h == 0 {
        h = 1;
    }

    h
}

/// hash_u64 computes a hash of an u64. Hash is always non-zero.
pub fn hash_u64(key: u64) -> u64 {
    let buf = key.to_be_bytes();
    hash_key(&buf)
}

pub fn hash_str(key: &str) -> u64 {
    hash_key(key.as_bytes())
}

#[cfg(test)]
mod tests {
    use crate::hash::{hash_key, hash_str, hash_u64};

    #[test]
    fn test_hash_is_deterministic() {
        let a = hash_key([2, 3, 4, 5].as_slice());
        let b = hash_key([2, 3, 4, 5].as_slice());
        assert_eq!(a, b, "unexpected hash: got {}, exp {}", b, a);
    }

    #[test]
    fn test_hash_str_matches_bytes() {
        assert_eq!(hash_str("db0"), hash_key(b"db0"));
    }

    #[test]
    fn test_hash_u64_uses_big_endian_bytes() {
        let exp = hash_key(&7_u64.to_be_bytes());
        assert_eq!(hash_u64(7), exp);
        assert_ne!(hash_u64(7), hash_u64(8));
    }

    #[test]
    fn test_hash_empty_key_is_non_zero() {
        assert_ne!(hash_key(&[]), 0);
    }
}
