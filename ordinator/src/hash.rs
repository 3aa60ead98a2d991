//! Hashing of keys and derived per-slot metadata.
use std::hash::{BuildHasher, BuildHasherDefault};

use zwohash::ZwoHasher;

/// Computes the hash of a key using the workspace's default hasher.
///
/// Slots are indexed by the low bits and control bytes are taken from the top 7 bits, so the
/// hasher output is passed through a 64-bit finalizer making every output bit depend on every key
/// bit.
#[inline]
pub fn hash_key(key: i64) -> u64 {
    let mut hash = <BuildHasherDefault<ZwoHasher>>::default().hash_one(key);
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xff51_afd7_ed55_8ccd);
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    hash ^ (hash >> 33)
}

/// The control byte stored for an occupied big core slot, always below `0x80`.
#[inline(always)]
pub fn control_byte(hash: u64) -> u8 {
    (hash >> (u64::BITS - 7)) as u8
}
