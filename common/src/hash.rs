// FNV-1a 32-bit hashing for striped concurrent maps
//
// A fixed, non-cryptographic hash suitable for distributing keys across
// lock stripes. Deliberately not randomized/seeded: a striped map's
// stripe assignment only needs to spread keys evenly, not resist
// adversarial collisions.

use std::hash::{Hash, Hasher};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// A [`Hasher`] implementing 32-bit FNV-1a.
pub struct Fnv1a32(u32);

impl Default for Fnv1a32 {
    #[inline]
    fn default() -> Self {
        Fnv1a32(FNV_OFFSET_BASIS)
    }
}

impl Hasher for Fnv1a32 {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u32;
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0 as u64
    }
}

/// Hashes `key` with FNV-1a and reduces modulo `stripe_count`.
///
/// `stripe_count` must be nonzero.
#[inline]
pub fn stripe_index<K: Hash + ?Sized>(key: &K, stripe_count: usize) -> usize {
    let mut hasher = Fnv1a32::default();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % stripe_count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stripe_index_in_range() {
        for k in 0u32..500 {
            let idx = stripe_index(&k, 2003);
            assert!(idx < 2003);
        }
    }

    #[test]
    fn test_stripe_index_deterministic() {
        assert_eq!(stripe_index(&"IBM", 2003), stripe_index(&"IBM", 2003));
        assert_eq!(stripe_index(&42u32, 2003), stripe_index(&42u32, 2003));
    }

    #[test]
    fn test_stripe_index_distributes() {
        let mut buckets = vec![0usize; 16];
        for k in 0u32..4096 {
            buckets[stripe_index(&k, 16)] += 1;
        }
        // No bucket should be wildly over/under-represented for a
        // simple sequential key sweep.
        for count in buckets {
            assert!(count > 100 && count < 400, "uneven distribution: {}", count);
        }
    }
}
