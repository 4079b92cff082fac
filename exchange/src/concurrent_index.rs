// Striped concurrent map.
//
// A fixed number of stripes, each independently lockable, with the
// key's hash reduced modulo the stripe count choosing which stripe
// owns it. Each stripe is a `parking_lot::RwLock` guarding a `HashMap`,
// so readers on one stripe never block readers or writers on another.

use common::hash::stripe_index;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;

/// Default stripe count. Prime, to spread sequential keys evenly.
pub const DEFAULT_STRIPES: usize = 2003;

/// A concurrent key/value map split into independently-locked stripes.
///
/// `set` is idempotent: if a key is already present its value is left
/// untouched and `set` reports that nothing changed (first
/// registration wins). Used both for lazily creating an instrument's
/// `OrderBook` and for publishing a resting order into the global
/// index exactly once.
pub struct ConcurrentIndex<K, V> {
    stripes: Vec<RwLock<HashMap<K, V>>>,
}

impl<K, V> ConcurrentIndex<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::with_stripes(DEFAULT_STRIPES)
    }

    pub fn with_stripes(stripe_count: usize) -> Self {
        assert!(stripe_count > 0, "stripe count must be non-zero");
        let mut stripes = Vec::with_capacity(stripe_count);
        stripes.resize_with(stripe_count, || RwLock::new(HashMap::new()));
        Self { stripes }
    }

    fn stripe(&self, key: &K) -> &RwLock<HashMap<K, V>> {
        &self.stripes[stripe_index(key, self.stripes.len())]
    }

    /// Returns a clone of the value for `key`, if present.
    pub fn get(&self, key: &K) -> Option<V> {
        self.stripe(key).read().get(key).cloned()
    }

    /// Inserts `value` for `key` only if no value is present yet.
    ///
    /// Returns the value now stored under `key`: either the one just
    /// inserted, or the one some other caller won the race to insert
    /// first. Callers that need to know which happened should compare
    /// the returned value for identity/equality with what they passed
    /// in, or use [`Self::get_or_insert_with`] instead.
    pub fn set(&self, key: K, value: V) -> V {
        let mut guard = self.stripe(&key).write();
        guard.entry(key).or_insert(value).clone()
    }

    /// Like [`Self::set`], but only constructs the value on the miss
    /// path. Useful when building `value` is not free (e.g. spawning
    /// an `OrderBook`'s worker threads).
    pub fn get_or_insert_with<F>(&self, key: K, make: F) -> V
    where
        F: FnOnce() -> V,
    {
        let mut guard = self.stripe(&key).write();
        if let Some(existing) = guard.get(&key) {
            return existing.clone();
        }
        let value = make();
        guard.insert(key, value.clone());
        value
    }

    /// Removes and returns the value for `key`, if present.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.stripe(key).write().remove(key)
    }

    /// Total number of entries across every stripe. For diagnostics
    /// only; racy under concurrent mutation.
    pub fn len(&self) -> usize {
        self.stripes.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for ConcurrentIndex<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let index: ConcurrentIndex<u32, &'static str> = ConcurrentIndex::with_stripes(4);
        index.set(1, "one");
        assert_eq!(index.get(&1), Some("one"));
        assert_eq!(index.get(&2), None);
    }

    #[test]
    fn set_is_idempotent_first_registration_wins() {
        let index: ConcurrentIndex<u32, &'static str> = ConcurrentIndex::with_stripes(4);
        let first = index.set(1, "first");
        let second = index.set(1, "second");
        assert_eq!(first, "first");
        assert_eq!(second, "first");
        assert_eq!(index.get(&1), Some("first"));
    }

    #[test]
    fn get_or_insert_with_only_builds_on_miss() {
        let index: ConcurrentIndex<u32, u32> = ConcurrentIndex::with_stripes(4);
        let mut calls = 0;
        let v1 = index.get_or_insert_with(1, || {
            calls += 1;
            100
        });
        let v2 = index.get_or_insert_with(1, || {
            calls += 1;
            200
        });
        assert_eq!(v1, 100);
        assert_eq!(v2, 100);
        assert_eq!(calls, 1);
    }

    #[test]
    fn remove_clears_entry() {
        let index: ConcurrentIndex<u32, &'static str> = ConcurrentIndex::with_stripes(4);
        index.set(1, "one");
        assert_eq!(index.remove(&1), Some("one"));
        assert_eq!(index.get(&1), None);
        assert_eq!(index.remove(&1), None);
    }

    #[test]
    fn len_counts_entries_across_stripes() {
        let index: ConcurrentIndex<u32, u32> = ConcurrentIndex::with_stripes(8);
        assert!(index.is_empty());
        for i in 0..50 {
            index.set(i, i * 10);
        }
        assert_eq!(index.len(), 50);
    }

    #[test]
    fn concurrent_inserts_from_many_threads_all_land() {
        use std::sync::Arc;
        use std::thread;

        let index: Arc<ConcurrentIndex<u32, u32>> = Arc::new(ConcurrentIndex::with_stripes(16));
        let mut handles = Vec::new();
        for t in 0..8u32 {
            let index = index.clone();
            handles.push(thread::spawn(move || {
                for i in 0..100u32 {
                    let key = t * 100 + i;
                    index.set(key, key);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(index.len(), 800);
    }
}
