//! Bounded statement cache with bucketed LRU eviction
//!
//! This module provides the per-connection cache of prepared and callable
//! statements. Entries are spread over `ceil(max_size * 4 / 3)` buckets, each
//! holding at most [`BUCKET_SIZE`] entries. Recency is tracked per bucket, not
//! per entry: adding to a bucket moves the whole bucket to the most recently
//! used end of an intrusive doubly-linked list, and capacity evictions take an
//! entry from the least recently used bucket.
//!
//! # Statement Lifecycle
//!
//! - A statement handed to an application is *removed* from the cache, so a
//!   cached statement is never in use by two handles at once
//! - When the application closes it, the statement is *added* back
//! - Anything the cache returns from [`StatementCache::add`] or
//!   [`StatementCache::remove_all`] is no longer tracked and must be closed by
//!   the caller
//!
//! The cache performs no locking. Callers serialize access, normally by owning
//! one cache per physical connection.

use std::fmt;
use std::fmt::Write as _;

use crate::error::{Error, Result};

/// Maximum number of entries chained in one bucket
pub const BUCKET_SIZE: usize = 5;

/// A key that can be stored in a [`StatementCache`]
///
/// The hash picks the bucket; equality decides the match within it. Keys that
/// are equal must return the same hash.
pub trait CacheKey: Eq {
    /// Hash used to select the bucket
    fn cache_hash(&self) -> u64;
}

#[derive(Debug)]
struct Bucket<K, V> {
    slots: Vec<(K, V)>,
    /// Neighbour toward the MRU end
    newer: Option<usize>,
    /// Neighbour toward the LRU end
    older: Option<usize>,
    linked: bool,
}

impl<K, V> Bucket<K, V> {
    fn new() -> Self {
        Self {
            slots: Vec::with_capacity(BUCKET_SIZE),
            newer: None,
            older: None,
            linked: false,
        }
    }
}

/// Fixed-capacity multi-value cache with per-bucket LRU ordering
///
/// Several values may be stored under equal keys; [`remove`](Self::remove)
/// takes one of them.
///
/// # Example
///
/// ```rust
/// use rsadapter::{StatementCache, StatementCacheKey, StatementKind};
///
/// let mut cache: StatementCache<StatementCacheKey, u32> = StatementCache::new(10);
///
/// let key = StatementCacheKey::new("SELECT name FROM emp WHERE id = ?", StatementKind::Prepared);
/// assert!(cache.add(key.clone(), 7).is_none());
///
/// // Taking the statement out hands it to exactly one user
/// assert_eq!(cache.remove(&key), Some(7));
/// assert!(cache.remove(&key).is_none());
/// ```
#[derive(Debug)]
pub struct StatementCache<K, V> {
    buckets: Vec<Bucket<K, V>>,
    mru: Option<usize>,
    lru: Option<usize>,
    len: usize,
    max_size: usize,
    /// Number of entries discarded so far; also rotates the LRU victim slot
    discards: usize,
}

impl<K: CacheKey, V> StatementCache<K, V> {
    /// Create a cache holding at most `max_size` entries
    ///
    /// # Panics
    ///
    /// Panics if `max_size` is 0. A connection with caching disabled should
    /// not create a cache at all.
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "statement cache size must be greater than 0");
        let num_buckets = (max_size * 4).div_ceil(3);
        Self {
            buckets: (0..num_buckets).map(|_| Bucket::new()).collect(),
            mru: None,
            lru: None,
            len: 0,
            max_size,
            discards: 0,
        }
    }

    /// Add an entry, returning a value that had to be evicted to make room
    ///
    /// A full bucket first drops its last slot. If the cache then holds more
    /// than `max_size` entries, one entry is evicted from the least recently
    /// used bucket. Dropping a slot from a full bucket leaves the entry count
    /// unchanged, so at most one of the two evictions happens per call.
    pub fn add(&mut self, key: K, value: V) -> Option<V> {
        let index = self.bucket_index(&key);
        let mut discarded = None;

        if self.buckets[index].slots.len() >= BUCKET_SIZE {
            if let Some((_, value)) = self.buckets[index].slots.pop() {
                self.len -= 1;
                self.discards += 1;
                tracing::trace!(bucket = index, "Bucket full, discarded last slot");
                discarded = Some(value);
            }
        }

        self.buckets[index].slots.push((key, value));
        self.len += 1;
        self.touch(index);

        if self.len > self.max_size {
            debug_assert!(discarded.is_none());
            return self.evict_lru();
        }

        discarded
    }

    /// Remove and return one value stored under a key equal to `key`
    ///
    /// Returns `None` on a cache miss. Removal does not change the recency of
    /// the bucket.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let index = self.bucket_index(key);
        let bucket = &mut self.buckets[index];

        let Some(pos) = bucket.slots.iter().rposition(|(k, _)| k == key) else {
            tracing::trace!(bucket = index, "Statement cache miss");
            return None;
        };

        let (_, value) = bucket.slots.swap_remove(pos);
        let now_empty = bucket.slots.is_empty();
        self.len -= 1;
        if now_empty {
            self.unlink(index);
        }
        tracing::trace!(bucket = index, "Statement cache hit");
        Some(value)
    }

    /// Empty the cache, returning every value it held
    pub fn remove_all(&mut self) -> Vec<V> {
        let mut values = Vec::with_capacity(self.len);
        for bucket in &mut self.buckets {
            values.extend(bucket.slots.drain(..).map(|(_, value)| value));
            bucket.newer = None;
            bucket.older = None;
            bucket.linked = false;
        }
        self.mru = None;
        self.lru = None;
        self.len = 0;
        tracing::debug!(count = values.len(), "Statement cache cleared");
        values
    }

    /// Move every entry of `other` into this cache
    ///
    /// Buckets of `other` are visited from most to least recently used.
    /// Values evicted along the way are returned instead of being lost, so the
    /// caller can close them.
    pub fn add_all(&mut self, mut other: StatementCache<K, V>) -> Vec<V> {
        let mut overflow = Vec::new();
        let mut cursor = other.mru;

        while let Some(index) = cursor {
            cursor = other.buckets[index].older;
            let slots = std::mem::take(&mut other.buckets[index].slots);
            for (key, value) in slots {
                if let Some(evicted) = self.add(key, value) {
                    overflow.push(evicted);
                }
            }
        }

        tracing::debug!(
            source = other.len,
            overflow = overflow.len(),
            "Statement cache entries migrated"
        );
        overflow
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Configured capacity
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of buckets
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Number of entries discarded by bucket overflow or LRU eviction
    pub fn discards(&self) -> usize {
        self.discards
    }

    /// Check the internal invariants
    ///
    /// A failure means the cache was used concurrently without serialization.
    pub fn verify(&self) -> Result<()> {
        let mut visited = 0;
        let mut entries = 0;
        let mut newer = None;
        let mut cursor = self.mru;

        while let Some(index) = cursor {
            let bucket = self.buckets.get(index).ok_or_else(|| {
                Error::StructuralCorruption(format!("bucket index {} out of range", index))
            })?;
            if !bucket.linked || bucket.slots.is_empty() {
                return Err(Error::StructuralCorruption(format!(
                    "bucket {} is in the LRU chain but empty or unlinked",
                    index
                )));
            }
            if bucket.slots.len() > BUCKET_SIZE {
                return Err(Error::StructuralCorruption(format!(
                    "bucket {} holds {} entries",
                    index,
                    bucket.slots.len()
                )));
            }
            if bucket.newer != newer {
                return Err(Error::StructuralCorruption(format!(
                    "bucket {} has a broken back link",
                    index
                )));
            }
            visited += 1;
            if visited > self.buckets.len() {
                return Err(Error::StructuralCorruption("cycle in LRU chain".to_string()));
            }
            entries += bucket.slots.len();
            newer = Some(index);
            cursor = bucket.older;
        }

        if newer != self.lru {
            return Err(Error::StructuralCorruption("LRU tail mismatch".to_string()));
        }
        let linked = self.buckets.iter().filter(|b| b.linked || !b.slots.is_empty()).count();
        if linked != visited {
            return Err(Error::StructuralCorruption(format!(
                "{} occupied buckets but {} in the LRU chain",
                linked, visited
            )));
        }
        if entries != self.len {
            return Err(Error::StructuralCorruption(format!(
                "size is {} but buckets hold {} entries",
                self.len, entries
            )));
        }
        if self.len > self.max_size {
            return Err(Error::StructuralCorruption(format!(
                "size {} exceeds capacity {}",
                self.len, self.max_size
            )));
        }
        Ok(())
    }

    fn bucket_index(&self, key: &K) -> usize {
        (key.cache_hash() % self.buckets.len() as u64) as usize
    }

    /// Evict one entry from the least recently used bucket
    fn evict_lru(&mut self) -> Option<V> {
        let index = self.lru?;
        let bucket = &mut self.buckets[index];
        if bucket.slots.is_empty() {
            tracing::error!(bucket = index, "Least recently used bucket is empty");
            return None;
        }

        let slot = self.discards % bucket.slots.len();
        let (_, value) = bucket.slots.swap_remove(slot);
        let now_empty = bucket.slots.is_empty();
        self.discards += 1;
        self.len -= 1;
        if now_empty {
            self.unlink(index);
        }
        tracing::trace!(bucket = index, slot, "Evicted statement from least recently used bucket");
        Some(value)
    }

    /// Move a bucket to the MRU end
    fn touch(&mut self, index: usize) {
        if self.mru == Some(index) {
            return;
        }
        if self.buckets[index].linked {
            self.unlink(index);
        }

        let old_mru = self.mru;
        let bucket = &mut self.buckets[index];
        bucket.newer = None;
        bucket.older = old_mru;
        bucket.linked = true;

        match old_mru {
            Some(m) => self.buckets[m].newer = Some(index),
            None => self.lru = Some(index),
        }
        self.mru = Some(index);
    }

    fn unlink(&mut self, index: usize) {
        let (newer, older) = {
            let bucket = &mut self.buckets[index];
            let links = (bucket.newer, bucket.older);
            bucket.newer = None;
            bucket.older = None;
            bucket.linked = false;
            links
        };

        match newer {
            Some(n) => self.buckets[n].older = older,
            None => self.mru = older,
        }
        match older {
            Some(o) => self.buckets[o].newer = newer,
            None => self.lru = newer,
        }
    }
}

impl<K: CacheKey + fmt::Debug, V> StatementCache<K, V> {
    /// Human-readable bucket and LRU layout, for tracing only
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "StatementCache size={} max={} buckets={} discards={}",
            self.len,
            self.max_size,
            self.buckets.len(),
            self.discards
        );

        let mut order = Vec::new();
        let mut cursor = self.mru;
        while let Some(index) = cursor {
            if order.len() > self.buckets.len() {
                break;
            }
            order.push(index);
            cursor = self.buckets[index].older;
        }

        let chain: Vec<String> = order.iter().map(|i| i.to_string()).collect();
        let _ = writeln!(out, "  MRU -> LRU: [{}]", chain.join(", "));
        for index in order {
            let keys: Vec<String> = self.buckets[index]
                .slots
                .iter()
                .map(|(key, _)| format!("{:?}", key))
                .collect();
            let _ = writeln!(out, "  bucket {}: {}", index, keys.join(" | "));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestKey(u64, &'static str);

    impl CacheKey for TestKey {
        fn cache_hash(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn test_bucket_count() {
        assert_eq!(StatementCache::<TestKey, u32>::new(1).num_buckets(), 2);
        assert_eq!(StatementCache::<TestKey, u32>::new(3).num_buckets(), 4);
        assert_eq!(StatementCache::<TestKey, u32>::new(10).num_buckets(), 14);
        assert_eq!(StatementCache::<TestKey, u32>::new(30).num_buckets(), 40);
    }

    #[test]
    #[should_panic]
    fn test_zero_size_panics() {
        let _ = StatementCache::<TestKey, u32>::new(0);
    }

    #[test]
    fn test_add_remove() {
        let mut cache = StatementCache::new(5);
        assert!(cache.add(TestKey(1, "a"), 10).is_none());
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.remove(&TestKey(1, "a")), Some(10));
        assert_eq!(cache.len(), 0);
        assert!(cache.remove(&TestKey(1, "a")).is_none());
        cache.verify().unwrap();
    }

    #[test]
    fn test_same_bucket_different_keys() {
        let mut cache = StatementCache::new(10);
        cache.add(TestKey(3, "a"), 1);
        cache.add(TestKey(3, "b"), 2);

        assert_eq!(cache.remove(&TestKey(3, "b")), Some(2));
        assert_eq!(cache.remove(&TestKey(3, "a")), Some(1));
        cache.verify().unwrap();
    }

    #[test]
    fn test_bucket_overflow_discards_last_slot() {
        // 30 entries -> 40 buckets, so capacity never triggers here
        let mut cache = StatementCache::new(30);
        for i in 0..BUCKET_SIZE {
            assert!(cache.add(TestKey(7, "k"), i).is_none());
        }
        assert_eq!(cache.add(TestKey(7, "k"), 99), Some(BUCKET_SIZE - 1));
        assert_eq!(cache.len(), BUCKET_SIZE);
        assert_eq!(cache.discards(), 1);
        cache.verify().unwrap();
    }

    #[test]
    fn test_lru_rotation_varies_slot() {
        // max 2 -> 3 buckets; everything lands in bucket 0
        let mut cache = StatementCache::new(2);
        cache.add(TestKey(0, "a"), 1);
        cache.add(TestKey(0, "b"), 2);
        let first = cache.add(TestKey(0, "c"), 3).unwrap();
        let second = cache.add(TestKey(0, "d"), 4).unwrap();
        assert_ne!(first, second);
        assert_eq!(cache.len(), 2);
        cache.verify().unwrap();
    }

    #[test]
    fn test_unlink_middle_bucket() {
        let mut cache = StatementCache::new(10);
        cache.add(TestKey(0, "a"), 0);
        cache.add(TestKey(1, "b"), 1);
        cache.add(TestKey(2, "c"), 2);

        assert_eq!(cache.remove(&TestKey(1, "b")), Some(1));
        cache.verify().unwrap();
        assert!(cache.dump().contains("MRU -> LRU: [2, 0]"));
    }

    #[test]
    fn test_dump() {
        let mut cache = StatementCache::new(3);
        cache.add(TestKey(1, "x"), 0);
        let dump = cache.dump();
        assert!(dump.starts_with("StatementCache size=1 max=3 buckets=4 discards=0"));
        assert!(dump.contains("bucket 1: TestKey(1, \"x\")"));
    }
}
