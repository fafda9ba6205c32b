//! The thread-safe cache handle (spec.md §6): a cheap-to-clone front end
//! over a sharded index, a dedicated maintenance thread, and the two event
//! buffers that connect them.
//!
//! Grounded on `jamestiotio-moka`'s `sync::Cache` — `Arc<Inner>` body,
//! `get`/`insert` hashing the key once and threading the hash through to
//! avoid hashing twice, `Arc<V>` as the value handle returned to callers so
//! `get` never needs `V: Clone` — generalized with the cost/weight and TTL
//! parameters spec.md's `Set`/`SetWithTTL` require and wired to our own
//! wheel/admission machinery instead of `cht`'s lock-free table.

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::Duration;

use triomphe::Arc as TArc;

use crate::buffer::{ReadBuffer, WriteBuffer, WriteEvent};
use crate::clock::Clock;
use crate::entry::{Entry, NO_EXPIRY};
use crate::housekeeper::Housekeeper;
use crate::policy::Policy;
use crate::shard::ShardedIndex;

use super::builder::CacheBuilder;
use super::iter::Iter;

struct Inner<K, V, S> {
    index: Arc<ShardedIndex<K, V, S>>,
    read_buffer: Arc<ReadBuffer<K, V>>,
    write_buffer: Arc<WriteBuffer<K, V>>,
    clock: Arc<Clock>,
    housekeeper: Arc<Housekeeper<K, V, S>>,
    policy: Policy,
}

/// A thread-safe, bounded, TTL-expiring cache implementing W-TinyLFU
/// admission over a hierarchical timing wheel.
///
/// Cloning a `Cache` is cheap: every clone shares the same shards,
/// buffers, and maintenance thread through an internal `Arc`.
pub struct Cache<K, V, S = RandomState> {
    inner: Arc<Inner<K, V, S>>,
}

impl<K, V, S> Clone for Cache<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, S> fmt::Debug for Cache<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("entry_count", &self.inner.index.len())
            .field("capacity", &self.inner.policy.capacity())
            .finish()
    }
}

// `Cache` only ever exposes its state through `Arc`-shared, internally
// synchronized fields (a `parking_lot`-guarded maintenance state, mutex
// striped shards, and `crossbeam-channel` senders); no field is ever
// borrowed across threads without going through one of those.
unsafe impl<K, V, S> Send for Cache<K, V, S>
where
    K: Send + Sync,
    V: Send + Sync,
    S: Send,
{
}

unsafe impl<K, V, S> Sync for Cache<K, V, S>
where
    K: Send + Sync,
    V: Send + Sync,
    S: Sync,
{
}

impl<K, V> Cache<K, V, RandomState>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Builds a cache bounded to `capacity` units of cost, using the
    /// default configuration (see [`CacheBuilder`] for every knob).
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`. Use [`Cache::builder`] for fallible
    /// construction.
    pub fn new(capacity: u64) -> Self {
        CacheBuilder::new(capacity)
            .build()
            .expect("invalid cache configuration")
    }

    /// Starts building a cache with non-default configuration.
    pub fn builder(capacity: u64) -> CacheBuilder<K, V, Cache<K, V, RandomState>> {
        CacheBuilder::new(capacity)
    }
}

impl<K, V, S> Cache<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub(crate) fn with_everything(
        capacity: u64,
        num_shards: usize,
        window_fraction: f64,
        protected_fraction: f64,
        sample_multiplier: u64,
        use_doorkeeper: bool,
        read_buffer_size: usize,
        write_buffer_size: usize,
        hasher: S,
    ) -> Self {
        let index = Arc::new(ShardedIndex::new(num_shards, hasher));
        let read_buffer = Arc::new(ReadBuffer::new(read_buffer_size));
        let write_buffer = Arc::new(WriteBuffer::new(write_buffer_size));
        let clock = Arc::new(Clock::new());
        let housekeeper = Arc::new(Housekeeper::new(
            capacity,
            window_fraction,
            protected_fraction,
            sample_multiplier,
            use_doorkeeper,
            Arc::clone(&read_buffer),
            Arc::clone(&write_buffer),
            Arc::clone(&index),
            Arc::clone(&clock),
        ));
        housekeeper.start();
        let policy = Policy::new(
            capacity,
            index.num_shards(),
            window_fraction,
            protected_fraction,
        );
        Self {
            inner: Arc::new(Inner {
                index,
                read_buffer,
                write_buffer,
                clock,
                housekeeper,
                policy,
            }),
        }
    }

    /// Looks up `key`. Records a hit event on success; the event is
    /// applied to the frequency sketch and policy lists asynchronously, so
    /// the returned value is available immediately regardless of how
    /// backed up the maintenance loop is (spec.md §5).
    pub fn get(&self, key: &K) -> Option<TArc<V>> {
        let hash = self.inner.index.hash_one(key);
        let now = self.inner.clock.now_nanos();
        let (value, entry) = self.inner.index.get(key, hash, now)?;
        self.inner.read_buffer.record_hit(entry, hash);
        Some(value)
    }

    /// Like `get`, but does not record a hit (no effect on admission or
    /// recency).
    pub fn contains_key(&self, key: &K) -> bool {
        let hash = self.inner.index.hash_one(key);
        let now = self.inner.clock.now_nanos();
        self.inner.index.contains_key(key, hash, now)
    }

    /// Inserts `key => value` with cost 1 and no expiry.
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_weight_and_ttl(key, value, 1, None);
    }

    /// Inserts `key => value` with cost 1, expiring after `ttl`.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.insert_with_weight_and_ttl(key, value, 1, Some(ttl));
    }

    /// Inserts `key => value` with an explicit cost and no expiry.
    pub fn insert_with_weight(&self, key: K, value: V, weight: u32) {
        self.insert_with_weight_and_ttl(key, value, weight, None);
    }

    /// Inserts `key => value` with an explicit cost and expiry.
    ///
    /// Per spec.md §7 (`CostTooLarge`), an entry whose cost exceeds the
    /// cache's total capacity is silently dropped: it never enters the
    /// index and does not perturb `entry_count`.
    pub fn insert_with_weight_and_ttl(&self, key: K, value: V, weight: u32, ttl: Option<Duration>) {
        if (weight as u64).max(1) > self.inner.policy.capacity() {
            log::warn!(
                "rejecting insert: cost {weight} exceeds cache capacity {}",
                self.inner.policy.capacity()
            );
            return;
        }

        let key = Arc::new(key);
        let hash = self.inner.index.hash_one(key.as_ref());
        let expire_at = match ttl {
            Some(d) => self.inner.clock.expire_at_nanos(d.as_nanos().min(u128::from(u64::MAX)) as u64),
            None => NO_EXPIRY,
        };
        let shard_index = self.inner.index.shard_index_of(hash);
        let new_entry = Arc::new(Entry::new(
            Arc::clone(&key),
            TArc::new(value),
            hash,
            shard_index,
            weight.max(1),
            expire_at,
        ));

        let event = self.inner.index.with_shard(hash, |map| {
            match map.insert(key, Arc::clone(&new_entry)) {
                Some(old) => WriteEvent::Update {
                    entry: Arc::clone(&new_entry),
                    hash,
                    old,
                },
                None => WriteEvent::Add {
                    entry: Arc::clone(&new_entry),
                    hash,
                },
            }
        });
        self.enqueue_write(event);
    }

    /// Removes `key`, returning its value if present. Idempotent: removing
    /// an absent key is a no-op that returns `None`.
    pub fn remove(&self, key: &K) -> Option<TArc<V>> {
        let hash = self.inner.index.hash_one(key);
        let removed = self.inner.index.with_shard(hash, |map| map.remove(key));
        removed.map(|entry| {
            let value = entry.value();
            self.enqueue_write(WriteEvent::Delete { entry });
            value
        })
    }

    /// Removes `key` without returning its prior value.
    pub fn invalidate(&self, key: &K) {
        self.remove(key);
    }

    /// Removes every entry. Safe to call concurrently with other
    /// operations: in-flight gets/inserts against keys that survive are
    /// unaffected, and any racing insert simply repopulates the index
    /// after the clear observes it.
    pub fn invalidate_all(&self) {
        self.inner.housekeeper.invalidate_all();
    }

    /// Current number of live entries. May lag actual occupancy by the
    /// depth of the write buffer (spec.md §6 `Len`).
    pub fn entry_count(&self) -> u64 {
        self.inner.index.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.inner.index.is_empty()
    }

    /// The configuration this cache was built with.
    pub fn policy(&self) -> &Policy {
        &self.inner.policy
    }

    /// Drains both event buffers and advances the timing wheel to the
    /// present, blocking until the maintenance loop is fully caught up.
    /// The quiescence barrier spec.md §8 assumes before its invariants.
    pub fn run_pending_tasks(&self) {
        self.inner.housekeeper.run_pending_tasks();
    }

    /// A best-effort, weakly-consistent snapshot of every live entry.
    /// Iterating does not update recency or frequency, and the snapshot
    /// may include entries concurrently invalidated after it was taken.
    pub fn iter(&self) -> Iter<K, V> {
        Iter::new(self.inner.index.snapshot())
    }

    fn enqueue_write(&self, event: WriteEvent<K, V>) {
        if let Err(saturated) = self.inner.write_buffer.push(event) {
            self.inner.housekeeper.assist_and_retry(saturated);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let cache: Cache<String, String> = Cache::new(100);
        cache.insert("foo".to_string(), "bar".to_string());
        cache.run_pending_tasks();
        assert_eq!(cache.get(&"foo".to_string()).map(|v| (*v).clone()), Some("bar".to_string()));
    }

    #[test]
    fn remove_then_get_returns_none() {
        let cache: Cache<String, String> = Cache::new(100);
        cache.insert("foo".to_string(), "bar".to_string());
        cache.run_pending_tasks();
        assert!(cache.remove(&"foo".to_string()).is_some());
        assert!(cache.get(&"foo".to_string()).is_none());
    }

    #[test]
    fn oversized_cost_is_rejected() {
        let cache: Cache<String, String> = Cache::new(10);
        cache.insert_with_weight("foo".to_string(), "bar".to_string(), 100);
        cache.run_pending_tasks();
        assert!(cache.get(&"foo".to_string()).is_none());
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn invalidate_all_empties_the_cache() {
        let cache: Cache<String, String> = Cache::new(100);
        for i in 0..10 {
            cache.insert(format!("key:{i}"), i.to_string());
        }
        cache.run_pending_tasks();
        assert_eq!(cache.entry_count(), 10);
        cache.invalidate_all();
        cache.run_pending_tasks();
        assert_eq!(cache.entry_count(), 0);
        assert!(cache.get(&"key:0".to_string()).is_none());
    }
}
