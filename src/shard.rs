//! The sharded hash index (spec.md §4.F): `hash(key) & (shards-1)` picks an
//! independent, mutex-guarded map from key to the shared `Arc<Entry<K,V>>`.
//!
//! Grounded on spec.md's own description of the component (no single pack
//! file implements an intrusive-pointer sharded index directly); the lock
//! granularity mirrors `LucaFulchir-ccache`'s single-hashmap design scaled
//! out across `parking_lot::Mutex`-guarded stripes, since the teacher
//! (`micro-moka`) runs single-threaded and has no sharding of its own.
//!
//! Entries are `Arc`-owned rather than `Box`-owned (unlike the policy/wheel
//! lists' non-owning raw pointers) so that a buffered read/write event can
//! outlive the entry's removal from the index without dangling: as long as
//! *some* owner — the shard's map, or an in-flight `ReadEvent`/`WriteEvent`
//! — holds a clone, the allocation stays valid for any stale pointer a
//! buffered event still carries. This mirrors `jamestiotio-moka`'s
//! `ReadOp`/`WriteOp`, which carry `Arc<ValueEntry<K, V>>` for exactly this
//! reason.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use parking_lot::Mutex;
use triomphe::Arc as TArc;

use crate::entry::Entry;

type ShardMap<K, V, S> = HashMap<Arc<K>, Arc<Entry<K, V>>, S>;

pub(crate) struct ShardedIndex<K, V, S> {
    shards: Vec<Mutex<ShardMap<K, V, S>>>,
    mask: usize,
    hasher: S,
}

impl<K, V, S> ShardedIndex<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Clone,
{
    pub(crate) fn new(num_shards: usize, hasher: S) -> Self {
        let num_shards = num_shards.max(1).next_power_of_two();
        let shards = (0..num_shards)
            .map(|_| Mutex::new(HashMap::with_hasher(hasher.clone())))
            .collect();
        Self {
            shards,
            mask: num_shards - 1,
            hasher,
        }
    }

    pub(crate) fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Hashes `key` with the index's configured hasher. Generic over `Q` so
    /// callers can hash a borrowed form of `K` (e.g. `&str` for `K = String`)
    /// without allocating an owned `K` first.
    pub(crate) fn hash_one<Q>(&self, key: &Q) -> u64
    where
        Q: Hash + ?Sized,
    {
        self.hasher.hash_one(key)
    }

    pub(crate) fn shard_index_of(&self, hash: u64) -> usize {
        (hash as usize) & self.mask
    }

    /// Looks up `key`, returning a clone of its value and its entry (for
    /// recording a read-hit) unless it is already past expiry (lazily
    /// checked here in addition to active expiration by the timing wheel).
    pub(crate) fn get<Q>(
        &self,
        key: &Q,
        hash: u64,
        now_nanos: u64,
    ) -> Option<(TArc<V>, Arc<Entry<K, V>>)>
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let shard = &self.shards[self.shard_index_of(hash)];
        let guard = shard.lock();
        let entry = guard.get(key)?;
        if entry.is_expired(now_nanos) {
            return None;
        }
        Some((entry.value(), Arc::clone(entry)))
    }

    pub(crate) fn contains_key<Q>(&self, key: &Q, hash: u64, now_nanos: u64) -> bool
    where
        Arc<K>: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let shard = &self.shards[self.shard_index_of(hash)];
        let guard = shard.lock();
        match guard.get(key) {
            Some(entry) => !entry.is_expired(now_nanos),
            None => false,
        }
    }

    /// Runs `f` with the shard map for `hash` locked. Callers use this to
    /// mutate the index and decide/enqueue the corresponding write event in
    /// one critical section, so that two writes to the same key are
    /// totally ordered in the write buffer exactly as they were applied to
    /// the index (spec.md §5: "operations on a given key are serialised by
    /// the shard mutex").
    pub(crate) fn with_shard<R>(
        &self,
        hash: u64,
        f: impl FnOnce(&mut ShardMap<K, V, S>) -> R,
    ) -> R {
        let shard = &self.shards[self.shard_index_of(hash)];
        let mut guard = shard.lock();
        f(&mut guard)
    }

    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry across every shard. Two-phase: swap each shard's
    /// map out under its lock, then drop the swapped-out maps once no
    /// shard lock is held, so a panicking `K`/`V` drop can't poison a
    /// shard mutex mid-iteration (mirrors micro-moka's `invalidate_all`).
    ///
    /// Callers must first detach every entry from the policy lists and
    /// wheel (see `Housekeeper::invalidate_all`) so that no intrusive
    /// pointer is left dangling once these are the last `Arc` owners.
    pub(crate) fn clear(&self) {
        let mut swapped = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            let mut guard = shard.lock();
            swapped.push(std::mem::replace(
                &mut *guard,
                HashMap::with_hasher(self.hasher.clone()),
            ));
        }
        drop(swapped);
    }

    /// Snapshots every live `(key, value)` pair. Used by `iter()`; callers
    /// get a point-in-time copy rather than a live view, since entries may
    /// be concurrently mutated or evicted.
    pub(crate) fn snapshot(&self) -> Vec<(Arc<K>, TArc<V>)> {
        let mut out = Vec::with_capacity(self.len());
        for shard in &self.shards {
            let guard = shard.lock();
            out.extend(guard.iter().map(|(k, entry)| (Arc::clone(k), entry.value())));
        }
        out
    }
}

// `ShardedIndex` only ever exposes owned clones (`Arc`/`TArc`) or guarded
// access through `parking_lot::Mutex`; there is no outstanding borrow that
// would make cross-thread sharing unsound.
unsafe impl<K: Send + Sync, V: Send + Sync, S: Send> Send for ShardedIndex<K, V, S> {}
unsafe impl<K: Send + Sync, V: Send + Sync, S: Send + Sync> Sync for ShardedIndex<K, V, S> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::RandomState;

    fn make_entry(
        index: &ShardedIndex<String, String, RandomState>,
        key: &str,
    ) -> (Arc<String>, u64, Arc<Entry<String, String>>) {
        let key = Arc::new(key.to_string());
        let hash = index.hash_one(key.as_ref());
        let entry = Arc::new(Entry::new(
            Arc::clone(&key),
            TArc::new(key.as_str().to_string()),
            hash,
            index.shard_index_of(hash),
            1,
            0,
        ));
        (key, hash, entry)
    }

    #[test]
    fn insert_then_get_round_trips() {
        let index: ShardedIndex<String, String, RandomState> =
            ShardedIndex::new(4, RandomState::new());
        let (key, hash, entry) = make_entry(&index, "foo");
        index.with_shard(hash, |map| map.insert(key.clone(), entry));
        assert_eq!(
            index.get(key.as_ref(), hash, 0).map(|(v, _)| (*v).clone()),
            Some("foo".to_string())
        );
    }

    #[test]
    fn remove_drops_entry() {
        let index: ShardedIndex<String, String, RandomState> =
            ShardedIndex::new(4, RandomState::new());
        let (key, hash, entry) = make_entry(&index, "foo");
        index.with_shard(hash, |map| map.insert(key.clone(), entry));
        let removed = index.with_shard(hash, |map| map.remove(key.as_ref()));
        assert!(removed.is_some());
        assert!(index.get(key.as_ref(), hash, 0).is_none());
    }
}
