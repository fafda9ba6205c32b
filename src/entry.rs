//! The cache entry: the single allocation that is simultaneously indexed,
//! linked into a policy list, and linked into a timing-wheel bucket.
//!
//! Grounded on `internal/list.go` (the `Entry` the original Go source links
//! into two list kinds, `LIST` and `WHEEL_LIST`, via independent sibling
//! pointer pairs) and on `ccache::user::EntryT`'s `NonNull`-based intrusive
//! pointers. Unlike the teacher's `unsync::ValueEntry` (which boxes a
//! separate `DeqNode` per list membership), the two link pairs are embedded
//! directly in this struct: one allocation, two list memberships.

use std::cell::Cell;
use std::ptr::NonNull;
use std::sync::Arc;

use triomphe::Arc as TArc;

/// Which policy region (or neither) an entry currently occupies.
///
/// An entry is present in the hash index iff `segment != Detached`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Segment {
    Window,
    Probation,
    Protected,
    /// Not in any policy list, but still linked into the wheel (e.g. has
    /// never been admitted/evicted yet but is mid-insert). Kept distinct
    /// from `Detached` so wheel bookkeeping never has to guess.
    WheelOnly,
    Detached,
}

/// One sibling-pointer pair. Two of these live in every [`Entry`]: one for
/// the policy list it inhabits, one for the wheel bucket it inhabits.
pub(crate) struct Links<K, V> {
    prev: Cell<Option<NonNull<Entry<K, V>>>>,
    next: Cell<Option<NonNull<Entry<K, V>>>>,
}

impl<K, V> Links<K, V> {
    fn new() -> Self {
        Self {
            prev: Cell::new(None),
            next: Cell::new(None),
        }
    }

    pub(crate) fn prev_cell(&self) -> &Cell<Option<NonNull<Entry<K, V>>>> {
        &self.prev
    }

    pub(crate) fn next_cell(&self) -> &Cell<Option<NonNull<Entry<K, V>>>> {
        &self.next
    }
}

/// No expiry: the sentinel value stored in `expire_at_nanos` for entries
/// with "never" TTL.
pub(crate) const NO_EXPIRY: u64 = 0;

/// A wheel bucket address: `(level, slot)`. `NOT_SCHEDULED` marks an entry
/// that is not currently linked into any wheel bucket.
pub(crate) const NOT_SCHEDULED: (u8, u8) = (u8::MAX, u8::MAX);

pub(crate) struct Entry<K, V> {
    /// `None` only for the dummy sentinel allocations that root a [`crate::list::List`]
    /// or a wheel bucket; those are never inserted into a shard's map.
    pub(crate) key: Option<Arc<K>>,
    pub(crate) hash: u64,
    pub(crate) shard_index: usize,

    /// Mutated only while the owning shard's mutex is held.
    value: Cell<Option<TArc<V>>>,
    expire_at_nanos: Cell<u64>,
    pub(crate) cost: u32,

    /// Mutated only by the maintenance loop (never under the shard lock).
    pub(crate) segment: Cell<Segment>,
    pub(crate) policy_links: Links<K, V>,
    pub(crate) wheel_links: Links<K, V>,
    pub(crate) wheel_index: Cell<(u8, u8)>,

    /// Transient frequency read during the most recent admission decision;
    /// not persisted across cycles, purely a scratch slot for §4.D step 2.
    pub(crate) frequency_hint: Cell<u8>,
}

// SAFETY: `Entry` is only ever reached either (a) through the owning
// shard's `Mutex`-guarded map, for the `value`/`expire_at_nanos` fields, or
// (b) through the single maintenance-state mutex, for the segment/link
// fields. Both paths serialize access; the `Cell`s never alias across
// threads without a lock in between.
unsafe impl<K: Send, V: Send> Send for Entry<K, V> {}
unsafe impl<K: Sync, V: Sync> Sync for Entry<K, V> {}

impl<K, V> Entry<K, V> {
    pub(crate) fn new(
        key: Arc<K>,
        value: TArc<V>,
        hash: u64,
        shard_index: usize,
        cost: u32,
        expire_at_nanos: u64,
    ) -> Self {
        Self {
            key: Some(key),
            hash,
            shard_index,
            value: Cell::new(Some(value)),
            expire_at_nanos: Cell::new(expire_at_nanos),
            cost,
            segment: Cell::new(Segment::WheelOnly),
            policy_links: Links::new(),
            wheel_links: Links::new(),
            wheel_index: Cell::new(NOT_SCHEDULED),
            frequency_hint: Cell::new(0),
        }
    }

    /// A dummy allocation that roots a [`crate::list::List`] or wheel bucket.
    /// Never indexed, never carries a real key/value.
    pub(crate) fn new_sentinel() -> Self {
        Self {
            key: None,
            hash: 0,
            shard_index: 0,
            value: Cell::new(None),
            expire_at_nanos: Cell::new(NO_EXPIRY),
            cost: 0,
            segment: Cell::new(Segment::Detached),
            policy_links: Links::new(),
            wheel_links: Links::new(),
            wheel_index: Cell::new(NOT_SCHEDULED),
            frequency_hint: Cell::new(0),
        }
    }

    /// Read the cached value. Caller must hold the owning shard's lock.
    pub(crate) fn value(&self) -> TArc<V> {
        // Cell<Option<TArc<V>>> round-trips through `take`/`set` so we never
        // need `V: Clone`; `TArc::clone` is a refcount bump either way.
        let v = self.value.take();
        let out = v.clone();
        self.value.set(v);
        out.expect("value missing from live entry")
    }

    pub(crate) fn expire_at_nanos(&self) -> u64 {
        self.expire_at_nanos.get()
    }

    pub(crate) fn is_expired(&self, now_nanos: u64) -> bool {
        let at = self.expire_at_nanos.get();
        at != NO_EXPIRY && at <= now_nanos
    }
}

/// Derives the intrusive-list pointer from an owning `Arc`. The `Arc` (held
/// by the shard's map and/or an in-flight buffer event) keeps the
/// allocation alive; the returned pointer is never itself an owner — see
/// `list::List` and `wheel::Wheel`, which only ever store these.
pub(crate) fn entry_ptr<K, V>(e: &Arc<Entry<K, V>>) -> NonNull<Entry<K, V>> {
    NonNull::from(e.as_ref())
}
