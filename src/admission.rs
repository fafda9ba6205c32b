//! The W-TinyLFU policy list triad: Window / Probation / Protected (spec.md §4.D).
//!
//! The segment sizing and promotion rules follow `micro-moka`'s region split
//! (`CacheRegion::{Window, MainProbation, MainProtected}` in its
//! `unsync::deques`), generalized from move-to-back-on-hit bookkeeping over
//! tagged deque nodes to moves over the intrusive [`List`] threaded through
//! `policy_links`. Admission's frequency tie-break is grounded on
//! `seb-posedio-theine-core`'s `tlfu.rs` (`TinyLfu::admit`), without its
//! hill-climbing window auto-resize — SPEC_FULL.md does not call for
//! adaptive resizing, so the window/protected fractions are fixed at
//! construction (see DESIGN.md).

use std::ptr::NonNull;

use rand::Rng;

use crate::common::doorkeeper::Doorkeeper;
use crate::common::frequency_sketch::FrequencySketch;
use crate::entry::{Entry, Segment};
use crate::list::{List, PolicyRole};

/// An entry evicted as the admission/promotion loser. The caller (the
/// maintenance loop) is responsible for unlinking it from the wheel,
/// removing it from its shard, and freeing it.
pub(crate) struct Evicted<K, V>(pub(crate) NonNull<Entry<K, V>>);

pub(crate) struct Admission<K, V> {
    window: List<K, V, PolicyRole>,
    probation: List<K, V, PolicyRole>,
    protected: List<K, V, PolicyRole>,
    sketch: FrequencySketch,
    doorkeeper: Option<Doorkeeper>,
    sample_size: usize,
    observations: usize,
}

fn region_capacities(capacity: u64, window_fraction: f64, protected_fraction: f64) -> (usize, usize, usize) {
    let capacity = capacity.max(1);
    let window = ((capacity as f64 * window_fraction).round() as u64).max(1);
    let main = capacity.saturating_sub(window).max(1);
    let protected = ((main as f64 * protected_fraction).round() as u64).max(0);
    let probation = main.saturating_sub(protected).max(1);
    (window as usize, probation as usize, protected as usize)
}

impl<K, V> Admission<K, V> {
    pub(crate) fn new(
        capacity: u64,
        window_fraction: f64,
        protected_fraction: f64,
        sample_multiplier: u64,
        use_doorkeeper: bool,
    ) -> Self {
        let (window_cap, probation_cap, protected_cap) =
            region_capacities(capacity, window_fraction, protected_fraction);
        let sample_size = (capacity as usize).saturating_mul(sample_multiplier as usize).max(10);
        Self {
            window: List::new(window_cap, Box::new(Entry::new_sentinel())),
            probation: List::new(probation_cap, Box::new(Entry::new_sentinel())),
            protected: List::new(protected_cap, Box::new(Entry::new_sentinel())),
            sketch: FrequencySketch::with_capacity(capacity as usize, sample_multiplier as usize),
            doorkeeper: if use_doorkeeper {
                Some(Doorkeeper::with_capacity(sample_size))
            } else {
                None
            },
            sample_size,
            observations: 0,
        }
    }

    pub(crate) fn window_capacity(&self) -> usize {
        self.window.capacity()
    }

    /// Records an access (read hit or fresh write) against the frequency
    /// sketch, gated by the doorkeeper per spec.md §4.C.
    fn observe(&mut self, hash: u64) {
        let should_increment = match &mut self.doorkeeper {
            Some(dk) => dk.mark(hash),
            None => true,
        };
        if should_increment {
            self.sketch.increment(hash);
        }
        self.observations += 1;
        if self.observations >= self.sample_size {
            self.observations = 0;
            if let Some(dk) = &mut self.doorkeeper {
                dk.reset();
            }
        }
    }

    fn frequency(&self, hash: u64) -> u8 {
        self.sketch.frequency(hash)
    }

    /// Reads `e`'s estimated frequency from the sketch and caches it in the
    /// entry's transient `frequency_hint` scratch slot (spec.md §3) for the
    /// duration of the admission decision that's using it.
    fn frequency_hint_of(&self, e: NonNull<Entry<K, V>>) -> u8 {
        let hash = unsafe { e.as_ref().hash };
        let freq = self.frequency(hash);
        unsafe {
            e.as_ref().frequency_hint.set(freq);
        }
        freq
    }

    /// Admits a freshly written entry into Window (§4.D), or directly into
    /// Probation if its cost alone exceeds the Window's capacity. Returns
    /// any entry evicted to restore the Window's bound.
    pub(crate) fn admit_new(&mut self, e: NonNull<Entry<K, V>>, hash: u64) -> Option<Evicted<K, V>> {
        self.observe(hash);
        let cost = unsafe { e.as_ref().cost.max(1) as usize };
        if cost > self.window.capacity() {
            unsafe {
                e.as_ref().segment.set(Segment::Probation);
            }
            self.probation.push_front(e);
            return self.evict_probation_overflow();
        }
        unsafe {
            e.as_ref().segment.set(Segment::Window);
        }
        self.window.push_front(e);
        self.evict_window_overflow()
    }

    /// A hit against an entry already resident in some policy list. Moves
    /// it to MRU within Window/Protected, or promotes it out of Probation.
    pub(crate) fn on_hit(&mut self, e: NonNull<Entry<K, V>>, hash: u64) -> Option<Evicted<K, V>> {
        self.observe(hash);
        match unsafe { e.as_ref().segment.get() } {
            Segment::Window => {
                self.window.move_to_front(e);
                None
            }
            Segment::Protected => {
                self.protected.move_to_front(e);
                None
            }
            Segment::Probation => {
                self.probation.unlink(e);
                unsafe {
                    e.as_ref().segment.set(Segment::Protected);
                }
                self.protected.push_front(e);
                self.evict_protected_overflow()
            }
            Segment::WheelOnly | Segment::Detached => None,
        }
    }

    /// Unlinks `e` from whichever policy list it currently occupies.
    /// Used on explicit delete and on eviction completion.
    pub(crate) fn remove(&mut self, e: NonNull<Entry<K, V>>) {
        match unsafe { e.as_ref().segment.get() } {
            Segment::Window => self.window.unlink(e),
            Segment::Probation => self.probation.unlink(e),
            Segment::Protected => self.protected.unlink(e),
            Segment::WheelOnly | Segment::Detached => {}
        }
        unsafe {
            e.as_ref().segment.set(Segment::Detached);
        }
    }

    /// Detaches every entry from Window/Probation/Protected, marking each
    /// `Detached`. Used by `invalidate_all`; callers must also clear the
    /// wheel before dropping the index's last `Arc` on each entry, since a
    /// segment left stale would make the next admission decision look at a
    /// list the entry no longer belongs to.
    pub(crate) fn clear(&mut self) {
        while let Some(e) = self.window.pop_back() {
            unsafe {
                e.as_ref().segment.set(Segment::Detached);
            }
        }
        while let Some(e) = self.probation.pop_back() {
            unsafe {
                e.as_ref().segment.set(Segment::Detached);
            }
        }
        while let Some(e) = self.protected.pop_back() {
            unsafe {
                e.as_ref().segment.set(Segment::Detached);
            }
        }
    }

    fn evict_window_overflow(&mut self) -> Option<Evicted<K, V>> {
        if !self.window.is_over_capacity() {
            return None;
        }
        let victim = self.window.pop_back()?;
        if !self.probation.is_over_capacity() {
            unsafe {
                victim.as_ref().segment.set(Segment::Probation);
            }
            self.probation.push_front(victim);
            return self.evict_probation_overflow();
        }

        let opponent = self.probation.back();
        match opponent {
            None => {
                unsafe {
                    victim.as_ref().segment.set(Segment::Probation);
                }
                self.probation.push_front(victim);
                None
            }
            Some(opponent) => {
                let victim_freq = self.frequency_hint_of(victim);
                let opponent_freq = self.frequency_hint_of(opponent);
                let evict_victim = match victim_freq.cmp(&opponent_freq) {
                    std::cmp::Ordering::Greater => false,
                    std::cmp::Ordering::Less => true,
                    std::cmp::Ordering::Equal => rand::thread_rng().gen_bool(0.5),
                };
                if evict_victim {
                    unsafe {
                        victim.as_ref().segment.set(Segment::Detached);
                    }
                    Some(Evicted(victim))
                } else {
                    self.probation.unlink(opponent);
                    unsafe {
                        opponent.as_ref().segment.set(Segment::Detached);
                    }
                    unsafe {
                        victim.as_ref().segment.set(Segment::Probation);
                    }
                    self.probation.push_front(victim);
                    Some(Evicted(opponent))
                }
            }
        }
    }

    fn evict_probation_overflow(&mut self) -> Option<Evicted<K, V>> {
        if !self.probation.is_over_capacity() {
            return None;
        }
        let victim = self.probation.pop_back()?;
        unsafe {
            victim.as_ref().segment.set(Segment::Detached);
        }
        Some(Evicted(victim))
    }

    fn evict_protected_overflow(&mut self) -> Option<Evicted<K, V>> {
        if !self.protected.is_over_capacity() {
            return None;
        }
        let demoted = self.protected.pop_back()?;
        unsafe {
            demoted.as_ref().segment.set(Segment::Probation);
        }
        self.probation.push_front(demoted);
        self.evict_probation_overflow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use triomphe::Arc as TArc;

    fn owned_entry(hash: u64, cost: u32) -> StdArc<Entry<u64, u64>> {
        StdArc::new(Entry::new(StdArc::new(hash), TArc::new(hash), hash, 0, cost, 0))
    }

    #[test]
    fn region_capacities_reserve_at_least_one_each() {
        let (window, probation, protected) = region_capacities(10, 0.01, 0.8);
        assert_eq!(window, 1);
        assert_eq!(window + probation + protected, 10);
    }

    #[test]
    fn fresh_entry_enters_window() {
        let mut admission: Admission<u64, u64> = Admission::new(10, 0.5, 0.8, 10, false);
        let owned = owned_entry(1, 1);
        let e = crate::entry::entry_ptr(&owned);
        assert!(admission.admit_new(e, 1).is_none());
        assert_eq!(unsafe { e.as_ref().segment.get() }, Segment::Window);
    }

    #[test]
    fn window_overflow_moves_into_probation_when_below_capacity() {
        let mut admission: Admission<u64, u64> = Admission::new(100, 0.01, 0.8, 10, false);
        let owned_a = owned_entry(1, 1);
        let owned_b = owned_entry(2, 1);
        let a = crate::entry::entry_ptr(&owned_a);
        let b = crate::entry::entry_ptr(&owned_b);
        assert!(admission.admit_new(a, 1).is_none());
        assert!(admission.admit_new(b, 2).is_none());
        assert_eq!(unsafe { a.as_ref().segment.get() }, Segment::Probation);
        assert_eq!(unsafe { b.as_ref().segment.get() }, Segment::Window);
    }

    #[test]
    fn hit_in_probation_promotes_to_protected() {
        let mut admission: Admission<u64, u64> = Admission::new(100, 0.01, 0.8, 10, false);
        let owned = owned_entry(1, 1);
        let a = crate::entry::entry_ptr(&owned);
        unsafe {
            a.as_ref().segment.set(Segment::Probation);
        }
        admission.probation.push_front(a);
        assert!(admission.on_hit(a, 1).is_none());
        assert_eq!(unsafe { a.as_ref().segment.get() }, Segment::Protected);
    }

    #[test]
    fn oversized_cost_skips_window() {
        let mut admission: Admission<u64, u64> = Admission::new(10, 0.1, 0.8, 10, false);
        let owned = owned_entry(9, 50);
        let oversized = crate::entry::entry_ptr(&owned);
        admission.admit_new(oversized, 9);
        assert_eq!(
            unsafe { oversized.as_ref().segment.get() },
            Segment::Probation
        );
    }
}
