//! The maintenance loop (spec.md §4.H): the single worker that drains the
//! read/write buffers, applies W-TinyLFU admission/eviction, advances the
//! timing wheel, and frees detached entries.
//!
//! Orchestration is grounded on `seb-posedio-theine-core`'s `core.rs`
//! (`TlfuCore::set_entry` schedules in the wheel, applies the policy, then
//! cleans up the evicted key) generalized to run off buffered events
//! instead of being called inline, and on `jamestiotio-moka`'s
//! `sync::cache` housekeeper thread / "assist inline on saturation" split.

use std::hash::{BuildHasher, Hash};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::admission::{Admission, Evicted};
use crate::buffer::{ReadBuffer, ReadEvent, Saturated, WriteBuffer, WriteEvent};
use crate::clock::Clock;
use crate::entry::{entry_ptr, Entry};
use crate::shard::ShardedIndex;
use crate::wheel::{Fired, Wheel};

/// The fields the maintenance loop owns exclusively: the policy lists, the
/// sketch/doorkeeper, and the timing wheel. Per spec.md §5 these never
/// overlap with the fields a shard's mutex guards, so a single lock here
/// never needs to be taken together with a shard lock.
struct MaintenanceState<K, V> {
    admission: Admission<K, V>,
    wheel: Wheel<K, V>,
}

const WRITE_DRAIN_BATCH: usize = 256;
const READ_DRAIN_BATCH: usize = 256;
const ADVANCE_INTERVAL: Duration = Duration::from_secs(1);

pub(crate) struct Housekeeper<K, V, S> {
    state: Mutex<MaintenanceState<K, V>>,
    read_buffer: Arc<ReadBuffer<K, V>>,
    write_buffer: Arc<WriteBuffer<K, V>>,
    index: Arc<ShardedIndex<K, V, S>>,
    clock: Arc<Clock>,
    last_advance_nanos: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
    stop: Arc<std::sync::atomic::AtomicBool>,
}

impl<K, V, S> Housekeeper<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        capacity: u64,
        window_fraction: f64,
        protected_fraction: f64,
        sample_multiplier: u64,
        use_doorkeeper: bool,
        read_buffer: Arc<ReadBuffer<K, V>>,
        write_buffer: Arc<WriteBuffer<K, V>>,
        index: Arc<ShardedIndex<K, V, S>>,
        clock: Arc<Clock>,
    ) -> Self {
        let admission = Admission::new(
            capacity,
            window_fraction,
            protected_fraction,
            sample_multiplier,
            use_doorkeeper,
        );
        Self {
            state: Mutex::new(MaintenanceState {
                admission,
                wheel: Wheel::new(),
            }),
            read_buffer,
            write_buffer,
            index,
            clock,
            last_advance_nanos: AtomicU64::new(0),
            worker: Mutex::new(None),
            stop: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// Spawns the dedicated maintenance thread. A no-op if already running.
    pub(crate) fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        let this = Arc::clone(self);
        let stop = Arc::clone(&self.stop);
        let handle = std::thread::Builder::new()
            .name("wtlfu-housekeeper".into())
            .spawn(move || {
                log::debug!("wtlfu housekeeper started");
                while !stop.load(Ordering::Relaxed) {
                    this.run_one_cycle();
                    std::thread::sleep(Duration::from_millis(50));
                }
                log::debug!("wtlfu housekeeper stopped");
            })
            .expect("failed to spawn housekeeper thread");
        *worker = Some(handle);
    }

    pub(crate) fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    /// One bounded maintenance cycle (spec.md §4.H steps 1-4).
    pub(crate) fn run_one_cycle(&self) {
        let mut state = self.state.lock();
        let mut to_free: Vec<Arc<Entry<K, V>>> = Vec::new();

        for _ in 0..WRITE_DRAIN_BATCH {
            match self.write_buffer.receiver.try_recv() {
                Ok(event) => self.apply_write_event(&mut state, event, &mut to_free),
                Err(_) => break,
            }
        }

        for _ in 0..READ_DRAIN_BATCH {
            match self.read_buffer.receiver.try_recv() {
                Ok(ReadEvent::Hit { entry, hash }) => {
                    let ptr = entry_ptr(&entry);
                    if let Some(evicted) = state.admission.on_hit(ptr, hash) {
                        self.finalize_eviction(&mut state, evicted, &mut to_free);
                    }
                }
                Err(_) => break,
            }
        }

        let now = self.clock.now_nanos();
        let last = self.last_advance_nanos.load(Ordering::Relaxed);
        if now.saturating_sub(last) >= ADVANCE_INTERVAL.as_nanos() as u64 {
            self.last_advance_nanos.store(now, Ordering::Relaxed);
            for fired in state.wheel.advance(now) {
                if let Fired::Expired(ptr) = fired {
                    state.admission.remove(ptr);
                    if let Some(arc) = self.remove_from_index(ptr) {
                        to_free.push(arc);
                    }
                }
            }
        }

        drop(state);
        drop(to_free);
    }

    /// Drains both buffers and advances the wheel to the present, looping
    /// until nothing remains — the quiescence barrier the cache's
    /// `run_pending_tasks` exposes publicly.
    pub(crate) fn run_pending_tasks(&self) {
        loop {
            self.run_one_cycle();
            if self.read_buffer.len() == 0 && self.write_buffer.len() == 0 {
                let now = self.clock.now_nanos();
                if now.saturating_sub(self.last_advance_nanos.load(Ordering::Relaxed))
                    < ADVANCE_INTERVAL.as_nanos() as u64
                {
                    break;
                }
            }
        }
    }

    /// Runs exactly one cycle to relieve write-buffer backpressure, then
    /// retries the push. Called by producers that observed a saturated
    /// write buffer (spec.md §4.G/§7 `BufferSaturated`).
    pub(crate) fn assist_and_retry(&self, saturated: Saturated<K, V>) {
        self.run_one_cycle();
        let mut event = saturated.0;
        loop {
            match self.write_buffer.push(event) {
                Ok(()) => return,
                Err(Saturated(e)) => {
                    event = e;
                    std::thread::yield_now();
                    self.run_one_cycle();
                }
            }
        }
    }

    /// Detaches every entry from the policy lists and the wheel, then
    /// drops the index's own references. Order matters: the lists/wheel
    /// only ever hold non-owning `NonNull` pointers into entries the index
    /// owns via `Arc`, so they must let go first or they'd be left
    /// pointing at freed memory the instant the index's clear drops the
    /// last owner.
    pub(crate) fn invalidate_all(&self) {
        let mut state = self.state.lock();
        state.admission.clear();
        state.wheel.clear();
        drop(state);
        self.index.clear();
    }

    fn apply_write_event(
        &self,
        state: &mut MaintenanceState<K, V>,
        event: WriteEvent<K, V>,
        to_free: &mut Vec<Arc<Entry<K, V>>>,
    ) {
        match event {
            WriteEvent::Add { entry, hash } => {
                self.schedule_and_admit(state, entry, hash, to_free);
            }
            WriteEvent::Update { entry, hash, old } => {
                let old_ptr = entry_ptr(&old);
                state.wheel.deschedule(old_ptr);
                state.admission.remove(old_ptr);
                to_free.push(old);
                self.schedule_and_admit(state, entry, hash, to_free);
            }
            WriteEvent::Delete { entry } => {
                let ptr = entry_ptr(&entry);
                state.wheel.deschedule(ptr);
                state.admission.remove(ptr);
                to_free.push(entry);
            }
        }
    }

    fn schedule_and_admit(
        &self,
        state: &mut MaintenanceState<K, V>,
        entry: Arc<Entry<K, V>>,
        hash: u64,
        to_free: &mut Vec<Arc<Entry<K, V>>>,
    ) {
        let ptr = entry_ptr(&entry);
        let expire_at = entry.expire_at_nanos();
        state.wheel.schedule(ptr, expire_at);
        if let Some(evicted) = state.admission.admit_new(ptr, hash) {
            self.finalize_eviction(state, evicted, to_free);
        }
        // `entry`'s only other owner is the shard map this event was raised
        // from; dropping this clone here just releases the maintenance
        // loop's temporary reference.
        drop(entry);
    }

    fn finalize_eviction(
        &self,
        state: &mut MaintenanceState<K, V>,
        evicted: Evicted<K, V>,
        to_free: &mut Vec<Arc<Entry<K, V>>>,
    ) {
        state.wheel.deschedule(evicted.0);
        if let Some(arc) = self.remove_from_index(evicted.0) {
            to_free.push(arc);
        }
    }

    fn remove_from_index(&self, ptr: NonNull<Entry<K, V>>) -> Option<Arc<Entry<K, V>>> {
        let (key, hash) = unsafe {
            (
                ptr.as_ref().key.clone().expect("live entry has a key"),
                ptr.as_ref().hash,
            )
        };
        self.index
            .with_shard(hash, |map| map.remove(key.as_ref()))
    }
}

impl<K, V, S> Drop for Housekeeper<K, V, S>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}
