//! A monotonic nanosecond clock shared by entry expiry and the timing wheel.
//!
//! Wraps `quanta::Clock` the way `seb-posedio-theine-core`'s own `Clock`
//! wraps `std::time::Instant`: a single reference instant taken at
//! construction, with every later reading expressed as nanoseconds elapsed
//! since then. `quanta` is used instead of `std::time::Instant` because the
//! housekeeper thread samples it on every maintenance cycle and benefits
//! from `quanta`'s cheaper, coarser-grained reads.

pub(crate) struct Clock {
    inner: quanta::Clock,
    start: quanta::Instant,
}

impl Clock {
    pub(crate) fn new() -> Self {
        let inner = quanta::Clock::new();
        let start = inner.now();
        Self { inner, start }
    }

    pub(crate) fn now_nanos(&self) -> u64 {
        self.inner.now().duration_since(self.start).as_nanos() as u64
    }

    /// Computes an absolute expiry for a TTL of `ttl_nanos` from now. Per
    /// spec.md §6 callers are expected to pass a positive duration; a zero
    /// TTL expires on the very next wheel advance rather than silently
    /// living forever.
    pub(crate) fn expire_at_nanos(&self, ttl_nanos: u64) -> u64 {
        self.now_nanos().saturating_add(ttl_nanos).max(1)
    }
}
