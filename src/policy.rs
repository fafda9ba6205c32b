//! Read-only introspection of a cache's configuration.

#[derive(Clone, Debug)]
/// The policy of a cache: the configuration knobs fixed at construction time.
pub struct Policy {
    capacity: u64,
    num_shards: usize,
    window_fraction: f64,
    protected_fraction: f64,
}

impl Policy {
    pub(crate) fn new(
        capacity: u64,
        num_shards: usize,
        window_fraction: f64,
        protected_fraction: f64,
    ) -> Self {
        Self {
            capacity,
            num_shards,
            window_fraction,
            protected_fraction,
        }
    }

    /// Returns the configured maximum capacity of the cache.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the number of index shards the cache was built with.
    pub fn num_shards(&self) -> usize {
        self.num_shards
    }

    /// Returns the fraction of `capacity` reserved for the admission window.
    pub fn window_fraction(&self) -> f64 {
        self.window_fraction
    }

    /// Returns the fraction of the main space (capacity minus window)
    /// reserved for the protected segment.
    pub fn protected_fraction(&self) -> f64 {
        self.protected_fraction
    }
}
