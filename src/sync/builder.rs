use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

use super::Cache;
use crate::error::CacheError;

const DEFAULT_WINDOW_FRACTION: f64 = 0.01;
const DEFAULT_PROTECTED_FRACTION: f64 = 0.8;
const DEFAULT_SAMPLE_MULTIPLIER: u64 = 10;

/// Builds a [`Cache`] with the configuration knobs of spec.md §6.
///
/// Mirrors `micro_moka::unsync::builder::CacheBuilder`, generalized with
/// the sharding and buffer-sizing knobs the thread-safe cache needs, and
/// returning `Result` from `build()` instead of panicking on bad config.
#[must_use]
pub struct CacheBuilder<K, V, C> {
    capacity: u64,
    num_shards: Option<usize>,
    window_fraction: f64,
    protected_fraction: f64,
    sample_multiplier: u64,
    read_buffer_size: Option<usize>,
    write_buffer_size: Option<usize>,
    use_doorkeeper: bool,
    _marker: PhantomData<(K, V, C)>,
}

impl<K, V> CacheBuilder<K, V, Cache<K, V, RandomState>>
where
    K: Eq + Hash,
{
    /// Starts building a cache bounded to `capacity` units of cost.
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            num_shards: None,
            window_fraction: DEFAULT_WINDOW_FRACTION,
            protected_fraction: DEFAULT_PROTECTED_FRACTION,
            sample_multiplier: DEFAULT_SAMPLE_MULTIPLIER,
            read_buffer_size: None,
            write_buffer_size: None,
            use_doorkeeper: true,
            _marker: PhantomData,
        }
    }

    /// Builds a `Cache<K, V>` using the default `RandomState` hasher.
    pub fn build(self) -> Result<Cache<K, V, RandomState>, CacheError> {
        self.build_with_hasher(RandomState::default())
    }

    /// Builds a `Cache<K, V, S>` with the given hasher.
    pub fn build_with_hasher<S>(self, hasher: S) -> Result<Cache<K, V, S>, CacheError>
    where
        S: BuildHasher + Clone,
    {
        if self.capacity < 1 {
            return Err(CacheError::ConfigInvalid(self.capacity));
        }
        if !(0.0..1.0).contains(&self.window_fraction)
            || !(0.0..1.0).contains(&self.protected_fraction)
        {
            return Err(CacheError::FractionInvalid(
                self.window_fraction,
                self.protected_fraction,
            ));
        }
        let num_shards = self
            .num_shards
            .unwrap_or_else(crate::common::default_shard_count);
        let read_buffer_size = self
            .read_buffer_size
            .unwrap_or_else(|| (num_shards * 64).max(256));
        let write_buffer_size = self
            .write_buffer_size
            .unwrap_or_else(|| (self.capacity as usize / 10).clamp(128, 65_536));
        Ok(Cache::with_everything(
            self.capacity,
            num_shards,
            self.window_fraction,
            self.protected_fraction,
            self.sample_multiplier,
            self.use_doorkeeper,
            read_buffer_size,
            write_buffer_size,
            hasher,
        ))
    }
}

impl<K, V, C> CacheBuilder<K, V, C> {
    /// Overrides the number of index shards (default: `roundup(4 * num_cpus)`).
    pub fn shards(mut self, num_shards: usize) -> Self {
        self.num_shards = Some(num_shards);
        self
    }

    /// Overrides the fraction of `capacity` reserved for the admission
    /// window (default 0.01).
    pub fn window_fraction(mut self, fraction: f64) -> Self {
        self.window_fraction = fraction;
        self
    }

    /// Overrides the fraction of the main space reserved for Protected
    /// (default 0.8).
    pub fn protected_fraction(mut self, fraction: f64) -> Self {
        self.protected_fraction = fraction;
        self
    }

    /// Overrides the count-min sketch's aging sample multiplier (default 10).
    pub fn sample_multiplier(mut self, multiplier: u64) -> Self {
        self.sample_multiplier = multiplier;
        self
    }

    /// Overrides the read (hit-event) ring buffer's capacity.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = Some(size);
        self
    }

    /// Overrides the write (add/update/delete-event) ring buffer's capacity.
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = Some(size);
        self
    }

    /// Disables the Bloom-filter doorkeeper in front of the frequency
    /// sketch (spec.md §4.C). Enabled by default.
    pub fn without_doorkeeper(mut self) -> Self {
        self.use_doorkeeper = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::CacheBuilder;

    #[test]
    fn rejects_zero_capacity() {
        let result = CacheBuilder::<String, String, _>::new(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn builds_with_defaults() {
        let cache = CacheBuilder::<String, String, _>::new(100).build();
        assert!(cache.is_ok());
    }
}
