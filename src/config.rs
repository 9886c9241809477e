//! Construction parameters for [`ConcurrentMap`](crate::ConcurrentMap).

use crate::error::{Error, Result};

/// Capacity used when none is given (matches the classic `HashMap` default).
pub const DEFAULT_CAPACITY: usize = 16;

/// Load factor used when none is given.
pub const DEFAULT_LOAD_FACTOR: f32 = 0.75;

/// Largest table the map will grow to. Past this point inserts keep chaining.
pub const MAX_CAPACITY: usize = 1 << 30;

/// Sizing parameters for a map.
///
/// ```
/// use stripemap_rs::{ConcurrentMap, MapConfig};
///
/// let config = MapConfig::new().initial_capacity(64).load_factor(0.5);
/// let map: ConcurrentMap<u32, u32> = ConcurrentMap::with_config(config).unwrap();
/// assert_eq!(map.capacity(), 64);
/// assert_eq!(map.threshold(), 32);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MapConfig {
    pub initial_capacity: usize,
    pub load_factor: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_CAPACITY,
            load_factor: DEFAULT_LOAD_FACTOR,
        }
    }
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buckets to start with; rounded up to a power of two.
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Ratio of entries to buckets above which the table doubles.
    pub fn load_factor(mut self, load_factor: f32) -> Self {
        self.load_factor = load_factor;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_capacity == 0 {
            return Err(Error::InvalidCapacity(self.initial_capacity));
        }
        if !self.load_factor.is_finite() || self.load_factor <= 0.0 {
            return Err(Error::InvalidLoadFactor(self.load_factor));
        }
        Ok(())
    }

    /// Bucket count of the first table. Always a power of two.
    pub(crate) fn table_capacity(&self) -> usize {
        self.initial_capacity
            .min(MAX_CAPACITY)
            .next_power_of_two()
    }
}

/// Entry count above which a table of `capacity` buckets is grown.
pub(crate) fn threshold(capacity: usize, load_factor: f32) -> usize {
    (capacity as f64 * load_factor as f64) as usize
}
