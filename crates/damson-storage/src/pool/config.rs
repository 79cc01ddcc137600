//! Page pool configuration.

use damson_common::constants::{
    DEFAULT_PAGE_SHIFT, DEFAULT_POOL_CAPACITY, MAX_PAGE_SHIFT, MIN_PAGE_SHIFT,
};

/// Configuration for the page pool.
#[derive(Debug, Clone)]
pub struct PagePoolConfig {
    /// Base-2 logarithm of the page size.
    pub page_shift: usize,
    /// Maximum number of frames the pool may allocate.
    pub capacity: usize,
}

impl PagePoolConfig {
    /// Creates a new configuration.
    pub fn new(page_shift: usize, capacity: usize) -> Self {
        Self {
            page_shift,
            capacity,
        }
    }

    /// Creates a configuration sized to a memory budget in bytes.
    pub fn from_memory_size(memory_bytes: usize) -> Self {
        let page_size = 1usize << DEFAULT_PAGE_SHIFT;
        let capacity = (memory_bytes / page_size).max(1);
        Self::new(DEFAULT_PAGE_SHIFT, capacity)
    }

    /// Returns the page size implied by `page_shift`.
    pub fn page_size(&self) -> usize {
        1 << self.page_shift
    }

    /// Returns the pool's peak page memory usage.
    pub fn memory_usage(&self) -> usize {
        self.capacity * self.page_size()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.page_shift < MIN_PAGE_SHIFT || self.page_shift > MAX_PAGE_SHIFT {
            return Err("page_shift out of supported range");
        }
        if !self.page_size().is_power_of_two() {
            return Err("page_size must be a power of 2");
        }
        if self.capacity == 0 {
            return Err("capacity must be > 0");
        }
        Ok(())
    }
}

impl Default for PagePoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SHIFT, DEFAULT_POOL_CAPACITY)
    }
}
