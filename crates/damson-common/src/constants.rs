//! System-wide constants for damson.
//!
//! This module defines constants used across the storage layers.

// =============================================================================
// Page Size Constants
// =============================================================================

/// Default base-2 logarithm of the page size (4 KB pages).
///
/// 4 KB matches the typical SSD block size and OS page size, so block I/O
/// at page granularity maps directly onto device operations.
pub const DEFAULT_PAGE_SHIFT: usize = 12;

/// Minimum supported page shift (512-byte pages).
pub const MIN_PAGE_SHIFT: usize = 9;

/// Maximum supported page shift (1 MB pages).
pub const MAX_PAGE_SHIFT: usize = 20;

/// Default page size in bytes, derived from [`DEFAULT_PAGE_SHIFT`].
pub const DEFAULT_PAGE_SIZE: usize = 1 << DEFAULT_PAGE_SHIFT;

// =============================================================================
// Page Pool Constants
// =============================================================================

/// Default page pool capacity, in frames.
///
/// Bounds the pool's peak memory usage at
/// `DEFAULT_POOL_CAPACITY * page_size` plus a small per-frame bookkeeping
/// overhead.
pub const DEFAULT_POOL_CAPACITY: usize = 256;

// =============================================================================
// Store File Constants
// =============================================================================

/// Suffix appended to a store's data-file path to derive its log-file path.
pub const LOG_FILE_SUFFIX: &str = ".log";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(DEFAULT_PAGE_SIZE.is_power_of_two());
        assert_eq!(DEFAULT_PAGE_SIZE, 4096);
    }

    #[test]
    fn test_shift_range() {
        assert!(MIN_PAGE_SHIFT <= DEFAULT_PAGE_SHIFT);
        assert!(DEFAULT_PAGE_SHIFT <= MAX_PAGE_SHIFT);
    }

    #[test]
    fn test_pool_capacity() {
        assert!(DEFAULT_POOL_CAPACITY > 0);
    }
}
