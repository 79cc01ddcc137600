//! Core identifier types for damson.
//!
//! These types provide type-safe wrappers around numeric identifiers,
//! preventing accidental misuse of different ID types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Page identifier - uniquely identifies a page within one store.
///
/// A store's data file is a contiguous sequence of fixed-size pages; page
/// `n` occupies the byte range `[n * page_size, (n + 1) * page_size)`.
///
/// Page 0 always holds the store header, so it can never come out of a
/// dynamic page allocation. This makes 0 a legitimate "no such page"
/// sentinel, which the free-page list uses to terminate its chain.
///
/// # Example
///
/// ```rust
/// use damson_common::types::PageId;
///
/// let page = PageId::new(42);
/// assert_eq!(page.as_u64(), 42);
/// assert!(PageId::HEADER.is_header());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PageId(u64);

impl PageId {
    /// The store header page.
    ///
    /// Doubles as the "no such page" sentinel in free-page chains, because
    /// the header page is never dynamically allocated.
    pub const HEADER: Self = Self(0);

    /// Creates a new `PageId` from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next page ID.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// True if this is the reserved header page (also the "no such page"
    /// sentinel).
    #[inline]
    #[must_use]
    pub const fn is_header(self) -> bool {
        self.0 == Self::HEADER.0
    }

    /// Creates a PageId from bytes (little-endian).
    #[inline]
    #[must_use]
    pub fn from_le_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    /// Converts to bytes (little-endian).
    #[inline]
    #[must_use]
    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl fmt::Debug for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::HEADER {
            write!(f, "PageId(HEADER)")
        } else {
            write!(f, "PageId({})", self.0)
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PageId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<PageId> for u64 {
    #[inline]
    fn from(id: PageId) -> Self {
        id.0
    }
}

/// Store identifier - uniquely identifies an open store within one `Env`.
///
/// Store IDs are assigned when a store is opened and are never reused for
/// the lifetime of the owning environment, so a stale ID can never alias a
/// newer store in the page pool's identity map.
///
/// # Example
///
/// ```rust
/// use damson_common::types::StoreId;
///
/// let store = StoreId::new(1);
/// assert!(store.is_valid());
/// assert!(!StoreId::INVALID.is_valid());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StoreId(u32);

impl StoreId {
    /// Invalid store ID, used as a sentinel value.
    pub const INVALID: Self = Self(0);

    /// First valid store ID.
    pub const FIRST: Self = Self(1);

    /// Creates a new `StoreId` from a raw u32 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw u32 value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the next store ID.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Checks if this is a valid store ID.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "StoreId(INVALID)")
        } else {
            write!(f, "StoreId({})", self.0)
        }
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StoreId {
    #[inline]
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

impl From<StoreId> for u32 {
    #[inline]
    fn from(id: StoreId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id() {
        let page = PageId::new(42);
        assert_eq!(page.as_u64(), 42);
        assert!(!page.is_header());
        assert!(PageId::HEADER.is_header());

        let next = page.next();
        assert_eq!(next.as_u64(), 43);

        // Byte conversion
        let bytes = page.to_le_bytes();
        assert_eq!(PageId::from_le_bytes(bytes), page);
    }

    #[test]
    fn test_store_id() {
        let store = StoreId::new(5);
        assert_eq!(store.as_u32(), 5);
        assert!(store.is_valid());
        assert!(!StoreId::INVALID.is_valid());

        assert_eq!(StoreId::FIRST.next(), StoreId::new(2));
    }

    #[test]
    fn test_debug_sentinels() {
        assert_eq!(format!("{:?}", PageId::HEADER), "PageId(HEADER)");
        assert_eq!(format!("{:?}", StoreId::INVALID), "StoreId(INVALID)");
        assert_eq!(format!("{:?}", PageId::new(7)), "PageId(7)");
    }

    #[test]
    fn test_ordering() {
        assert!(PageId::new(1) < PageId::new(2));
        assert!(StoreId::new(1) < StoreId::new(2));
    }
}
