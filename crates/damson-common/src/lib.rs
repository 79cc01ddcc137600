//! # damson-common
//!
//! Common types and constants for damson, an experimental embedded
//! key-value store.
//!
//! This crate provides the foundational pieces shared by the storage
//! layers:
//!
//! - **Types**: typed identifiers (`PageId`, `StoreId`)
//! - **Constants**: system-wide limits and defaults
//!
//! ## Example
//!
//! ```rust
//! use damson_common::types::{PageId, StoreId};
//!
//! let page = PageId::new(42);
//! let store = StoreId::new(1);
//! assert!(!page.is_header());
//! assert!(store.is_valid());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod types;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use types::{PageId, StoreId};
