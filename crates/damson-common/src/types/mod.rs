//! Type definitions for damson.
//!
//! This module contains the core identifier types used across the storage
//! layers.

mod ids;

pub use ids::{PageId, StoreId};
