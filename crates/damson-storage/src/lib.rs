//! # damson-storage
//!
//! Storage core for damson, an experimental embedded key-value store.
//!
//! The centerpiece is the **page pool**, the buffer cache that mediates
//! every read and write between the higher layers and the block-addressed
//! data files beneath:
//!
//! - Bounded LRU cache with pin-based eviction protection
//! - At most one frame ever caches a given (store, page) pair
//! - Lazy growth to a hard capacity, retired frames recycled via a free list
//! - Dirty writeback that stays correct under I/O errors
//! - Store close atomically releases the store's footprint in the cache
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                        Env                           │
//! │  ┌─────────────────────┐  ┌───────────────────────┐  │
//! │  │      PagePool       │  │      StoreTable       │  │
//! │  │  frames / free list │  │  StoreId -> Store     │  │
//! │  │  LRU / identity map │  │  data + log files     │  │
//! │  └─────────────────────┘  └───────────────────────┘  │
//! │             │                        │               │
//! │             └────────────┬───────────┘               │
//! │                          ▼                           │
//! │               ┌─────────────────────┐                │
//! │               │     Vfs (trait)     │                │
//! │               │  block/random files │                │
//! │               └─────────────────────┘                │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The page pool is single-threaded: its operations are not internally
//! synchronized, and embedders that multiplex requests must serialize
//! calls into one [`Env`]. All I/O through the [`file`] seam is synchronous
//! and blocking.
//!
//! # Usage
//!
//! ```rust,no_run
//! use damson_storage::{Env, FetchMode, PagePoolConfig, StoreOptions};
//!
//! fn example() -> damson_storage::PoolResult<()> {
//!     let mut env = Env::new(PagePoolConfig::new(12, 64))?;
//!     let store = env.open_store("data.dmn", StoreOptions::default())?;
//!
//!     let page_id = env.allocate_page(store)?;
//!     let frame = env.store_page(store, page_id, FetchMode::Overwrite)?;
//!     env.page_data_mut(frame)[..5].copy_from_slice(b"hello");
//!     env.unpin_and_write_page(frame);
//!
//!     env.close_store(store);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod env;
pub mod file;
pub mod pool;
pub mod store;

pub use env::Env;
pub use file::{BlockAccessFile, IoError, IoResult, OpenOptions, RandomAccessFile, StdVfs, Vfs};
pub use pool::{FetchMode, FrameId, PagePool, PagePoolConfig, PoolError, PoolResult};
pub use store::{Store, StoreOptions, StoreState};

// Re-export the ID types embedders need to talk to the API.
pub use damson_common::types::{PageId, StoreId};
