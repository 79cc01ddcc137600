//! Synchronous file I/O seam for damson.
//!
//! This module provides the narrow interfaces the store layer consumes:
//!
//! - **Block-access files**: reads and writes at page granularity, used for
//!   store data files. Offsets and byte counts are multiples of the block
//!   size the file was opened with.
//! - **Random-access files**: unrestricted offsets and lengths, used for
//!   store log files.
//! - **[`Vfs`]**: the provider that opens both, overridable at `Env`
//!   construction so tests can inject failures.
//!
//! All operations are position-based (pread/pwrite style) and blocking; the
//! page pool treats them as synchronous from its single-threaded
//! perspective.

mod error;
mod options;
mod std_io;
mod vfs;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{IoError, IoResult};
pub use options::OpenOptions;
pub use std_io::{StdBlockFile, StdRandomFile, StdVfs};
pub use vfs::{BlockAccessFile, RandomAccessFile, Vfs};
