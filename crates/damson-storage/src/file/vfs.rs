//! Filesystem provider trait and the file handle traits it hands out.

use std::path::Path;

use super::error::IoResult;
use super::options::OpenOptions;

/// Interface for accessing files via block-based I/O.
///
/// Used for store data files. The block size is the store page size, fixed
/// when the file is opened, and every offset and byte count passed to
/// [`read_at`](Self::read_at) / [`write_at`](Self::write_at) must be a
/// multiple of it. The guarantee lets implementations proxy calls directly
/// to the operating system without any buffering.
pub trait BlockAccessFile {
    /// Reads exactly `buf.len()` bytes from the file at the given offset.
    ///
    /// Both `offset` and `buf.len()` must be multiples of the block size.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> IoResult<()>;

    /// Writes all of `buf` to the file at the given offset.
    ///
    /// Both `offset` and `buf.len()` must be multiples of the block size.
    /// Writing past the current end of the file extends it.
    fn write_at(&self, buf: &[u8], offset: u64) -> IoResult<()>;

    /// Evicts any cached data for the file into persistent storage.
    fn sync(&self) -> IoResult<()>;

    /// Returns the current file size.
    fn len(&self) -> IoResult<u64>;

    /// Returns true if the file is empty.
    fn is_empty(&self) -> IoResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// File I/O interface without any assumptions on the access pattern.
///
/// Used for store log files; offsets and lengths are unrestricted.
/// Implementations are encouraged to buffer, as long as buffering obeys
/// [`sync`](Self::sync).
pub trait RandomAccessFile {
    /// Reads exactly `buf.len()` bytes from the file at the given offset.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> IoResult<()>;

    /// Writes all of `buf` to the file at the given offset.
    fn write_at(&self, buf: &[u8], offset: u64) -> IoResult<()>;

    /// Evicts any cached data for the file into persistent storage.
    fn sync(&self) -> IoResult<()>;

    /// Returns the current file size.
    fn len(&self) -> IoResult<u64>;
}

/// Filesystem provider.
///
/// The default provider ([`StdVfs`](super::StdVfs)) wraps the platform
/// filesystem. Embedders can supply their own at `Env` construction — the
/// tests use this to inject I/O failures underneath a live store.
pub trait Vfs {
    /// Opens a file for reads/writes at block granularity.
    ///
    /// Used for store data files. `block_shift` is log2 of the block size.
    fn open_block_access(
        &self,
        path: &Path,
        block_shift: usize,
        options: OpenOptions,
    ) -> IoResult<Box<dyn BlockAccessFile>>;

    /// Opens a file without any assumptions on the I/O access pattern.
    ///
    /// Used for store log files.
    fn open_random_access(
        &self,
        path: &Path,
        options: OpenOptions,
    ) -> IoResult<Box<dyn RandomAccessFile>>;

    /// Deletes a file from the filesystem.
    fn remove_file(&self, path: &Path) -> IoResult<()>;
}

impl std::fmt::Debug for dyn BlockAccessFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<dyn BlockAccessFile>")
    }
}
