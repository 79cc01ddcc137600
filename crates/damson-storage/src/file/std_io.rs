//! Standard file I/O implementation backed by `std::fs`.
//!
//! This is the default cross-platform implementation. Each handle wraps a
//! `std::fs::File` in a mutex so position-based reads and writes (a seek
//! followed by a read or write) stay paired even if a handle is shared.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::error::{IoError, IoResult};
use super::options::OpenOptions;
use super::vfs::{BlockAccessFile, RandomAccessFile, Vfs};

/// Block-access file backed by `std::fs::File`.
///
/// Remembers the block size it was opened with and checks alignment of
/// every read and write in debug builds.
pub struct StdBlockFile {
    file: Mutex<File>,
    path: PathBuf,
    block_size: u64,
}

impl StdBlockFile {
    fn open(path: &Path, block_shift: usize, options: &OpenOptions) -> IoResult<Self> {
        let file = options
            .to_std_options()
            .open(path)
            .map_err(|e| IoError::from_io_with_path(e, path))?;
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
            block_size: 1u64 << block_shift,
        })
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockAccessFile for StdBlockFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> IoResult<()> {
        debug_assert_eq!(offset & (self.block_size - 1), 0);
        debug_assert_eq!(buf.len() as u64 & (self.block_size - 1), 0);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> IoResult<()> {
        debug_assert_eq!(offset & (self.block_size - 1), 0);
        debug_assert_eq!(buf.len() as u64 & (self.block_size - 1), 0);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn sync(&self) -> IoResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn len(&self) -> IoResult<u64> {
        Ok(self.file.lock().metadata()?.len())
    }
}

/// Random-access file backed by `std::fs::File`.
pub struct StdRandomFile {
    file: Mutex<File>,
    path: PathBuf,
}

impl StdRandomFile {
    fn open(path: &Path, options: &OpenOptions) -> IoResult<Self> {
        let file = options
            .to_std_options()
            .open(path)
            .map_err(|e| IoError::from_io_with_path(e, path))?;
        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RandomAccessFile for StdRandomFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> IoResult<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> IoResult<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn sync(&self) -> IoResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn len(&self) -> IoResult<u64> {
        Ok(self.file.lock().metadata()?.len())
    }
}

/// The default filesystem provider, backed by the platform's filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdVfs;

impl StdVfs {
    /// Creates a new standard VFS.
    pub fn new() -> Self {
        Self
    }
}

impl Vfs for StdVfs {
    fn open_block_access(
        &self,
        path: &Path,
        block_shift: usize,
        options: OpenOptions,
    ) -> IoResult<Box<dyn BlockAccessFile>> {
        Ok(Box::new(StdBlockFile::open(path, block_shift, &options)?))
    }

    fn open_random_access(
        &self,
        path: &Path,
        options: OpenOptions,
    ) -> IoResult<Box<dyn RandomAccessFile>> {
        Ok(Box::new(StdRandomFile::open(path, &options)?))
    }

    fn remove_file(&self, path: &Path) -> IoResult<()> {
        std::fs::remove_file(path).map_err(|e| IoError::from_io_with_path(e, path))
    }
}
