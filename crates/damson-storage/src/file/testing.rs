//! Error-injecting VFS wrappers for testing.
//!
//! [`FailingVfs`] forwards every call to an inner provider, wrapping the
//! block-access files it opens in [`FailingBlockFile`]. I/O calls pass
//! through until an error is injected via the shared [`ErrorSwitch`];
//! afterwards they fail immediately without touching the inner file, until
//! the switch is cleared again.

use std::io;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::{IoError, IoResult};
use super::options::OpenOptions;
use super::vfs::{BlockAccessFile, RandomAccessFile, Vfs};

/// Shared control handle for injected I/O failures.
#[derive(Debug, Default)]
pub struct ErrorSwitch {
    error: Mutex<Option<io::ErrorKind>>,
}

impl ErrorSwitch {
    /// Creates a switch with no error injected.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Injects an error into all subsequent I/O calls.
    ///
    /// Passing `None` stops the error injection behavior.
    pub fn set_access_error(&self, kind: Option<io::ErrorKind>) {
        *self.error.lock() = kind;
    }

    fn check(&self) -> IoResult<()> {
        match *self.error.lock() {
            Some(kind) => Err(IoError::Io {
                source: io::Error::new(kind, "injected I/O failure"),
            }),
            None => Ok(()),
        }
    }
}

/// A wrapper for [`BlockAccessFile`] that fails on demand.
pub struct FailingBlockFile {
    inner: Box<dyn BlockAccessFile>,
    switch: Arc<ErrorSwitch>,
}

impl FailingBlockFile {
    /// Wraps a file with the given error switch.
    pub fn new(inner: Box<dyn BlockAccessFile>, switch: Arc<ErrorSwitch>) -> Self {
        Self { inner, switch }
    }
}

impl BlockAccessFile for FailingBlockFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> IoResult<()> {
        self.switch.check()?;
        self.inner.read_at(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> IoResult<()> {
        self.switch.check()?;
        self.inner.write_at(buf, offset)
    }

    fn sync(&self) -> IoResult<()> {
        self.switch.check()?;
        self.inner.sync()
    }

    fn len(&self) -> IoResult<u64> {
        self.switch.check()?;
        self.inner.len()
    }
}

/// A VFS that wraps every block-access file it opens in a
/// [`FailingBlockFile`] sharing one [`ErrorSwitch`].
///
/// Random-access (log) files are passed through untouched; the page pool
/// never performs log I/O itself.
pub struct FailingVfs<V> {
    inner: V,
    switch: Arc<ErrorSwitch>,
}

impl<V: Vfs> FailingVfs<V> {
    /// Wraps a provider. The returned switch controls all files opened
    /// through this VFS from now on.
    pub fn new(inner: V) -> (Self, Arc<ErrorSwitch>) {
        let switch = ErrorSwitch::new();
        (
            Self {
                inner,
                switch: Arc::clone(&switch),
            },
            switch,
        )
    }
}

impl<V: Vfs> Vfs for FailingVfs<V> {
    fn open_block_access(
        &self,
        path: &Path,
        block_shift: usize,
        options: OpenOptions,
    ) -> IoResult<Box<dyn BlockAccessFile>> {
        let inner = self.inner.open_block_access(path, block_shift, options)?;
        Ok(Box::new(FailingBlockFile::new(
            inner,
            Arc::clone(&self.switch),
        )))
    }

    fn open_random_access(
        &self,
        path: &Path,
        options: OpenOptions,
    ) -> IoResult<Box<dyn RandomAccessFile>> {
        self.inner.open_random_access(path, options)
    }

    fn remove_file(&self, path: &Path) -> IoResult<()> {
        self.inner.remove_file(path)
    }
}
