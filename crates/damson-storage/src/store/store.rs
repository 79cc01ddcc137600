//! Store lifecycle and page I/O.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use damson_common::constants::LOG_FILE_SUFFIX;
use damson_common::types::{PageId, StoreId};

use crate::file::{BlockAccessFile, IoResult, OpenOptions, RandomAccessFile, Vfs};
use crate::pool::{FrameId, PoolError, PoolResult};

use super::header::StoreHeader;
use super::options::StoreOptions;

/// Lifecycle state of a store.
///
/// A store transitions Open → Closing → Closed exactly once. Closing is
/// only observable from inside the close drain; everything outside sees
/// Open or Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// The store serves pages.
    Open,
    /// The store is draining its resident frames.
    Closing,
    /// The store is closed; operations against it report
    /// [`PoolError::StoreClosed`].
    Closed,
}

/// One key-value store: a paged data file plus a log file.
///
/// The store performs the page pool's I/O for its pages and tracks which
/// frames currently cache them, so closing the store can release its
/// entire footprint in the cache.
pub struct Store {
    /// Handle to the store's data file.
    data_file: Box<dyn BlockAccessFile>,
    /// Handle to the store's log file. Its contents belong to the recovery
    /// layer; the store only keeps it open and synced.
    log_file: Box<dyn RandomAccessFile>,
    /// Metadata from the data file's header page.
    header: StoreHeader,
    /// Frames in the page pool assigned to this store.
    pool_pages: Vec<FrameId>,
    state: StoreState,
    path: PathBuf,
}

impl Store {
    /// Opens or bootstraps a store at `path`.
    ///
    /// A zero-length data file is bootstrapped by writing a fresh header
    /// page; an existing file has its header read and validated against
    /// the pool's page size.
    pub(crate) fn open(
        vfs: &dyn Vfs,
        path: &Path,
        page_shift: usize,
        options: &StoreOptions,
    ) -> PoolResult<Self> {
        let file_options = if options.error_if_exists {
            OpenOptions::new().read(true).write(true).create_new(true)
        } else if options.create_if_missing {
            OpenOptions::for_create()
        } else {
            OpenOptions::new().read(true).write(true)
        };

        let data_file = vfs.open_block_access(path, page_shift, file_options)?;
        let log_file = vfs.open_random_access(&Self::log_file_path(path), OpenOptions::for_create())?;

        let page_size = 1usize << page_shift;
        let file_len = data_file.len()?;

        let header = if file_len == 0 {
            let header = StoreHeader::new(page_shift);
            let mut page = vec![0u8; page_size];
            header.serialize(&mut page);
            data_file.write_at(&page, 0)?;
            tracing::info!(path = %path.display(), page_shift, "bootstrapped new store");
            header
        } else {
            if file_len < page_size as u64 {
                return Err(PoolError::corrupt("data file smaller than one page"));
            }
            let mut page = vec![0u8; page_size];
            data_file.read_at(&mut page, 0)?;
            let header = StoreHeader::deserialize(&page).map_err(PoolError::corrupt)?;
            if header.page_shift != page_shift {
                return Err(PoolError::corrupt("store page size does not match the pool"));
            }
            tracing::debug!(
                path = %path.display(),
                page_count = header.page_count,
                "opened existing store"
            );
            header
        };

        Ok(Self {
            data_file,
            log_file,
            header,
            pool_pages: Vec::new(),
            state: StoreState::Open,
            path: path.to_path_buf(),
        })
    }

    /// The path of the log file associated with a store file.
    ///
    /// The log file lives next to the data file and is not guaranteed to
    /// exist before the store is first opened.
    pub fn log_file_path(store_path: &Path) -> PathBuf {
        let mut path = store_path.as_os_str().to_os_string();
        path.push(LOG_FILE_SUFFIX);
        PathBuf::from(path)
    }

    /// The store's data file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The store's page size in bytes.
    #[inline]
    pub fn page_size(&self) -> usize {
        1 << self.header.page_shift
    }

    /// Metadata from the header page.
    #[inline]
    pub fn header(&self) -> &StoreHeader {
        &self.header
    }

    pub(crate) fn header_mut(&mut self) -> &mut StoreHeader {
        &mut self.header
    }

    /// The store's lifecycle state.
    #[inline]
    pub fn state(&self) -> StoreState {
        self.state
    }

    /// True if the store can serve pages.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.state == StoreState::Open
    }

    /// True if the store is closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state == StoreState::Closed
    }

    pub(crate) fn set_state(&mut self, state: StoreState) {
        self.state = state;
    }

    /// Reads the store page `page_id` into `buf`.
    ///
    /// The destination must be exactly one page and must not hold dirty
    /// data, because the read replaces it.
    pub(crate) fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> IoResult<()> {
        debug_assert_eq!(buf.len(), self.page_size());

        let file_offset = page_id.as_u64() << self.header.page_shift;
        self.data_file.read_at(buf, file_offset)
    }

    /// Writes `buf` out as store page `page_id`.
    ///
    /// The caller is responsible for clearing the frame's dirty flag after
    /// the call returns success.
    pub(crate) fn write_page(&self, page_id: PageId, buf: &[u8]) -> IoResult<()> {
        debug_assert_eq!(buf.len(), self.page_size());

        let file_offset = page_id.as_u64() << self.header.page_shift;
        self.data_file.write_at(buf, file_offset)
    }

    /// Rewrites the header page from the in-memory header.
    pub(crate) fn write_header(&self) -> IoResult<()> {
        let mut page = vec![0u8; self.page_size()];
        self.header.serialize(&mut page);
        self.data_file.write_at(&page, 0)
    }

    /// Evicts the data and log files' cached writes to persistent storage.
    pub(crate) fn sync(&self) -> IoResult<()> {
        self.data_file.sync()?;
        self.log_file.sync()
    }

    /// Called when a pool frame is assigned to this store.
    ///
    /// Registers the frame on the store's resident list, so it can be
    /// unassigned when the store is closed.
    pub(crate) fn page_assigned(&mut self, frame: FrameId) {
        debug_assert!(!self.pool_pages.contains(&frame));
        self.pool_pages.push(frame);
    }

    /// Called when a pool frame is unassigned from this store.
    ///
    /// Calls to this method must be paired with
    /// [`page_assigned`](Self::page_assigned) calls.
    pub(crate) fn page_unassigned(&mut self, frame: FrameId) {
        let position = self.pool_pages.iter().position(|&f| f == frame);
        debug_assert!(position.is_some());
        if let Some(position) = position {
            self.pool_pages.swap_remove(position);
        }
    }

    /// The frames currently caching this store's pages.
    pub(crate) fn pool_pages(&self) -> &[FrameId] {
        &self.pool_pages
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("page_count", &self.header.page_count)
            .field("resident_frames", &self.pool_pages.len())
            .finish()
    }
}

/// The set of stores open in one environment, keyed by [`StoreId`].
///
/// IDs are assigned monotonically and never reused, so a stale ID can
/// never alias a newer store in the page pool's identity map.
#[derive(Debug, Default)]
pub struct StoreTable {
    stores: HashMap<StoreId, Store>,
    next_id: u32,
}

impl StoreTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            stores: HashMap::new(),
            next_id: StoreId::FIRST.as_u32(),
        }
    }

    /// Registers a store and returns its ID.
    pub fn insert(&mut self, store: Store) -> StoreId {
        let id = StoreId::new(self.next_id);
        self.next_id += 1;
        self.stores.insert(id, store);
        id
    }

    /// Looks up a store.
    pub fn get(&self, id: StoreId) -> Option<&Store> {
        self.stores.get(&id)
    }

    /// Looks up a store mutably.
    pub fn get_mut(&mut self, id: StoreId) -> Option<&mut Store> {
        self.stores.get_mut(&id)
    }

    /// Removes a store, dropping its file handles.
    pub fn remove(&mut self, id: StoreId) -> Option<Store> {
        self.stores.remove(&id)
    }

    /// The IDs of all registered stores, in ascending order.
    pub fn ids(&self) -> Vec<StoreId> {
        let mut ids: Vec<StoreId> = self.stores.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// True if no stores are registered.
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
