//! Page pool implementation.

use std::collections::{HashMap, VecDeque};

use damson_common::types::{PageId, StoreId};

use crate::store::{StoreState, StoreTable};

use super::config::PagePoolConfig;
use super::error::{PoolError, PoolResult};
use super::frame::{Frame, FrameId, PageIdentity};
use super::PagePoolStats;

/// Desired outcome if a requested store page is not already in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Read the missing page from the store's data file.
    ///
    /// The correct choice for callers who use the page data, which is
    /// almost all the time.
    Read,

    /// Skip the read; the caller intends to overwrite the page without
    /// looking at it.
    ///
    /// The returned frame is marked dirty, so callers using `Overwrite`
    /// must fill the buffer before releasing their pin.
    Overwrite,
}

/// Manages frames used as scratch pad and cache for store data pages.
///
/// The pool grows lazily up to a fixed capacity and recycles retired
/// frames through a free list. Operations that touch a store's files take
/// the environment's [`StoreTable`] alongside the pool; the two structures
/// are disjoint, which is what lets a single-threaded caller drive I/O,
/// eviction, and the re-entrant store-close drain without any locking.
pub struct PagePool {
    config: PagePoolConfig,
    page_size: usize,

    /// Frame arena. Frames are created lazily and never destroyed before
    /// the pool itself.
    frames: Vec<Frame>,

    /// Unpinned unassigned frames, most recently retired last.
    ///
    /// Used as a stack (LIFO): the last retired frame has the best chance
    /// of still being in the CPU caches.
    free_list: Vec<FrameId>,

    /// Unpinned assigned frames, ordered by the relative time of last use.
    ///
    /// The front is the least recently used frame. Eviction pops the
    /// front; releasing a pin pushes onto the back.
    lru_list: VecDeque<FrameId>,

    /// Log frames waiting to be written to disk. Reserved for the
    /// recovery layer.
    #[allow(dead_code)]
    log_list: VecDeque<FrameId>,

    /// Identity map over the assigned frames.
    page_map: HashMap<(StoreId, PageId), FrameId>,

    fetches: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    flushes: u64,
}

impl PagePool {
    /// Sets up a page pool. Frame memory is allocated on demand.
    pub fn new(config: PagePoolConfig) -> PoolResult<Self> {
        config.validate().map_err(PoolError::invalid_config)?;
        let page_size = config.page_size();
        debug_assert_eq!(page_size & (page_size - 1), 0);

        Ok(Self {
            config,
            page_size,
            frames: Vec::new(),
            free_list: Vec::new(),
            lru_list: VecDeque::new(),
            log_list: VecDeque::new(),
            page_map: HashMap::new(),
            fetches: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            flushes: 0,
        })
    }

    /// The base-2 log of the pool's page size.
    #[inline]
    pub fn page_shift(&self) -> usize {
        self.config.page_shift
    }

    /// Size of a page. Guaranteed to be a power of two.
    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Maximum number of frames this pool may allocate.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Total number of frames allocated for this pool.
    #[inline]
    pub fn allocated_pages(&self) -> usize {
        self.frames.len()
    }

    /// Number of frames that were allocated and are now unused.
    ///
    /// Frames become unused when a store is closed or experiences I/O
    /// errors. They wait on the free list, so future demand can be met
    /// without growing the arena.
    #[inline]
    pub fn unused_pages(&self) -> usize {
        self.free_list.len()
    }

    /// Number of frames that are currently pinned.
    ///
    /// Only unpinned frames can be evicted to meet demand for new pages;
    /// if every frame is pinned, requests fail with
    /// [`PoolError::PoolFull`].
    #[inline]
    pub fn pinned_pages(&self) -> usize {
        self.frames.len() - self.free_list.len() - self.lru_list.len()
    }

    /// True if the pool currently caches the given store page.
    pub fn contains_page(&self, store: StoreId, page: PageId) -> bool {
        self.page_map.contains_key(&(store, page))
    }

    /// Returns a frame for inspection.
    #[inline]
    pub fn frame(&self, frame_id: FrameId) -> &Frame {
        &self.frames[frame_id.index()]
    }

    /// The data of a frame previously returned by
    /// [`store_page`](Self::store_page).
    #[inline]
    pub fn page_data(&self, frame_id: FrameId) -> &[u8] {
        self.frames[frame_id.index()].data()
    }

    /// Mutable access to a frame's data.
    ///
    /// Callers that modify an assigned page must also call
    /// [`mark_page_dirty`](Self::mark_page_dirty), or the change will be
    /// lost on eviction.
    #[inline]
    pub fn page_data_mut(&mut self, frame_id: FrameId) -> &mut [u8] {
        self.frames[frame_id.index()].data_mut()
    }

    /// Changes a frame's dirtiness status.
    ///
    /// The frame must be assigned while it is marked dirty.
    #[inline]
    pub fn mark_page_dirty(&mut self, frame_id: FrameId, dirty: bool) {
        self.frames[frame_id.index()].mark_dirty(dirty);
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> PagePoolStats {
        PagePoolStats {
            fetches: self.fetches,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            flushes: self.flushes,
            allocated_pages: self.allocated_pages(),
            unused_pages: self.unused_pages(),
            pinned_pages: self.pinned_pages(),
        }
    }

    /// Fetches a page from a store and pins it.
    ///
    /// The caller owns one pin on the returned frame and must release it
    /// with [`unpin_store_page`](Self::unpin_store_page) (or
    /// [`unpin_and_write_store_page`](Self::unpin_and_write_store_page))
    /// after use.
    ///
    /// A cached page is returned as-is — the cache is authoritative and
    /// the data file is never re-read on a hit. On a miss, a frame is
    /// obtained from the free list, by evicting the least recently used
    /// frame, or by growing the arena; `Err(PoolFull)` means all frames
    /// are pinned.
    ///
    /// With [`FetchMode::Overwrite`] the frame may or may not come back
    /// marked dirty, so such callers must mark it dirty themselves after
    /// filling it.
    pub fn store_page(
        &mut self,
        stores: &mut StoreTable,
        store_id: StoreId,
        page_id: PageId,
        fetch_mode: FetchMode,
    ) -> PoolResult<FrameId> {
        match stores.get(store_id) {
            Some(store) if store.is_open() => {}
            _ => return Err(PoolError::StoreClosed { store: store_id }),
        }
        self.fetches += 1;

        if let Some(&frame_id) = self.page_map.get(&(store_id, page_id)) {
            self.hits += 1;
            if self.frames[frame_id.index()].is_unpinned() {
                self.remove_from_lru(frame_id);
            }
            self.frames[frame_id.index()].add_pin();
            return Ok(frame_id);
        }

        self.misses += 1;
        let frame_id = self.alloc_page(stores).ok_or(PoolError::PoolFull)?;
        self.assign_page_to_store(stores, frame_id, store_id, page_id, fetch_mode)?;
        Ok(frame_id)
    }

    /// Releases a frame previously obtained by
    /// [`store_page`](Self::store_page).
    ///
    /// Removes the caller's pin. If it was the last pin, the frame joins
    /// the back of the LRU list, still associated with its store; the
    /// caller must nevertheless treat the frame as invalid from here on,
    /// because any later allocation may take its identity.
    pub fn unpin_store_page(&mut self, frame_id: FrameId) {
        let frame = &mut self.frames[frame_id.index()];
        debug_assert!(frame.identity().is_some());

        frame.remove_pin();
        if frame.is_unpinned() {
            debug_assert!(!self.lru_list.contains(&frame_id));
            self.lru_list.push_back(frame_id);
        }
    }

    /// Releases a frame and writes its page out immediately.
    ///
    /// Like [`unpin_store_page`](Self::unpin_store_page), but the caller
    /// is supplying a hint that the page is dirty and must reach the data
    /// file now, bypassing LRU write batching. A write failure forces the
    /// owning store closed, exactly as an eviction writeback failure
    /// would.
    pub fn unpin_and_write_store_page(&mut self, stores: &mut StoreTable, frame_id: FrameId) {
        let frame = &mut self.frames[frame_id.index()];
        debug_assert!(!frame.is_unpinned());
        let Some(identity) = frame.identity() else {
            debug_assert!(false, "unpin-and-write on an unassigned frame");
            return;
        };

        let mut write_failed = false;
        if frame.is_dirty() {
            match stores.get(identity.store) {
                Some(store) => {
                    if let Err(err) = store.write_page(identity.page, frame.data()) {
                        tracing::error!(
                            store = %identity.store,
                            page = %identity.page,
                            %err,
                            "page writeback failed, forcing store closed"
                        );
                        write_failed = true;
                    }
                    self.flushes += 1;
                }
                None => debug_assert!(false, "dirty frame with no backing store"),
            }
            frame.mark_dirty(false);
        }

        if write_failed {
            let open = stores.get(identity.store).is_some_and(|s| s.is_open());
            if open {
                self.close_store(stores, identity.store);
            }
        }

        // The close cascade may have stripped the frame's identity; route
        // the pin release accordingly.
        if self.frames[frame_id.index()].identity().is_some() {
            self.unpin_store_page(frame_id);
        } else {
            self.unpin_unassigned_page(frame_id);
        }
    }

    /// Releases a pin on a frame that is not caching a store page.
    ///
    /// If it was the last pin, the frame is pushed onto the free list.
    pub fn unpin_unassigned_page(&mut self, frame_id: FrameId) {
        let frame = &mut self.frames[frame_id.index()];
        debug_assert!(frame.identity().is_none());

        frame.remove_pin();
        if frame.is_unpinned() {
            debug_assert!(!self.free_list.contains(&frame_id));
            self.free_list.push(frame_id);
        }
    }

    /// Releases a pin, routing to the assigned or unassigned path as
    /// appropriate.
    ///
    /// Useful for pins held across a store close, which strips frames of
    /// their identity while foreign pins are still outstanding.
    pub fn unpin_page(&mut self, frame_id: FrameId) {
        if self.frames[frame_id.index()].identity().is_some() {
            self.unpin_store_page(frame_id);
        } else {
            self.unpin_unassigned_page(frame_id);
        }
    }

    /// Allocates a frame and pins it.
    ///
    /// Sources, in order: the free list, evicting the least recently used
    /// frame (writing it back if dirty), growing the arena. Returns `None`
    /// if the pool is at capacity with every frame pinned.
    ///
    /// Store pages should be handled with [`store_page`](Self::store_page)
    /// instead; this seam exists for internal use and for tests.
    pub fn alloc_page(&mut self, stores: &mut StoreTable) -> Option<FrameId> {
        if let Some(frame_id) = self.free_list.pop() {
            let frame = &mut self.frames[frame_id.index()];
            debug_assert!(frame.identity().is_none());
            debug_assert!(!frame.is_dirty());
            frame.add_pin();
            return Some(frame_id);
        }

        if let Some(frame_id) = self.lru_list.pop_front() {
            self.evictions += 1;
            self.frames[frame_id.index()].add_pin();
            self.unassign_page_from_store(stores, frame_id);
            return Some(frame_id);
        }

        if self.frames.len() < self.config.capacity {
            let frame_id = FrameId::new(self.frames.len());
            // New frames are born with one pin, owned by the caller.
            self.frames.push(Frame::new(self.page_size));
            return Some(frame_id);
        }

        None
    }

    /// Assigns a frame to cache a store page and fetches its data.
    ///
    /// The store page must not already be cached in this pool, and the
    /// caller must hold a pin on the frame. On a fetch failure the frame
    /// is rolled back: identity cleared, pin released, frame returned to
    /// the free list.
    pub fn assign_page_to_store(
        &mut self,
        stores: &mut StoreTable,
        frame_id: FrameId,
        store_id: StoreId,
        page_id: PageId,
        fetch_mode: FetchMode,
    ) -> PoolResult<()> {
        debug_assert!(!self.page_map.contains_key(&(store_id, page_id)));

        self.frames[frame_id.index()].assign(PageIdentity {
            store: store_id,
            page: page_id,
        });
        match stores.get_mut(store_id) {
            Some(store) => store.page_assigned(frame_id),
            None => debug_assert!(false, "assigning to an unknown store"),
        }

        match self.fetch_store_page(stores, frame_id, fetch_mode) {
            Ok(()) => {
                self.page_map.insert((store_id, page_id), frame_id);
                Ok(())
            }
            Err(err) => {
                self.frames[frame_id.index()].unassign();
                if let Some(store) = stores.get_mut(store_id) {
                    store.page_unassigned(frame_id);
                }
                self.unpin_unassigned_page(frame_id);
                debug_assert!(self.frames[frame_id.index()].is_unpinned());
                Err(err)
            }
        }
    }

    /// Frees up a frame that is currently caching a store page.
    ///
    /// If the frame is dirty its content is written back first; the dirty
    /// flag is cleared before the identity goes away. A writeback failure
    /// forces the owning store closed after the unassignment, because its
    /// on-disk state can no longer be trusted — the frame itself still
    /// returns to circulation so the pool does not leak capacity.
    ///
    /// Most callers should use [`unpin_store_page`](Self::unpin_store_page)
    /// instead; this seam guarantees the frame stops caching the page.
    pub fn unassign_page_from_store(&mut self, stores: &mut StoreTable, frame_id: FrameId) {
        let frame = &mut self.frames[frame_id.index()];
        debug_assert!(!frame.is_unpinned());
        let Some(identity) = frame.identity() else {
            debug_assert!(false, "unassigning an unassigned frame");
            return;
        };

        let mut write_failed = false;
        if frame.is_dirty() {
            match stores.get(identity.store) {
                Some(store) => {
                    if let Err(err) = store.write_page(identity.page, frame.data()) {
                        tracing::error!(
                            store = %identity.store,
                            page = %identity.page,
                            %err,
                            "eviction writeback failed, forcing store closed"
                        );
                        write_failed = true;
                    }
                    self.flushes += 1;
                }
                None => debug_assert!(false, "dirty frame with no backing store"),
            }
            frame.mark_dirty(false);
        }

        frame.unassign();
        self.page_map.remove(&(identity.store, identity.page));

        let mut force_close = false;
        if let Some(store) = stores.get_mut(identity.store) {
            store.page_unassigned(frame_id);
            force_close = write_failed && store.is_open();
        }
        if force_close {
            self.close_store(stores, identity.store);
        }
    }

    /// Reads a frame's page data from its associated store.
    ///
    /// With [`FetchMode::Overwrite`] the frame is marked dirty instead of
    /// being read, and filled with recognizable garbage in debug builds so
    /// code that uses uninitialized page data is easy to spot.
    pub fn fetch_store_page(
        &mut self,
        stores: &mut StoreTable,
        frame_id: FrameId,
        fetch_mode: FetchMode,
    ) -> PoolResult<()> {
        let frame = &mut self.frames[frame_id.index()];
        let Some(identity) = frame.identity() else {
            debug_assert!(false, "fetching into an unassigned frame");
            return Ok(());
        };

        match fetch_mode {
            FetchMode::Read => {
                debug_assert!(!frame.is_dirty());
                let Some(store) = stores.get(identity.store) else {
                    debug_assert!(false, "frame assigned to an unknown store");
                    return Ok(());
                };
                store.read_page(identity.page, frame.data_mut())?;
                Ok(())
            }
            FetchMode::Overwrite => {
                frame.mark_dirty(true);
                if cfg!(debug_assertions) {
                    frame.data_mut().fill(0xCD);
                }
                Ok(())
            }
        }
    }

    /// Adds a pin to a frame that is currently caching a store page.
    pub fn pin_store_page(&mut self, frame_id: FrameId) {
        debug_assert!(self.frames[frame_id.index()].identity().is_some());

        if self.frames[frame_id.index()].is_unpinned() {
            self.remove_from_lru(frame_id);
        }
        self.frames[frame_id.index()].add_pin();
    }

    /// Acquires pins on every frame assigned to a store.
    ///
    /// After this returns, the store's resident-frame list is stable while
    /// the pins are held, provided the store fetches no new pages.
    pub fn pin_store_pages(&mut self, stores: &StoreTable, store_id: StoreId) {
        let resident: Vec<FrameId> = match stores.get(store_id) {
            Some(store) => store.pool_pages().to_vec(),
            None => return,
        };
        for frame_id in resident {
            self.pin_store_page(frame_id);
        }
    }

    /// Closes a store, draining its footprint from the pool.
    ///
    /// Every resident frame is unassigned — dirty ones are written back,
    /// and I/O errors are tolerated because closing is already terminal —
    /// then returned to the free list (or left with its foreign pins, to
    /// be released through [`unpin_page`](Self::unpin_page)).
    ///
    /// Safe to invoke from inside the pool itself: an entry on a Closing
    /// store returns immediately (the active drain finishes the job), and
    /// an entry on a Closed store only re-drains whatever was assigned
    /// after the close.
    pub fn close_store(&mut self, stores: &mut StoreTable, store_id: StoreId) {
        let state = match stores.get(store_id) {
            Some(store) => store.state(),
            None => return,
        };
        match state {
            StoreState::Open => {
                if let Some(store) = stores.get_mut(store_id) {
                    store.set_state(StoreState::Closing);
                }
                tracing::debug!(store = %store_id, "closing store");
            }
            StoreState::Closing => return,
            StoreState::Closed => {}
        }

        // Drain by always taking the current head; unassigning removes the
        // entry from the store's list, so this terminates without
        // invalidating anything mid-walk.
        loop {
            let frame_id = match stores.get(store_id) {
                Some(store) => match store.pool_pages().first() {
                    Some(&frame_id) => frame_id,
                    None => break,
                },
                None => break,
            };

            if self.frames[frame_id.index()].is_unpinned() {
                self.remove_from_lru(frame_id);
            }
            self.frames[frame_id.index()].add_pin();
            self.unassign_page_from_store(stores, frame_id);
            self.unpin_unassigned_page(frame_id);
        }

        if state == StoreState::Open {
            if let Some(store) = stores.get_mut(store_id) {
                if let Err(err) = store.sync() {
                    tracing::warn!(store = %store_id, %err, "sync failed while closing store");
                }
                store.set_state(StoreState::Closed);
            }
            tracing::info!(store = %store_id, "store closed");
        }
    }

    fn remove_from_lru(&mut self, frame_id: FrameId) {
        let position = self.lru_list.iter().position(|&f| f == frame_id);
        debug_assert!(position.is_some());
        if let Some(position) = position {
            self.lru_list.remove(position);
        }
    }
}

impl Drop for PagePool {
    fn drop(&mut self) {
        // Outstanding pins at teardown mean a caller leaked one. A
        // non-empty LRU is tolerated: that is the crash-close path.
        debug_assert_eq!(self.pinned_pages(), 0);
    }
}

impl std::fmt::Debug for PagePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagePool")
            .field("page_size", &self.page_size)
            .field("capacity", &self.config.capacity)
            .field("allocated", &self.allocated_pages())
            .field("unused", &self.unused_pages())
            .field("pinned", &self.pinned_pages())
            .field("cached", &self.page_map.len())
            .finish()
    }
}
