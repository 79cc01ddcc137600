//! The environment: resource root owning the page pool and the open stores.

use std::path::Path;

use damson_common::types::{PageId, StoreId};

use crate::file::{StdVfs, Vfs};
use crate::pool::{FetchMode, FrameId, PagePool, PagePoolConfig, PagePoolStats, PoolError, PoolResult};
use crate::store::{Store, StoreOptions, StoreTable};

/// A pool of resources shared among stores: one page pool, the set of open
/// stores, and the filesystem provider.
///
/// The environment is the embedding surface. It is single-threaded by
/// contract: operations take `&mut self` and perform synchronous blocking
/// I/O; embedders that multiplex requests must serialize calls into one
/// `Env`.
///
/// Dropping the environment closes every remaining store, writing back
/// dirty pages on the way out.
pub struct Env {
    pool: PagePool,
    stores: StoreTable,
    vfs: Box<dyn Vfs>,
}

impl Env {
    /// Creates an environment backed by the platform filesystem.
    pub fn new(config: PagePoolConfig) -> PoolResult<Self> {
        Self::with_vfs(config, Box::new(StdVfs::new()))
    }

    /// Creates an environment with a custom filesystem provider.
    ///
    /// This is the seam tests use to inject I/O failures underneath live
    /// stores.
    pub fn with_vfs(config: PagePoolConfig, vfs: Box<dyn Vfs>) -> PoolResult<Self> {
        Ok(Self {
            pool: PagePool::new(config)?,
            stores: StoreTable::new(),
            vfs,
        })
    }

    /// The environment's page pool.
    pub fn pool(&self) -> &PagePool {
        &self.pool
    }

    /// Returns a page pool statistics snapshot.
    pub fn stats(&self) -> PagePoolStats {
        self.pool.stats()
    }

    /// Opens (or bootstraps) the store at `path` and registers it.
    pub fn open_store(
        &mut self,
        path: impl AsRef<Path>,
        options: StoreOptions,
    ) -> PoolResult<StoreId> {
        let store = Store::open(
            self.vfs.as_ref(),
            path.as_ref(),
            self.pool.page_shift(),
            &options,
        )?;
        Ok(self.stores.insert(store))
    }

    /// Closes a store, draining its pages from the pool.
    ///
    /// Idempotent; dirty resident pages are written back, and I/O errors
    /// during the terminal drain are tolerated.
    pub fn close_store(&mut self, store_id: StoreId) {
        self.pool.close_store(&mut self.stores, store_id);
    }

    /// Closes a store and drops its file handles.
    pub fn release_store(&mut self, store_id: StoreId) {
        self.pool.close_store(&mut self.stores, store_id);
        self.stores.remove(store_id);
    }

    /// True if the store is closed (or was never opened here).
    pub fn is_store_closed(&self, store_id: StoreId) -> bool {
        self.stores.get(store_id).map_or(true, Store::is_closed)
    }

    /// Fetches a store page and pins it.
    ///
    /// See [`PagePool::store_page`] for the full contract. The caller owns
    /// one pin on the returned frame and releases it with
    /// [`unpin_page`](Self::unpin_page) or
    /// [`unpin_and_write_page`](Self::unpin_and_write_page).
    pub fn store_page(
        &mut self,
        store_id: StoreId,
        page_id: PageId,
        fetch_mode: FetchMode,
    ) -> PoolResult<FrameId> {
        self.pool
            .store_page(&mut self.stores, store_id, page_id, fetch_mode)
    }

    /// The data of a pinned frame.
    pub fn page_data(&self, frame_id: FrameId) -> &[u8] {
        self.pool.page_data(frame_id)
    }

    /// Mutable access to a pinned frame's data.
    ///
    /// Callers modifying an assigned page must also call
    /// [`mark_page_dirty`](Self::mark_page_dirty).
    pub fn page_data_mut(&mut self, frame_id: FrameId) -> &mut [u8] {
        self.pool.page_data_mut(frame_id)
    }

    /// Changes a frame's dirtiness status.
    pub fn mark_page_dirty(&mut self, frame_id: FrameId, dirty: bool) {
        self.pool.mark_page_dirty(frame_id, dirty);
    }

    /// Releases a pin obtained from [`store_page`](Self::store_page).
    ///
    /// The frame must be treated as invalid afterwards.
    pub fn unpin_page(&mut self, frame_id: FrameId) {
        self.pool.unpin_page(frame_id);
    }

    /// Releases a pin, writing the page out immediately if it is dirty.
    ///
    /// A write failure forces the owning store closed; closure is
    /// observable through [`is_store_closed`](Self::is_store_closed).
    pub fn unpin_and_write_page(&mut self, frame_id: FrameId) {
        self.pool
            .unpin_and_write_store_page(&mut self.stores, frame_id);
    }

    /// Evicts a store's cached file writes to persistent storage.
    pub fn sync_store(&mut self, store_id: StoreId) -> PoolResult<()> {
        let store = self
            .stores
            .get(store_id)
            .ok_or(PoolError::StoreClosed { store: store_id })?;
        store.sync()?;
        Ok(())
    }

    /// Allocates a page in a store and returns its ID.
    ///
    /// Reuses the head of the store's free-page chain when one exists;
    /// otherwise the data file grows by one page. The returned page is not
    /// fetched — callers typically follow up with
    /// [`store_page`](Self::store_page) in [`FetchMode::Overwrite`], since
    /// a freshly allocated page has no meaningful content.
    ///
    /// Never returns page 0; the header page does not come out of dynamic
    /// allocation.
    pub fn allocate_page(&mut self, store_id: StoreId) -> PoolResult<PageId> {
        let free_head = {
            let store = self.open_store_ref(store_id)?;
            store.header().free_list_head
        };

        if !free_head.is_header() {
            // Pop the chain head; its first 8 bytes hold the next free
            // page.
            let frame_id =
                self.pool
                    .store_page(&mut self.stores, store_id, free_head, FetchMode::Read)?;
            let next = {
                let data = self.pool.page_data(frame_id);
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&data[..8]);
                PageId::from_le_bytes(bytes)
            };
            self.pool.unpin_page(frame_id);

            let store = self.open_store_mut(store_id)?;
            store.header_mut().free_list_head = next;
            if let Err(err) = store.write_header() {
                store.header_mut().free_list_head = free_head;
                return Err(err.into());
            }
            Ok(free_head)
        } else {
            let store = self.open_store_mut(store_id)?;
            let page_id = PageId::new(store.header().page_count);
            store.header_mut().page_count += 1;
            if let Err(err) = store.write_header() {
                store.header_mut().page_count -= 1;
                return Err(err.into());
            }
            Ok(page_id)
        }
    }

    /// Returns a page to its store's free-page chain.
    ///
    /// The page's previous content is gone after this call; its first
    /// bytes now link the chain.
    pub fn free_page(&mut self, store_id: StoreId, page_id: PageId) -> PoolResult<()> {
        debug_assert!(!page_id.is_header());
        let free_head = {
            let store = self.open_store_ref(store_id)?;
            debug_assert!(page_id.as_u64() < store.header().page_count);
            store.header().free_list_head
        };

        // Link the freed page into the chain and push it out immediately,
        // so the on-disk chain never points at stale bytes.
        let frame_id =
            self.pool
                .store_page(&mut self.stores, store_id, page_id, FetchMode::Overwrite)?;
        self.pool.page_data_mut(frame_id)[..8].copy_from_slice(&free_head.to_le_bytes());
        self.pool
            .unpin_and_write_store_page(&mut self.stores, frame_id);

        let store = self.open_store_mut(store_id)?;
        store.header_mut().free_list_head = page_id;
        if let Err(err) = store.write_header() {
            store.header_mut().free_list_head = free_head;
            return Err(err.into());
        }
        Ok(())
    }

    fn open_store_ref(&self, store_id: StoreId) -> PoolResult<&Store> {
        match self.stores.get(store_id) {
            Some(store) if store.is_open() => Ok(store),
            _ => Err(PoolError::StoreClosed { store: store_id }),
        }
    }

    fn open_store_mut(&mut self, store_id: StoreId) -> PoolResult<&mut Store> {
        match self.stores.get_mut(store_id) {
            Some(store) if store.is_open() => Ok(store),
            _ => Err(PoolError::StoreClosed { store: store_id }),
        }
    }
}

impl Drop for Env {
    fn drop(&mut self) {
        // Snapshot the ID set; closing mutates the table's stores.
        for store_id in self.stores.ids() {
            self.pool.close_store(&mut self.stores, store_id);
        }

        // With every store closed, all allocated frames are back on the
        // free list; pinned frames here mean a caller leaked a pin.
        debug_assert_eq!(self.pool.allocated_pages(), self.pool.unused_pages());
    }
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("pool", &self.pool)
            .field("stores", &self.stores.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::testing::FailingVfs;
    use rand::{Rng, RngCore};
    use std::io;
    use tempfile::tempdir;

    const PAGE_SHIFT: usize = 12;
    const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

    fn create_env(capacity: usize) -> Env {
        Env::new(PagePoolConfig::new(PAGE_SHIFT, capacity)).unwrap()
    }

    fn create_failing_env(
        capacity: usize,
    ) -> (Env, std::sync::Arc<crate::file::testing::ErrorSwitch>) {
        let (vfs, switch) = FailingVfs::new(StdVfs::new());
        let env = Env::with_vfs(PagePoolConfig::new(PAGE_SHIFT, capacity), Box::new(vfs)).unwrap();
        (env, switch)
    }

    #[test]
    fn test_cache_hit_skips_disk() {
        let dir = tempdir().unwrap();
        let mut env = create_env(2);
        let store = env
            .open_store(dir.path().join("test.dmn"), StoreOptions::default())
            .unwrap();

        let frame = env.store_page(store, PageId::new(1), FetchMode::Overwrite).unwrap();
        env.page_data_mut(frame)[..4].copy_from_slice(b"hit!");
        env.mark_page_dirty(frame, false);
        env.unpin_page(frame);

        // Requesting the page again — even with FetchMode::Read — returns
        // the cached frame without touching the data file: the bytes were
        // never written out, yet they are still there.
        let frame2 = env.store_page(store, PageId::new(1), FetchMode::Read).unwrap();
        assert_eq!(frame, frame2);
        assert_eq!(&env.page_data(frame2)[..4], b"hit!");
        assert_eq!(env.stats().hits, 1);

        env.unpin_page(frame2);
    }

    #[test]
    fn test_eviction_writes_dirty_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dmn");
        let mut env = create_env(1);
        let store = env.open_store(&path, StoreOptions::default()).unwrap();

        let mut pattern = vec![0u8; PAGE_SIZE];
        rand::thread_rng().fill_bytes(&mut pattern);

        let frame = env.store_page(store, PageId::new(1), FetchMode::Overwrite).unwrap();
        env.page_data_mut(frame).copy_from_slice(&pattern);
        env.mark_page_dirty(frame, true);
        env.unpin_page(frame);

        // Faulting a different page into the only frame forces the dirty
        // page out to disk first.
        let frame2 = env.store_page(store, PageId::new(2), FetchMode::Overwrite).unwrap();
        env.mark_page_dirty(frame2, false);
        env.unpin_page(frame2);

        let file = std::fs::read(&path).unwrap();
        assert_eq!(&file[PAGE_SIZE..2 * PAGE_SIZE], &pattern[..]);
    }

    #[test]
    fn test_writeback_error_forces_store_closed() {
        let dir = tempdir().unwrap();
        let (mut env, switch) = create_failing_env(1);
        let store = env
            .open_store(dir.path().join("test.dmn"), StoreOptions::default())
            .unwrap();

        let frame = env.store_page(store, PageId::new(1), FetchMode::Overwrite).unwrap();
        env.page_data_mut(frame).fill(0x7E);
        env.unpin_page(frame);

        switch.set_access_error(Some(io::ErrorKind::Other));

        // The eviction writeback fails and the store is forced closed, but
        // the new assignment still succeeds on the recycled frame.
        let frame2 = env.store_page(store, PageId::new(2), FetchMode::Overwrite).unwrap();
        assert!(env.is_store_closed(store));
        env.mark_page_dirty(frame2, false);
        env.unpin_page(frame2);

        // Subsequent operations on the store report it closed.
        let result = env.store_page(store, PageId::new(3), FetchMode::Read);
        assert!(matches!(result, Err(PoolError::StoreClosed { .. })));

        switch.set_access_error(None);
    }

    #[test]
    fn test_close_store_drains_cache() {
        let dir = tempdir().unwrap();
        let mut env = create_env(16);
        let store = env
            .open_store(dir.path().join("test.dmn"), StoreOptions::default())
            .unwrap();

        for i in 1..=4 {
            let frame = env.store_page(store, PageId::new(i), FetchMode::Overwrite).unwrap();
            env.mark_page_dirty(frame, false);
            env.unpin_page(frame);
        }

        env.close_store(store);

        assert_eq!(env.pool().allocated_pages(), 4);
        assert_eq!(env.pool().unused_pages(), 4);
        assert_eq!(env.pool().pinned_pages(), 0);
        for i in 1..=4 {
            assert!(!env.pool().contains_page(store, PageId::new(i)));
        }
        assert!(env.is_store_closed(store));
    }

    #[test]
    fn test_pool_full_surfaces() {
        let dir = tempdir().unwrap();
        let mut env = create_env(1);
        let store = env
            .open_store(dir.path().join("test.dmn"), StoreOptions::default())
            .unwrap();

        let frame = env.store_page(store, PageId::new(1), FetchMode::Overwrite).unwrap();

        let result = env.store_page(store, PageId::new(2), FetchMode::Overwrite);
        assert!(matches!(result, Err(PoolError::PoolFull)));
        assert_eq!(env.pool().allocated_pages(), 1);
        assert_eq!(env.pool().pinned_pages(), 1);

        env.mark_page_dirty(frame, false);
        env.unpin_page(frame);
    }

    #[test]
    fn test_read_error_rolls_back() {
        let dir = tempdir().unwrap();
        let (mut env, switch) = create_failing_env(1);
        let store = env
            .open_store(dir.path().join("test.dmn"), StoreOptions::default())
            .unwrap();

        switch.set_access_error(Some(io::ErrorKind::Other));
        let result = env.store_page(store, PageId::new(1), FetchMode::Read);
        assert!(matches!(result, Err(PoolError::Io(_))));
        switch.set_access_error(None);

        assert_eq!(env.pool().allocated_pages(), 1);
        assert_eq!(env.pool().unused_pages(), 1);
        assert_eq!(env.pool().pinned_pages(), 0);
        assert!(!env.pool().contains_page(store, PageId::new(1)));
    }

    #[test]
    fn test_page_round_trip_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dmn");
        let mut pattern = vec![0u8; PAGE_SIZE];
        rand::thread_rng().fill_bytes(&mut pattern);

        {
            let mut env = create_env(4);
            let store = env.open_store(&path, StoreOptions::default()).unwrap();
            let page_id = env.allocate_page(store).unwrap();
            assert_eq!(page_id, PageId::new(1));

            let frame = env.store_page(store, page_id, FetchMode::Overwrite).unwrap();
            env.page_data_mut(frame).copy_from_slice(&pattern);
            env.unpin_and_write_page(frame);
            env.close_store(store);
        }

        // A fresh environment reads the same bytes back.
        {
            let mut env = create_env(4);
            let store = env.open_store(&path, StoreOptions::default()).unwrap();
            let frame = env.store_page(store, PageId::new(1), FetchMode::Read).unwrap();
            assert_eq!(env.page_data(frame), &pattern[..]);
            env.unpin_page(frame);
        }
    }

    #[test]
    fn test_allocate_grows_store() {
        let dir = tempdir().unwrap();
        let mut env = create_env(4);
        let store = env
            .open_store(dir.path().join("test.dmn"), StoreOptions::default())
            .unwrap();

        // Page 0 is the header; dynamic allocation starts at 1.
        assert_eq!(env.allocate_page(store).unwrap(), PageId::new(1));
        assert_eq!(env.allocate_page(store).unwrap(), PageId::new(2));
        assert_eq!(env.allocate_page(store).unwrap(), PageId::new(3));
    }

    #[test]
    fn test_free_pages_are_reused_lifo() {
        let dir = tempdir().unwrap();
        let mut env = create_env(4);
        let store = env
            .open_store(dir.path().join("test.dmn"), StoreOptions::default())
            .unwrap();

        let p1 = env.allocate_page(store).unwrap();
        let p2 = env.allocate_page(store).unwrap();
        let p3 = env.allocate_page(store).unwrap();

        env.free_page(store, p2).unwrap();
        env.free_page(store, p3).unwrap();

        // The chain head is the most recently freed page.
        assert_eq!(env.allocate_page(store).unwrap(), p3);
        assert_eq!(env.allocate_page(store).unwrap(), p2);
        // Chain exhausted: the file grows again.
        assert_eq!(env.allocate_page(store).unwrap(), PageId::new(4));

        let _ = p1;
    }

    #[test]
    fn test_free_chain_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dmn");

        {
            let mut env = create_env(4);
            let store = env.open_store(&path, StoreOptions::default()).unwrap();
            let p1 = env.allocate_page(store).unwrap();
            let _p2 = env.allocate_page(store).unwrap();
            env.free_page(store, p1).unwrap();
            env.close_store(store);
        }

        {
            let mut env = create_env(4);
            let store = env.open_store(&path, StoreOptions::default()).unwrap();
            // The persisted chain hands back the freed page first.
            assert_eq!(env.allocate_page(store).unwrap(), PageId::new(1));
            assert_eq!(env.allocate_page(store).unwrap(), PageId::new(3));
        }
    }

    #[test]
    fn test_two_stores_do_not_alias() {
        let dir = tempdir().unwrap();
        let mut env = create_env(4);
        let store_a = env
            .open_store(dir.path().join("a.dmn"), StoreOptions::default())
            .unwrap();
        let store_b = env
            .open_store(dir.path().join("b.dmn"), StoreOptions::default())
            .unwrap();

        let fa = env.store_page(store_a, PageId::new(1), FetchMode::Overwrite).unwrap();
        let fb = env.store_page(store_b, PageId::new(1), FetchMode::Overwrite).unwrap();
        assert_ne!(fa, fb);

        env.page_data_mut(fa).fill(0xAA);
        env.page_data_mut(fb).fill(0xBB);
        env.unpin_and_write_page(fa);
        env.unpin_and_write_page(fb);

        let frame = env.store_page(store_a, PageId::new(1), FetchMode::Read).unwrap();
        assert!(env.page_data(frame).iter().all(|&b| b == 0xAA));
        env.unpin_page(frame);
    }

    #[test]
    fn test_close_only_drains_own_store() {
        let dir = tempdir().unwrap();
        let mut env = create_env(4);
        let store_a = env
            .open_store(dir.path().join("a.dmn"), StoreOptions::default())
            .unwrap();
        let store_b = env
            .open_store(dir.path().join("b.dmn"), StoreOptions::default())
            .unwrap();

        let fa = env.store_page(store_a, PageId::new(1), FetchMode::Overwrite).unwrap();
        let fb = env.store_page(store_b, PageId::new(1), FetchMode::Overwrite).unwrap();
        env.mark_page_dirty(fa, false);
        env.mark_page_dirty(fb, false);
        env.unpin_page(fa);
        env.unpin_page(fb);

        env.close_store(store_a);
        assert!(!env.pool().contains_page(store_a, PageId::new(1)));
        assert!(env.pool().contains_page(store_b, PageId::new(1)));
        assert!(!env.is_store_closed(store_b));
    }

    #[test]
    fn test_release_store_drops_handles() {
        let dir = tempdir().unwrap();
        let mut env = create_env(4);
        let store = env
            .open_store(dir.path().join("test.dmn"), StoreOptions::default())
            .unwrap();

        env.release_store(store);
        assert!(env.is_store_closed(store));
        let result = env.store_page(store, PageId::new(1), FetchMode::Read);
        assert!(matches!(result, Err(PoolError::StoreClosed { .. })));
    }

    #[test]
    fn test_drop_closes_stores() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.dmn");
        let mut pattern = vec![0u8; PAGE_SIZE];
        rand::thread_rng().fill_bytes(&mut pattern);

        {
            let mut env = create_env(4);
            let store = env.open_store(&path, StoreOptions::default()).unwrap();
            let frame = env.store_page(store, PageId::new(1), FetchMode::Overwrite).unwrap();
            env.page_data_mut(frame).copy_from_slice(&pattern);
            env.unpin_page(frame);
            // No explicit close: dropping the environment writes the dirty
            // page back.
        }

        let file = std::fs::read(&path).unwrap();
        assert_eq!(&file[PAGE_SIZE..2 * PAGE_SIZE], &pattern[..]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Env::new(PagePoolConfig::new(PAGE_SHIFT, 0));
        assert!(matches!(result, Err(PoolError::InvalidConfig { .. })));
    }

    #[test]
    fn test_random_workload_keeps_invariants() {
        let dir = tempdir().unwrap();
        let mut env = create_env(8);
        let store = env
            .open_store(dir.path().join("test.dmn"), StoreOptions::default())
            .unwrap();

        let mut rng = rand::thread_rng();
        let mut pinned: Vec<FrameId> = Vec::new();

        for _ in 0..500 {
            if rng.gen_bool(0.6) {
                let page = PageId::new(rng.gen_range(1..32));
                match env.store_page(store, page, FetchMode::Overwrite) {
                    Ok(frame) => {
                        env.page_data_mut(frame)[..8].copy_from_slice(&page.to_le_bytes());
                        pinned.push(frame);
                    }
                    Err(PoolError::PoolFull) => {}
                    Err(err) => panic!("unexpected error: {err}"),
                }
            } else if let Some(frame) = pinned.pop() {
                env.unpin_page(frame);
            }

            // Every frame off the free and LRU lists is one we hold a pin
            // on, and the arena never outgrows its capacity.
            let stats = env.stats();
            let distinct: std::collections::HashSet<FrameId> = pinned.iter().copied().collect();
            assert_eq!(stats.pinned_pages, distinct.len());
            assert!(stats.allocated_pages <= 8);
        }

        for frame in pinned {
            env.unpin_page(frame);
        }
    }
}
