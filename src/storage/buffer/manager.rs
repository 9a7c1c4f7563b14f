use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::common::config::INVALID_PAGE_ID;
use crate::common::types::{FrameId, Page, PageId, PagePtr};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruReplacer;
use crate::storage::disk::DiskManager;

/// One buffer pool frame: the hosted page plus its bookkeeping. The metadata
/// is only ever touched while the pool mutex is held.
struct Frame {
    page: PagePtr,
    pin_count: u32,
    is_dirty: bool,
}

struct PoolState {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    next_page_id: PageId,
}

/// Caches disk pages in a bounded set of frames. A single mutex serialises
/// every operation of one instance, disk I/O included; page payloads are
/// latched separately through the `PagePtr` RwLock.
pub struct BufferPoolManager {
    pool_size: usize,
    num_instances: usize,
    instance_index: usize,
    state: Mutex<PoolState>,
    replacer: LruReplacer,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    /// Standalone pool backed by its own database file
    pub fn new(pool_size: usize, db_path: impl AsRef<Path>) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Ok(Self::with_instance(pool_size, 1, 0, disk_manager))
    }

    /// One shard of a parallel buffer pool. Page ids are allocated from the
    /// arithmetic progression `instance_index + k * num_instances`, so
    /// `page_id % num_instances` routes a page back to its owner.
    pub fn with_instance(
        pool_size: usize,
        num_instances: usize,
        instance_index: usize,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        assert!(num_instances > 0, "a pool needs at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index out of range"
        );

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for frame_id in 0..pool_size {
            frames.push(Frame {
                page: Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID))),
                pin_count: 0,
                is_dirty: false,
            });
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            num_instances,
            instance_index,
            state: Mutex::new(PoolState {
                frames,
                page_table: HashMap::new(),
                free_list,
                next_page_id: instance_index as PageId,
            }),
            replacer: LruReplacer::new(pool_size),
            disk_manager,
        }
    }

    /// Fetch a page, pinning it. The caller must pair this with exactly one
    /// `unpin_page`.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }

        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &mut state.frames[frame_id];
            frame.pin_count += 1;
            let page = frame.page.clone();
            self.replacer.pin(frame_id);
            return Ok(page);
        }

        let frame_id = self.take_frame(&mut state)?;

        let read_result = {
            let frame = &mut state.frames[frame_id];
            let mut page = frame.page.write();
            page.reset();
            let result = self.disk_manager.read_page(page_id, &mut page);
            if result.is_ok() {
                frame.pin_count = 1;
                frame.is_dirty = false;
            }
            result
        };
        if let Err(e) = read_result {
            // the frame must not leak: hand it back to the free list
            state.free_list.push_back(frame_id);
            return Err(e.into());
        }
        state.page_table.insert(page_id, frame_id);

        Ok(state.frames[frame_id].page.clone())
    }

    /// Allocate a brand-new page and pin it. The page starts as fresh zeroes
    /// and is never read from disk.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut state = self.state.lock();

        if state.free_list.is_empty() && self.replacer.is_empty() {
            return Err(BufferPoolError::BufferPoolFull);
        }

        let page_id = state.next_page_id;
        state.next_page_id += self.num_instances as PageId;
        debug_assert_eq!(
            page_id as usize % self.num_instances,
            self.instance_index,
            "allocated page id must route back to this instance"
        );

        let frame_id = self.take_frame(&mut state)?;

        {
            let frame = &mut state.frames[frame_id];
            let mut page = frame.page.write();
            page.reset();
            page.page_id = page_id;
            frame.pin_count = 1;
            frame.is_dirty = false;
        }
        state.page_table.insert(page_id, frame_id);

        Ok((state.frames[frame_id].page.clone(), page_id))
    }

    /// Drop one pin. The dirty flag accumulates: once a page is marked dirty
    /// it stays dirty until flushed.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Err(BufferPoolError::PageNotFound(page_id)),
        };

        let frame = &mut state.frames[frame_id];
        if frame.pin_count == 0 {
            return Err(BufferPoolError::PageNotPinned(page_id));
        }

        frame.pin_count -= 1;
        if is_dirty {
            frame.is_dirty = true;
        }

        if frame.pin_count == 0 {
            self.replacer.unpin(frame_id);
        }

        Ok(())
    }

    /// Write a resident page to disk regardless of its pin state. Clears the
    /// dirty flag, so an unmodified page is not written again at eviction.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Err(BufferPoolError::PageNotFound(page_id)),
        };

        let frame = &mut state.frames[frame_id];
        if frame.is_dirty {
            let page = frame.page.read();
            self.disk_manager.write_page(&page)?;
            drop(page);
            frame.is_dirty = false;
        }

        Ok(())
    }

    /// Flush every resident page
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let page_ids: Vec<PageId> = {
            let state = self.state.lock();
            state.page_table.keys().copied().collect()
        };

        for page_id in page_ids {
            match self.flush_page(page_id) {
                Ok(()) => {}
                // A page may have been evicted or deleted since the snapshot
                Err(BufferPoolError::PageNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Remove a page from the pool and hand its id back to the disk manager.
    /// A non-resident page succeeds trivially; a pinned page fails. Dirty
    /// contents are dropped, so callers wanting the bytes must flush first.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&id) => id,
            None => {
                self.disk_manager.deallocate_page(page_id);
                return Ok(());
            }
        };

        let frame = &mut state.frames[frame_id];
        if frame.pin_count > 0 {
            return Err(BufferPoolError::PagePinned(page_id));
        }

        {
            let mut page = frame.page.write();
            page.reset();
        }
        frame.is_dirty = false;
        frame.pin_count = 0;

        state.page_table.remove(&page_id);
        // The frame now lives in the free list, so it must stop being a
        // victim candidate.
        self.replacer.pin(frame_id);
        state.free_list.push_back(frame_id);

        self.disk_manager.deallocate_page(page_id);

        Ok(())
    }

    /// Take a frame to host a page: the free list first, then an evicted
    /// victim. A dirty victim is written back before the frame is reused.
    fn take_frame(&self, state: &mut PoolState) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = match self.replacer.victim() {
            Some(id) => id,
            None => return Err(BufferPoolError::BufferPoolFull),
        };

        let frame = &state.frames[frame_id];
        let old_page_id = frame.page.read().page_id;
        if frame.is_dirty {
            debug!("evicting dirty page {} from frame {}", old_page_id, frame_id);
            let page = frame.page.read();
            if let Err(e) = self.disk_manager.write_page(&page) {
                // the victim stays cached; put it back in the replacer
                drop(page);
                self.replacer.unpin(frame_id);
                return Err(e.into());
            }
        }
        if old_page_id != INVALID_PAGE_ID {
            state.page_table.remove(&old_page_id);
        }

        Ok(frame_id)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn instance_index(&self) -> usize {
        self.instance_index
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Number of frames currently on the free list
    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Number of pages currently mapped in the page table
    pub fn resident_page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Number of frames the replacer considers evictable
    pub fn replacer_len(&self) -> usize {
        self.replacer.len()
    }

    /// Pin count of a resident page, if resident
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| state.frames[frame_id].pin_count)
    }
}
