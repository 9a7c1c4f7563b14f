use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::common::types::{PageId, PagePtr};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::manager::BufferPoolManager;
use crate::storage::disk::DiskManager;

/// Shards one logical buffer pool over several independent instances. Every
/// operation on an existing page is dispatched by `page_id % num_instances`;
/// allocation round-robins across instances so no shard becomes the sole
/// owner of new pages.
pub struct ParallelBufferPoolManager {
    instances: Vec<Arc<BufferPoolManager>>,
    next_instance: AtomicUsize,
}

impl ParallelBufferPoolManager {
    pub fn new(
        num_instances: usize,
        pool_size_per_instance: usize,
        db_path: impl AsRef<Path>,
    ) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Ok(Self::with_disk_manager(
            num_instances,
            pool_size_per_instance,
            disk_manager,
        ))
    }

    pub fn with_disk_manager(
        num_instances: usize,
        pool_size_per_instance: usize,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        assert!(num_instances > 0, "a pool needs at least one instance");

        let instances = (0..num_instances)
            .map(|instance_index| {
                Arc::new(BufferPoolManager::with_instance(
                    pool_size_per_instance,
                    num_instances,
                    instance_index,
                    disk_manager.clone(),
                ))
            })
            .collect();

        Self {
            instances,
            next_instance: AtomicUsize::new(0),
        }
    }

    /// Total frame count across all instances
    pub fn pool_size(&self) -> usize {
        self.instances.iter().map(|i| i.pool_size()).sum()
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// The instance responsible for a page
    pub fn instance_for(&self, page_id: PageId) -> &Arc<BufferPoolManager> {
        &self.instances[page_id as usize % self.instances.len()]
    }

    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }
        self.instance_for(page_id).fetch_page(page_id)
    }

    /// Try each instance round-robin, starting one past the previous start,
    /// until one has a frame to give out.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let n = self.instances.len();
        let start = self.next_instance.fetch_add(1, Ordering::Relaxed) % n;

        for offset in 0..n {
            match self.instances[(start + offset) % n].new_page() {
                Ok(result) => return Ok(result),
                Err(BufferPoolError::BufferPoolFull) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(BufferPoolError::BufferPoolFull)
    }

    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }
        self.instance_for(page_id).unpin_page(page_id, is_dirty)
    }

    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }
        self.instance_for(page_id).flush_page(page_id)
    }

    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        for instance in &self.instances {
            instance.flush_all_pages()?;
        }
        Ok(())
    }

    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        if page_id < 0 {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }
        self.instance_for(page_id).delete_page(page_id)
    }
}
