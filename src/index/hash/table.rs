use std::marker::PhantomData;
use std::sync::Arc;
use log::debug;
use parking_lot::RwLock;

use crate::common::config::MAX_GLOBAL_DEPTH;
use crate::common::types::PageId;
use crate::index::hash::bucket_page::HashTableBucketPage;
use crate::index::hash::codec::{hash_key, Storable};
use crate::index::hash::directory_page::HashTableDirectoryPage;
use crate::index::hash::error::HashTableError;
use crate::storage::buffer::BufferPoolManager;
use crate::transaction::concurrency::Transaction;

/// Disk-backed extendible hash table mapping keys to sets of values. The
/// directory and every bucket live in buffer pool pages; a table-level
/// read/write latch serialises structural changes against lookups, and each
/// bucket page is additionally latched through its `PagePtr` lock.
pub struct ExtendibleHashTable<K, V> {
    buffer_pool: Arc<BufferPoolManager>,
    directory_page_id: PageId,
    table_latch: RwLock<()>,
    _marker: PhantomData<(K, V)>,
}

type Bucket<K, V> = HashTableBucketPage<K, V>;

impl<K: Storable, V: Storable> ExtendibleHashTable<K, V> {
    /// Bootstrap a table: a directory of global depth 1 whose two slots
    /// share one empty bucket of local depth 0.
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Result<Self, HashTableError> {
        let (directory_page, directory_page_id) = buffer_pool.new_page()?;
        let (_bucket_page, bucket_page_id) = buffer_pool.new_page()?;

        let mut directory = HashTableDirectoryPage::new(directory_page_id);
        directory.incr_global_depth();
        directory.set_bucket_page_id(0, bucket_page_id);
        directory.set_bucket_page_id(1, bucket_page_id);

        {
            let mut guard = directory_page.write();
            directory.write_to(&mut guard);
        }
        buffer_pool.unpin_page(directory_page_id, true)?;
        // A zeroed page is already a valid empty bucket
        buffer_pool.unpin_page(bucket_page_id, true)?;

        Ok(Self {
            buffer_pool,
            directory_page_id,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    /// Collect every value stored under a key
    pub fn get_value(&self, _txn: &Arc<Transaction>, key: &K) -> Result<Vec<V>, HashTableError> {
        let _table = self.table_latch.read();

        let directory = self.load_directory()?;
        let bucket_idx = hash_key(key) & directory.global_depth_mask();
        let bucket_page_id = directory.bucket_page_id(bucket_idx);

        let page = self.buffer_pool.fetch_page(bucket_page_id)?;
        let result = {
            let guard = page.read();
            Bucket::<K, V>::get_value(&guard, key)
        };
        self.buffer_pool.unpin_page(bucket_page_id, false)?;

        Ok(result)
    }

    /// Insert a (key, value) pair. Returns false when the exact pair already
    /// exists, or when a needed split is impossible because the directory is
    /// at its maximum depth.
    pub fn insert(
        &self,
        _txn: &Arc<Transaction>,
        key: &K,
        value: &V,
    ) -> Result<bool, HashTableError> {
        let _table = self.table_latch.write();

        let mut directory = self.load_directory()?;
        let mut directory_dirty = false;
        let hash = hash_key(key);

        let inserted = loop {
            let bucket_idx = hash & directory.global_depth_mask();
            let bucket_page_id = directory.bucket_page_id(bucket_idx);

            let page = self.buffer_pool.fetch_page(bucket_page_id)?;
            let mut guard = page.write();

            if Bucket::<K, V>::contains(&guard, key, value) {
                drop(guard);
                self.buffer_pool.unpin_page(bucket_page_id, false)?;
                break false;
            }
            if Bucket::<K, V>::insert(&mut guard, key, value) {
                drop(guard);
                self.buffer_pool.unpin_page(bucket_page_id, true)?;
                break true;
            }

            // Bucket is full: split it. When the bucket already owns a full
            // prefix of the directory, the directory has to double first.
            if u32::from(directory.local_depth(bucket_idx)) == directory.global_depth() {
                if directory.global_depth() >= MAX_GLOBAL_DEPTH {
                    drop(guard);
                    self.buffer_pool.unpin_page(bucket_page_id, false)?;
                    break false;
                }
                directory.incr_global_depth();
            }

            let old_depth = u32::from(directory.local_depth(bucket_idx));
            directory.incr_local_depth_of_page(bucket_page_id);

            let split_bit = 1u32 << old_depth;
            let new_mask = (split_bit << 1) - 1;
            let new_prefix = (bucket_idx & (split_bit - 1)) | split_bit;

            let (new_page, new_page_id) = self.buffer_pool.new_page()?;
            debug!(
                "splitting bucket page {} into {} at local depth {}",
                bucket_page_id,
                new_page_id,
                old_depth + 1
            );

            // Half of the slots referencing the old page move to the new one
            for idx in 0..directory.size() {
                if directory.bucket_page_id(idx) == bucket_page_id
                    && (idx & new_mask) == new_prefix
                {
                    directory.set_bucket_page_id(idx, new_page_id);
                }
            }

            // Redistribute the pairs by their now-significant bit
            let pairs = Bucket::<K, V>::drain_all(&mut guard);
            {
                let mut new_guard = new_page.write();
                for (k, v) in &pairs {
                    if hash_key(k) & new_mask == new_prefix {
                        Bucket::<K, V>::insert(&mut new_guard, k, v);
                    } else {
                        Bucket::<K, V>::insert(&mut guard, k, v);
                    }
                }
            }

            drop(guard);
            self.buffer_pool.unpin_page(bucket_page_id, true)?;
            self.buffer_pool.unpin_page(new_page_id, true)?;
            directory_dirty = true;
            // retry the pending pair; a skewed split may need to repeat
        };

        if directory_dirty {
            self.store_directory(&directory)?;
        }

        Ok(inserted)
    }

    /// Remove an exact (key, value) pair, merging emptied buckets with their
    /// split image and shrinking the directory when possible
    pub fn remove(
        &self,
        _txn: &Arc<Transaction>,
        key: &K,
        value: &V,
    ) -> Result<bool, HashTableError> {
        let _table = self.table_latch.write();

        let mut directory = self.load_directory()?;
        let bucket_idx = hash_key(key) & directory.global_depth_mask();
        let bucket_page_id = directory.bucket_page_id(bucket_idx);

        let page = self.buffer_pool.fetch_page(bucket_page_id)?;
        let (removed, now_empty) = {
            let mut guard = page.write();
            let removed = Bucket::<K, V>::remove(&mut guard, key, value);
            let now_empty = removed && Bucket::<K, V>::is_empty(&guard);
            (removed, now_empty)
        };
        self.buffer_pool.unpin_page(bucket_page_id, removed)?;

        if !removed {
            return Ok(false);
        }

        if now_empty {
            let mut directory_dirty = self.merge(&mut directory, bucket_idx)?;
            while directory.can_shrink() {
                directory.decr_global_depth();
                directory_dirty = true;
            }
            if directory_dirty {
                self.store_directory(&directory)?;
            }
        }

        Ok(true)
    }

    pub fn global_depth(&self) -> Result<u32, HashTableError> {
        let _table = self.table_latch.read();
        Ok(self.load_directory()?.global_depth())
    }

    /// Assert the directory invariants; panics on violation
    pub fn verify_integrity(&self) -> Result<(), HashTableError> {
        let _table = self.table_latch.read();
        self.load_directory()?.verify_integrity();
        Ok(())
    }

    /// Fold an emptied bucket into its split image, repeating while the
    /// surviving bucket is itself empty. Requires matching local depths and
    /// local depth > 0; returns whether the directory changed.
    fn merge(
        &self,
        directory: &mut HashTableDirectoryPage,
        mut bucket_idx: u32,
    ) -> Result<bool, HashTableError> {
        let mut changed = false;

        loop {
            bucket_idx &= directory.global_depth_mask();
            let bucket_page_id = directory.bucket_page_id(bucket_idx);
            let local_depth = directory.local_depth(bucket_idx);
            if local_depth == 0 {
                break;
            }

            let page = self.buffer_pool.fetch_page(bucket_page_id)?;
            let empty = {
                let guard = page.read();
                Bucket::<K, V>::is_empty(&guard)
            };
            self.buffer_pool.unpin_page(bucket_page_id, false)?;
            if !empty {
                break;
            }

            let split_idx = directory.split_image_index(bucket_idx);
            if directory.local_depth(split_idx) != local_depth {
                break;
            }
            let split_page_id = directory.bucket_page_id(split_idx);
            if split_page_id == bucket_page_id {
                break;
            }

            debug!(
                "merging empty bucket page {} into split image {}",
                bucket_page_id, split_page_id
            );
            for idx in 0..directory.size() {
                if directory.bucket_page_id(idx) == bucket_page_id {
                    directory.set_bucket_page_id(idx, split_page_id);
                    directory.decr_local_depth(idx);
                } else if directory.bucket_page_id(idx) == split_page_id {
                    directory.decr_local_depth(idx);
                }
            }
            changed = true;

            // Nothing references the emptied page anymore
            self.buffer_pool.delete_page(bucket_page_id)?;
        }

        Ok(changed)
    }

    fn load_directory(&self) -> Result<HashTableDirectoryPage, HashTableError> {
        let page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let directory = {
            let guard = page.read();
            HashTableDirectoryPage::from_page(&guard)
        };
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(directory)
    }

    fn store_directory(
        &self,
        directory: &HashTableDirectoryPage,
    ) -> Result<(), HashTableError> {
        let page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        {
            let mut guard = page.write();
            directory.write_to(&mut guard);
        }
        self.buffer_pool.unpin_page(self.directory_page_id, true)?;
        Ok(())
    }
}
