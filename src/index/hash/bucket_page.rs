use std::marker::PhantomData;

use crate::common::config::PAGE_SIZE;
use crate::common::types::Page;
use crate::index::hash::codec::Storable;

/// Layout of an extendible hash bucket page:
///
/// ```text
/// occupied_  bitmap   (slot was ever used)
/// readable_  bitmap   (slot holds a live pair)
/// array_     fixed-width (key, value) slots
/// ```
///
/// A slot with `occupied = 1, readable = 0` is a tombstone; tombstoned slots
/// are not reused until the bucket is drained by a split.
pub struct HashTableBucketPage<K, V> {
    _marker: PhantomData<(K, V)>,
}

impl<K: Storable, V: Storable> HashTableBucketPage<K, V> {
    fn entry_size() -> usize {
        K::STORED_SIZE + V::STORED_SIZE
    }

    /// Number of (key, value) slots per page. Each slot costs its entry plus
    /// two bitmap bits, hence 4 * PAGE_SIZE / (4 * entry + 1).
    pub fn capacity() -> usize {
        (4 * PAGE_SIZE) / (4 * Self::entry_size() + 1)
    }

    fn bitmap_bytes() -> usize {
        (Self::capacity() + 7) / 8
    }

    fn readable_offset() -> usize {
        Self::bitmap_bytes()
    }

    fn array_offset() -> usize {
        let offset = 2 * Self::bitmap_bytes();
        debug_assert!(offset + Self::capacity() * Self::entry_size() <= PAGE_SIZE);
        offset
    }

    fn slot_offset(bucket_idx: usize) -> usize {
        Self::array_offset() + bucket_idx * Self::entry_size()
    }

    pub fn is_occupied(page: &Page, bucket_idx: usize) -> bool {
        page.data[bucket_idx / 8] >> (bucket_idx % 8) & 1 == 1
    }

    fn set_occupied(page: &mut Page, bucket_idx: usize) {
        page.data[bucket_idx / 8] |= 1 << (bucket_idx % 8);
    }

    fn clear_occupied(page: &mut Page, bucket_idx: usize) {
        page.data[bucket_idx / 8] &= !(1 << (bucket_idx % 8));
    }

    pub fn is_readable(page: &Page, bucket_idx: usize) -> bool {
        page.data[Self::readable_offset() + bucket_idx / 8] >> (bucket_idx % 8) & 1 == 1
    }

    fn set_readable(page: &mut Page, bucket_idx: usize) {
        page.data[Self::readable_offset() + bucket_idx / 8] |= 1 << (bucket_idx % 8);
    }

    fn clear_readable(page: &mut Page, bucket_idx: usize) {
        page.data[Self::readable_offset() + bucket_idx / 8] &= !(1 << (bucket_idx % 8));
    }

    pub fn key_at(page: &Page, bucket_idx: usize) -> K {
        let offset = Self::slot_offset(bucket_idx);
        K::load(&page.data[offset..offset + K::STORED_SIZE])
    }

    pub fn value_at(page: &Page, bucket_idx: usize) -> V {
        let offset = Self::slot_offset(bucket_idx) + K::STORED_SIZE;
        V::load(&page.data[offset..offset + V::STORED_SIZE])
    }

    fn write_pair(page: &mut Page, bucket_idx: usize, key: &K, value: &V) {
        let offset = Self::slot_offset(bucket_idx);
        key.store(&mut page.data[offset..offset + K::STORED_SIZE]);
        value.store(
            &mut page.data[offset + K::STORED_SIZE..offset + K::STORED_SIZE + V::STORED_SIZE],
        );
    }

    /// Collect every live value stored under a key. Slots past the last
    /// ever-occupied one cannot hold data, so the scan stops there.
    pub fn get_value(page: &Page, key: &K) -> Vec<V> {
        let mut result = Vec::new();
        for bucket_idx in 0..Self::capacity() {
            if !Self::is_occupied(page, bucket_idx) {
                break;
            }
            if Self::is_readable(page, bucket_idx) && Self::key_at(page, bucket_idx) == *key {
                result.push(Self::value_at(page, bucket_idx));
            }
        }
        result
    }

    pub fn contains(page: &Page, key: &K, value: &V) -> bool {
        for bucket_idx in 0..Self::capacity() {
            if !Self::is_occupied(page, bucket_idx) {
                break;
            }
            if Self::is_readable(page, bucket_idx)
                && Self::key_at(page, bucket_idx) == *key
                && Self::value_at(page, bucket_idx) == *value
            {
                return true;
            }
        }
        false
    }

    /// Insert into the first never-occupied slot. Returns false when the
    /// exact pair is already present or no such slot remains.
    pub fn insert(page: &mut Page, key: &K, value: &V) -> bool {
        for bucket_idx in 0..Self::capacity() {
            if Self::is_occupied(page, bucket_idx) {
                if Self::is_readable(page, bucket_idx)
                    && Self::key_at(page, bucket_idx) == *key
                    && Self::value_at(page, bucket_idx) == *value
                {
                    return false;
                }
                continue;
            }
            Self::write_pair(page, bucket_idx, key, value);
            Self::set_occupied(page, bucket_idx);
            Self::set_readable(page, bucket_idx);
            return true;
        }
        false
    }

    /// Tombstone the matching pair: clear readable, keep occupied
    pub fn remove(page: &mut Page, key: &K, value: &V) -> bool {
        for bucket_idx in 0..Self::capacity() {
            if Self::is_occupied(page, bucket_idx)
                && Self::is_readable(page, bucket_idx)
                && Self::key_at(page, bucket_idx) == *key
                && Self::value_at(page, bucket_idx) == *value
            {
                Self::clear_readable(page, bucket_idx);
                return true;
            }
        }
        false
    }

    /// Pull every live pair out and clear both bitmaps, leaving the bucket
    /// blank for redistribution after a split
    pub fn drain_all(page: &mut Page) -> Vec<(K, V)> {
        let mut pairs = Vec::new();
        for bucket_idx in 0..Self::capacity() {
            if Self::is_readable(page, bucket_idx) {
                pairs.push((Self::key_at(page, bucket_idx), Self::value_at(page, bucket_idx)));
            }
            Self::clear_readable(page, bucket_idx);
            Self::clear_occupied(page, bucket_idx);
        }
        pairs
    }

    /// Full means every slot has been occupied at some point; tombstones
    /// count, since they are only reclaimed by a split
    pub fn is_full(page: &Page) -> bool {
        (0..Self::capacity()).all(|idx| Self::is_occupied(page, idx))
    }

    pub fn is_empty(page: &Page) -> bool {
        Self::num_readable(page) == 0
    }

    pub fn num_readable(page: &Page) -> u32 {
        (0..Self::capacity())
            .filter(|&idx| Self::is_readable(page, idx))
            .count() as u32
    }
}
