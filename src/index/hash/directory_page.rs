use std::collections::HashMap;
use byteorder::{ByteOrder, LittleEndian};

use crate::common::config::{DIRECTORY_ARRAY_SIZE, INVALID_PAGE_ID, MAX_GLOBAL_DEPTH};
use crate::common::types::{Page, PageId};

const GLOBAL_DEPTH_OFFSET: usize = 0;
const PAGE_ID_OFFSET: usize = 4;
const LSN_OFFSET: usize = 8;
const BUCKET_PAGE_IDS_OFFSET: usize = 12;
const LOCAL_DEPTHS_OFFSET: usize = BUCKET_PAGE_IDS_OFFSET + 4 * DIRECTORY_ARRAY_SIZE;

/// Directory of an extendible hash table, decoded from its page. The
/// directory's `2^global_depth` live slots each point at a bucket page; a
/// bucket page of local depth `d` is referenced by `2^(global_depth - d)`
/// slots that agree on their low `d` index bits.
#[derive(Debug, Clone)]
pub struct HashTableDirectoryPage {
    page_id: PageId,
    lsn: u32,
    global_depth: u32,
    bucket_page_ids: [PageId; DIRECTORY_ARRAY_SIZE],
    local_depths: [u8; DIRECTORY_ARRAY_SIZE],
}

impl HashTableDirectoryPage {
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            lsn: 0,
            global_depth: 0,
            bucket_page_ids: [INVALID_PAGE_ID; DIRECTORY_ARRAY_SIZE],
            local_depths: [0; DIRECTORY_ARRAY_SIZE],
        }
    }

    pub fn from_page(page: &Page) -> Self {
        let data = &page.data;
        let global_depth = LittleEndian::read_u32(&data[GLOBAL_DEPTH_OFFSET..]);
        let page_id = LittleEndian::read_i32(&data[PAGE_ID_OFFSET..]);
        let lsn = LittleEndian::read_u32(&data[LSN_OFFSET..]);

        let mut bucket_page_ids = [INVALID_PAGE_ID; DIRECTORY_ARRAY_SIZE];
        for (i, slot) in bucket_page_ids.iter_mut().enumerate() {
            *slot = LittleEndian::read_i32(&data[BUCKET_PAGE_IDS_OFFSET + 4 * i..]);
        }

        let mut local_depths = [0u8; DIRECTORY_ARRAY_SIZE];
        local_depths
            .copy_from_slice(&data[LOCAL_DEPTHS_OFFSET..LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE]);

        Self {
            page_id,
            lsn,
            global_depth,
            bucket_page_ids,
            local_depths,
        }
    }

    pub fn write_to(&self, page: &mut Page) {
        let data = &mut page.data;
        LittleEndian::write_u32(&mut data[GLOBAL_DEPTH_OFFSET..], self.global_depth);
        LittleEndian::write_i32(&mut data[PAGE_ID_OFFSET..], self.page_id);
        LittleEndian::write_u32(&mut data[LSN_OFFSET..], self.lsn);

        for (i, slot) in self.bucket_page_ids.iter().enumerate() {
            LittleEndian::write_i32(&mut data[BUCKET_PAGE_IDS_OFFSET + 4 * i..], *slot);
        }

        data[LOCAL_DEPTHS_OFFSET..LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE]
            .copy_from_slice(&self.local_depths);
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth) - 1
    }

    /// Number of live directory slots
    pub fn size(&self) -> u32 {
        1u32 << self.global_depth
    }

    pub fn bucket_page_id(&self, bucket_idx: u32) -> PageId {
        self.bucket_page_ids[bucket_idx as usize]
    }

    pub fn set_bucket_page_id(&mut self, bucket_idx: u32, bucket_page_id: PageId) {
        self.bucket_page_ids[bucket_idx as usize] = bucket_page_id;
    }

    pub fn local_depth(&self, bucket_idx: u32) -> u8 {
        self.local_depths[bucket_idx as usize]
    }

    pub fn set_local_depth(&mut self, bucket_idx: u32, local_depth: u8) {
        self.local_depths[bucket_idx as usize] = local_depth;
    }

    pub fn local_depth_mask(&self, bucket_idx: u32) -> u32 {
        (1u32 << self.local_depths[bucket_idx as usize]) - 1
    }

    /// Index of the bucket this one split from / merges into
    pub fn split_image_index(&self, bucket_idx: u32) -> u32 {
        let local_depth = self.local_depths[bucket_idx as usize] as u32;
        if local_depth == 0 {
            bucket_idx ^ 1
        } else {
            bucket_idx ^ (1 << (local_depth - 1))
        }
    }

    /// Double the directory: the new upper half mirrors the lower half
    pub fn incr_global_depth(&mut self) {
        assert!(
            self.global_depth < MAX_GLOBAL_DEPTH,
            "directory cannot grow past global depth {}",
            MAX_GLOBAL_DEPTH
        );
        let size = 1usize << self.global_depth;
        for idx in 0..size {
            self.bucket_page_ids[idx | size] = self.bucket_page_ids[idx];
            self.local_depths[idx | size] = self.local_depths[idx];
        }
        self.global_depth += 1;
    }

    /// Halve the directory, clearing the now-dead upper half
    pub fn decr_global_depth(&mut self) {
        assert!(self.global_depth >= 1, "directory cannot shrink below depth 0");
        let old_size = 1usize << self.global_depth;
        let new_size = old_size / 2;
        for idx in new_size..old_size {
            self.bucket_page_ids[idx] = INVALID_PAGE_ID;
            self.local_depths[idx] = 0;
        }
        self.global_depth -= 1;
    }

    /// The upper half is redundant once every bucket has local depth below
    /// the global depth
    pub fn can_shrink(&self) -> bool {
        if self.global_depth <= 1 {
            return false;
        }
        (0..self.size()).all(|idx| u32::from(self.local_depth(idx)) < self.global_depth)
    }

    /// Bump the local depth of every slot that references the given page
    pub fn incr_local_depth_of_page(&mut self, page_id: PageId) {
        for idx in 0..self.size() {
            if self.bucket_page_id(idx) == page_id {
                self.local_depths[idx as usize] += 1;
            }
        }
    }

    pub fn decr_local_depth(&mut self, bucket_idx: u32) {
        self.local_depths[bucket_idx as usize] -= 1;
    }

    /// Assert the structural invariants:
    /// (1) every local depth <= global depth,
    /// (2) each referenced page has exactly 2^(global - local) pointers,
    /// (3) slots sharing a page agree on the local depth.
    pub fn verify_integrity(&self) {
        let mut pointer_counts: HashMap<PageId, u32> = HashMap::new();
        let mut page_depths: HashMap<PageId, u8> = HashMap::new();

        for idx in 0..self.size() {
            let page_id = self.bucket_page_id(idx);
            let local_depth = self.local_depth(idx);
            assert!(
                u32::from(local_depth) <= self.global_depth,
                "local depth {} of slot {} exceeds global depth {}",
                local_depth,
                idx,
                self.global_depth
            );

            *pointer_counts.entry(page_id).or_insert(0) += 1;

            match page_depths.get(&page_id) {
                Some(&known) => assert_eq!(
                    known, local_depth,
                    "slots referencing page {} disagree on local depth",
                    page_id
                ),
                None => {
                    page_depths.insert(page_id, local_depth);
                }
            }
        }

        for (page_id, count) in pointer_counts {
            let local_depth = u32::from(page_depths[&page_id]);
            let required = 1u32 << (self.global_depth - local_depth);
            assert_eq!(
                count, required,
                "page {} is referenced by {} slots, expected {}",
                page_id, count, required
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_directory_verifies() {
        let mut dir = HashTableDirectoryPage::new(0);
        dir.incr_global_depth();
        dir.set_bucket_page_id(0, 5);
        dir.set_bucket_page_id(1, 5);

        assert_eq!(dir.global_depth(), 1);
        assert_eq!(dir.size(), 2);
        assert_eq!(dir.global_depth_mask(), 0b1);
        dir.verify_integrity();
    }

    #[test]
    fn grow_mirrors_lower_half() {
        let mut dir = HashTableDirectoryPage::new(0);
        dir.incr_global_depth();
        dir.set_bucket_page_id(0, 10);
        dir.set_bucket_page_id(1, 11);
        dir.set_local_depth(0, 1);
        dir.set_local_depth(1, 1);

        dir.incr_global_depth();

        assert_eq!(dir.global_depth(), 2);
        assert_eq!(dir.bucket_page_id(2), 10);
        assert_eq!(dir.bucket_page_id(3), 11);
        assert_eq!(dir.local_depth(2), 1);
        assert_eq!(dir.local_depth(3), 1);
        dir.verify_integrity();
    }

    #[test]
    fn shrink_clears_upper_half() {
        let mut dir = HashTableDirectoryPage::new(0);
        dir.incr_global_depth();
        dir.incr_global_depth();
        dir.set_bucket_page_id(0, 10);
        dir.set_bucket_page_id(1, 10);
        dir.set_bucket_page_id(2, 10);
        dir.set_bucket_page_id(3, 10);

        assert!(dir.can_shrink());
        dir.decr_global_depth();

        assert_eq!(dir.global_depth(), 1);
        assert_eq!(dir.bucket_page_id(2), INVALID_PAGE_ID);
        assert!(!dir.can_shrink()); // never below depth 1
    }

    #[test]
    fn split_image_flips_high_local_bit() {
        let mut dir = HashTableDirectoryPage::new(0);
        dir.incr_global_depth();
        dir.incr_global_depth();
        dir.set_local_depth(0b01, 2);
        assert_eq!(dir.split_image_index(0b01), 0b11);
        dir.set_local_depth(0b10, 1);
        assert_eq!(dir.split_image_index(0b10), 0b11);
        dir.set_local_depth(0b00, 0);
        assert_eq!(dir.split_image_index(0b00), 0b01);
    }

    #[test]
    fn page_round_trip() {
        let mut dir = HashTableDirectoryPage::new(7);
        dir.incr_global_depth();
        dir.set_bucket_page_id(0, 20);
        dir.set_bucket_page_id(1, 21);
        dir.set_local_depth(0, 1);
        dir.set_local_depth(1, 1);

        let mut page = Page::new(7);
        dir.write_to(&mut page);
        let decoded = HashTableDirectoryPage::from_page(&page);

        assert_eq!(decoded.page_id(), 7);
        assert_eq!(decoded.global_depth(), 1);
        assert_eq!(decoded.bucket_page_id(0), 20);
        assert_eq!(decoded.bucket_page_id(1), 21);
        assert_eq!(decoded.local_depth(1), 1);
    }
}
