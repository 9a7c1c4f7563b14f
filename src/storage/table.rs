use std::sync::Arc;
use thiserror::Error;

use crate::common::config::PAGE_SIZE;
use crate::common::types::{PageId, Rid};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use crate::storage::page::{PageError, SlottedPage, SlottedPageMut, PAGE_HEADER_SIZE, SLOT_SIZE};

#[derive(Error, Debug)]
pub enum HeapError {
    #[error("Tuple of {0} bytes cannot fit in a page")]
    TupleTooLarge(usize),

    #[error("Rid {0} does not address a page slot")]
    InvalidRid(Rid),

    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),
}

/// A table heap: a doubly linked chain of slotted pages owned by a buffer
/// pool. Tuples are addressed by `Rid`; a slot, once handed out, is never
/// renumbered, so Rids stay valid across deletes and compactions.
pub struct TableHeap {
    buffer_pool: Arc<BufferPoolManager>,
    first_page_id: PageId,
}

impl TableHeap {
    /// Create a heap with one fresh, empty page
    pub fn create(buffer_pool: Arc<BufferPoolManager>) -> Result<Self, HeapError> {
        let (page, first_page_id) = buffer_pool.new_page()?;
        {
            let mut guard = page.write();
            SlottedPageMut::new(&mut guard).format();
        }
        buffer_pool.unpin_page(first_page_id, true)?;

        Ok(Self {
            buffer_pool,
            first_page_id,
        })
    }

    /// Reopen a heap whose chain starts at a known page
    pub fn open(buffer_pool: Arc<BufferPoolManager>, first_page_id: PageId) -> Self {
        Self {
            buffer_pool,
            first_page_id,
        }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Append a tuple, extending the page chain when the tail fills up
    pub fn insert_tuple(&self, data: &[u8]) -> Result<Rid, HeapError> {
        if data.len() + SLOT_SIZE > PAGE_SIZE - PAGE_HEADER_SIZE {
            return Err(HeapError::TupleTooLarge(data.len()));
        }

        let mut page_id = self.first_page_id;
        loop {
            let page = self.buffer_pool.fetch_page(page_id)?;
            let inserted = {
                let mut guard = page.write();
                SlottedPageMut::new(&mut guard).insert(data)
            };

            match inserted {
                Ok(slot) => {
                    self.buffer_pool.unpin_page(page_id, true)?;
                    return Ok(Rid::new(page_id, slot.into()));
                }
                Err(PageError::PageFull) => {
                    let next = {
                        let guard = page.read();
                        SlottedPage::new(&guard).next_page_id()
                    };
                    match next {
                        Some(next_id) => {
                            self.buffer_pool.unpin_page(page_id, false)?;
                            page_id = next_id;
                        }
                        None => {
                            let (new_page, new_page_id) = self.buffer_pool.new_page()?;
                            {
                                let mut new_guard = new_page.write();
                                let mut view = SlottedPageMut::new(&mut new_guard);
                                view.format();
                                view.set_prev_page_id(Some(page_id));
                            }
                            {
                                let mut guard = page.write();
                                SlottedPageMut::new(&mut guard)
                                    .set_next_page_id(Some(new_page_id));
                            }
                            self.buffer_pool.unpin_page(page_id, true)?;
                            self.buffer_pool.unpin_page(new_page_id, true)?;
                            page_id = new_page_id;
                        }
                    }
                }
                Err(e) => {
                    self.buffer_pool.unpin_page(page_id, false)?;
                    return Err(e.into());
                }
            }
        }
    }

    pub fn get_tuple(&self, rid: Rid) -> Result<Vec<u8>, HeapError> {
        let slot = Self::slot_index(rid)?;
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let guard = page.read();
            SlottedPage::new(&guard).read(slot).map(|bytes| bytes.to_vec())
        };
        self.buffer_pool.unpin_page(rid.page_id, false)?;
        Ok(result?)
    }

    pub fn update_tuple(&self, rid: Rid, data: &[u8]) -> Result<(), HeapError> {
        let slot = Self::slot_index(rid)?;
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let mut guard = page.write();
            SlottedPageMut::new(&mut guard).update(slot, data)
        };
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok())?;
        Ok(result?)
    }

    pub fn delete_tuple(&self, rid: Rid) -> Result<(), HeapError> {
        let slot = Self::slot_index(rid)?;
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let mut guard = page.write();
            SlottedPageMut::new(&mut guard).delete(slot)
        };
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok())?;
        Ok(result?)
    }

    /// Iterate over the live tuples of the heap in chain order
    pub fn iter(&self) -> TableIterator {
        TableIterator {
            buffer_pool: self.buffer_pool.clone(),
            current_page_id: Some(self.first_page_id),
            slot: 0,
        }
    }

    fn slot_index(rid: Rid) -> Result<u16, HeapError> {
        u16::try_from(rid.slot).map_err(|_| HeapError::InvalidRid(rid))
    }
}

/// Cursor over a table heap. Each step pins the page just long enough to
/// copy one tuple out; dead slots are skipped.
pub struct TableIterator {
    buffer_pool: Arc<BufferPoolManager>,
    current_page_id: Option<PageId>,
    slot: u16,
}

impl Iterator for TableIterator {
    type Item = Result<(Rid, Vec<u8>), HeapError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let page_id = self.current_page_id?;

            let page = match self.buffer_pool.fetch_page(page_id) {
                Ok(page) => page,
                Err(e) => {
                    self.current_page_id = None;
                    return Some(Err(e.into()));
                }
            };

            let guard = page.read();
            let view = SlottedPage::new(&guard);

            if self.slot >= view.slot_count() {
                let next = view.next_page_id();
                drop(guard);
                if let Err(e) = self.buffer_pool.unpin_page(page_id, false) {
                    self.current_page_id = None;
                    return Some(Err(e.into()));
                }
                self.current_page_id = next;
                self.slot = 0;
                continue;
            }

            let slot = self.slot;
            self.slot += 1;
            let tuple = view.read(slot).map(|bytes| bytes.to_vec());
            drop(guard);
            if let Err(e) = self.buffer_pool.unpin_page(page_id, false) {
                self.current_page_id = None;
                return Some(Err(e.into()));
            }

            match tuple {
                Ok(bytes) => return Some(Ok((Rid::new(page_id, slot.into()), bytes))),
                Err(PageError::SlotDead(_)) => continue,
                Err(e) => {
                    self.current_page_id = None;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}
