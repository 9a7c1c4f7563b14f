use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::config::{INVALID_PAGE_ID, PAGE_SIZE};
use crate::common::types::{Page, PageId};

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),
}

/// DiskManager is responsible for handling the actual disk I/O operations.
/// Page ids are assigned by the buffer pool instances; this layer only moves
/// fixed-size pages between memory and the backing file.
pub struct DiskManager {
    db_file: Mutex<File>,
    freed_pages: Mutex<HashSet<PageId>>,
}

impl DiskManager {
    /// Create a new DiskManager with the specified database file
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path)?;

        Ok(Self {
            db_file: Mutex::new(file),
            freed_pages: Mutex::new(HashSet::new()),
        })
    }

    /// Read a page from disk. A page that lies past the end of the file has
    /// never been written; it comes back zeroed.
    pub fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<(), DiskManagerError> {
        if page_id == INVALID_PAGE_ID || page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = Self::page_offset(page_id);
        let mut buffer = [0u8; PAGE_SIZE];

        {
            let mut file = self.db_file.lock();

            let file_size = file.metadata()?.len();

            if offset >= file_size {
                page.data = [0; PAGE_SIZE];
                page.page_id = page_id;
                return Ok(());
            }

            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buffer)?;
        }

        page.data.copy_from_slice(&buffer);
        page.page_id = page_id;

        Ok(())
    }

    /// Write a page to disk
    pub fn write_page(&self, page: &Page) -> Result<(), DiskManagerError> {
        if page.page_id == INVALID_PAGE_ID || page.page_id < 0 {
            return Err(DiskManagerError::InvalidPageId(page.page_id));
        }

        let offset = Self::page_offset(page.page_id);

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&page.data)?;
        file.flush()?;

        Ok(())
    }

    /// Record that a page id is no longer in use. The on-disk bytes are left
    /// in place; only the bookkeeping set changes.
    pub fn deallocate_page(&self, page_id: PageId) {
        if page_id != INVALID_PAGE_ID {
            self.freed_pages.lock().insert(page_id);
        }
    }

    /// Whether a page id has been handed back via `deallocate_page`
    pub fn is_deallocated(&self, page_id: PageId) -> bool {
        self.freed_pages.lock().contains(&page_id)
    }

    fn page_offset(page_id: PageId) -> u64 {
        page_id as u64 * PAGE_SIZE as u64
    }
}
