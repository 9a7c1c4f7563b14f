use byteorder::{ByteOrder, LittleEndian};

use crate::common::config::{INVALID_PAGE_ID, PAGE_SIZE};
use crate::common::types::{Page, PageId};
use crate::storage::page::error::PageError;

/// Slotted page for variable-length tuples:
///
/// ```text
/// +--------+-- slot array -->      free      <-- payloads --+
/// | header | (off,len) (off,len) …        … tup2 tup1 tup0 |
/// +--------+-------------------------------------------------+
/// ```
///
/// The slot array grows forward from the header while payload bytes grow
/// backward from the end of the page; the gap between them is the free
/// space. A dead slot keeps its number but records offset 0, so a `Rid`
/// handed out once stays valid for the lifetime of the page. Bytes orphaned
/// by deletes and relocations are counted in `fragmented` and reclaimed by
/// compaction, which rewrites payload positions but never slot numbers.
pub const PAGE_HEADER_SIZE: usize = 16;
pub const SLOT_SIZE: usize = 4;

const SLOT_COUNT_OFFSET: usize = 0;
const FREE_LOWER_OFFSET: usize = 2;
const FREE_UPPER_OFFSET: usize = 4;
const FRAGMENTED_OFFSET: usize = 6;
const NEXT_PAGE_OFFSET: usize = 8;
const PREV_PAGE_OFFSET: usize = 12;

fn read_u16(page: &Page, offset: usize) -> u16 {
    LittleEndian::read_u16(&page.data[offset..offset + 2])
}

fn write_u16(page: &mut Page, offset: usize, value: u16) {
    LittleEndian::write_u16(&mut page.data[offset..offset + 2], value);
}

fn read_link(page: &Page, offset: usize) -> Option<PageId> {
    let id = LittleEndian::read_i32(&page.data[offset..offset + 4]);
    (id != INVALID_PAGE_ID).then_some(id)
}

fn write_link(page: &mut Page, offset: usize, link: Option<PageId>) {
    LittleEndian::write_i32(
        &mut page.data[offset..offset + 4],
        link.unwrap_or(INVALID_PAGE_ID),
    );
}

fn slot_pos(slot: u16) -> usize {
    PAGE_HEADER_SIZE + slot as usize * SLOT_SIZE
}

/// (payload offset, payload length) of a live slot
fn slot_entry(page: &Page, slot: u16) -> Result<(usize, usize), PageError> {
    if slot >= read_u16(page, SLOT_COUNT_OFFSET) {
        return Err(PageError::SlotOutOfRange(slot));
    }
    let pos = slot_pos(slot);
    let offset = read_u16(page, pos) as usize;
    let length = read_u16(page, pos + 2) as usize;
    if offset == 0 {
        return Err(PageError::SlotDead(slot));
    }
    Ok((offset, length))
}

fn free_space_of(page: &Page) -> usize {
    (read_u16(page, FREE_UPPER_OFFSET) - read_u16(page, FREE_LOWER_OFFSET)) as usize
}

/// Read-only view over a slotted page
pub struct SlottedPage<'a> {
    page: &'a Page,
}

impl<'a> SlottedPage<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { page }
    }

    /// Number of slots ever handed out, dead ones included
    pub fn slot_count(&self) -> u16 {
        read_u16(self.page, SLOT_COUNT_OFFSET)
    }

    /// Contiguous free bytes between the slot array and the payloads
    pub fn free_space(&self) -> usize {
        free_space_of(self.page)
    }

    /// Dead payload bytes a compaction would reclaim
    pub fn fragmented_space(&self) -> usize {
        read_u16(self.page, FRAGMENTED_OFFSET) as usize
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        read_link(self.page, NEXT_PAGE_OFFSET)
    }

    pub fn prev_page_id(&self) -> Option<PageId> {
        read_link(self.page, PREV_PAGE_OFFSET)
    }

    /// Borrow the payload of a live slot
    pub fn read(&self, slot: u16) -> Result<&'a [u8], PageError> {
        let (offset, length) = slot_entry(self.page, slot)?;
        Ok(&self.page.data[offset..offset + length])
    }
}

/// Mutable view over a slotted page
pub struct SlottedPageMut<'a> {
    page: &'a mut Page,
}

impl<'a> SlottedPageMut<'a> {
    pub fn new(page: &'a mut Page) -> Self {
        Self { page }
    }

    /// Stamp an empty slotted layout onto the page
    pub fn format(&mut self) {
        write_u16(self.page, SLOT_COUNT_OFFSET, 0);
        write_u16(self.page, FREE_LOWER_OFFSET, PAGE_HEADER_SIZE as u16);
        write_u16(self.page, FREE_UPPER_OFFSET, PAGE_SIZE as u16);
        write_u16(self.page, FRAGMENTED_OFFSET, 0);
        write_link(self.page, NEXT_PAGE_OFFSET, None);
        write_link(self.page, PREV_PAGE_OFFSET, None);
    }

    pub fn slot_count(&self) -> u16 {
        read_u16(self.page, SLOT_COUNT_OFFSET)
    }

    pub fn free_space(&self) -> usize {
        free_space_of(self.page)
    }

    pub fn fragmented_space(&self) -> usize {
        read_u16(self.page, FRAGMENTED_OFFSET) as usize
    }

    pub fn read(&self, slot: u16) -> Result<&[u8], PageError> {
        let (offset, length) = slot_entry(self.page, slot)?;
        Ok(&self.page.data[offset..offset + length])
    }

    /// Store a payload in a fresh slot, compacting first when the free gap
    /// is too small but dead bytes would cover the difference
    pub fn insert(&mut self, payload: &[u8]) -> Result<u16, PageError> {
        if payload.len() + SLOT_SIZE > PAGE_SIZE - PAGE_HEADER_SIZE {
            return Err(PageError::PayloadTooLarge(payload.len()));
        }

        let needed = payload.len() + SLOT_SIZE;
        let free = self.free_space();
        if free < needed {
            if free + self.fragmented_space() < needed {
                return Err(PageError::PageFull);
            }
            self.compact();
        }

        let slot = read_u16(self.page, SLOT_COUNT_OFFSET);
        let upper = read_u16(self.page, FREE_UPPER_OFFSET) as usize - payload.len();
        self.page.data[upper..upper + payload.len()].copy_from_slice(payload);

        let pos = slot_pos(slot);
        write_u16(self.page, pos, upper as u16);
        write_u16(self.page, pos + 2, payload.len() as u16);

        write_u16(self.page, SLOT_COUNT_OFFSET, slot + 1);
        write_u16(self.page, FREE_LOWER_OFFSET, (pos + SLOT_SIZE) as u16);
        write_u16(self.page, FREE_UPPER_OFFSET, upper as u16);

        Ok(slot)
    }

    /// Replace a live payload. Shrinking rewrites in place; growth relocates
    /// the payload within the page, keeping the slot number.
    pub fn update(&mut self, slot: u16, payload: &[u8]) -> Result<(), PageError> {
        let (offset, length) = slot_entry(self.page, slot)?;

        if payload.len() <= length {
            self.page.data[offset..offset + payload.len()].copy_from_slice(payload);
            let pos = slot_pos(slot);
            write_u16(self.page, pos + 2, payload.len() as u16);
            let fragmented = self.fragmented_space() + (length - payload.len());
            write_u16(self.page, FRAGMENTED_OFFSET, fragmented as u16);
            return Ok(());
        }

        // The old payload becomes reclaimable the moment the new one lands
        if self.free_space() + self.fragmented_space() + length < payload.len() {
            return Err(PageError::PageFull);
        }

        let pos = slot_pos(slot);
        write_u16(self.page, pos, 0);
        write_u16(self.page, pos + 2, 0);
        let fragmented = self.fragmented_space() + length;
        write_u16(self.page, FRAGMENTED_OFFSET, fragmented as u16);

        if self.free_space() < payload.len() {
            self.compact();
        }

        let upper = read_u16(self.page, FREE_UPPER_OFFSET) as usize - payload.len();
        self.page.data[upper..upper + payload.len()].copy_from_slice(payload);
        write_u16(self.page, pos, upper as u16);
        write_u16(self.page, pos + 2, payload.len() as u16);
        write_u16(self.page, FREE_UPPER_OFFSET, upper as u16);

        Ok(())
    }

    /// Kill a slot. The entry stays so later slots keep their numbers; the
    /// payload bytes count as fragmentation until the next compaction.
    pub fn delete(&mut self, slot: u16) -> Result<(), PageError> {
        let (_, length) = slot_entry(self.page, slot)?;

        let fragmented = self.fragmented_space() + length;
        write_u16(self.page, FRAGMENTED_OFFSET, fragmented as u16);

        let pos = slot_pos(slot);
        write_u16(self.page, pos, 0);
        write_u16(self.page, pos + 2, 0);

        Ok(())
    }

    /// Slide every live payload to the end of the page, squeezing out dead
    /// bytes. Slot numbers are untouched.
    pub fn compact(&mut self) {
        let slot_count = read_u16(self.page, SLOT_COUNT_OFFSET);

        let mut live: Vec<(u16, Vec<u8>)> = Vec::new();
        for slot in 0..slot_count {
            let pos = slot_pos(slot);
            let offset = read_u16(self.page, pos) as usize;
            let length = read_u16(self.page, pos + 2) as usize;
            if offset != 0 {
                live.push((slot, self.page.data[offset..offset + length].to_vec()));
            }
        }

        let mut upper = PAGE_SIZE;
        for (slot, payload) in &live {
            upper -= payload.len();
            self.page.data[upper..upper + payload.len()].copy_from_slice(payload);
            write_u16(self.page, slot_pos(*slot), upper as u16);
        }

        write_u16(self.page, FREE_UPPER_OFFSET, upper as u16);
        write_u16(self.page, FRAGMENTED_OFFSET, 0);
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        read_link(self.page, NEXT_PAGE_OFFSET)
    }

    pub fn prev_page_id(&self) -> Option<PageId> {
        read_link(self.page, PREV_PAGE_OFFSET)
    }

    pub fn set_next_page_id(&mut self, next: Option<PageId>) {
        write_link(self.page, NEXT_PAGE_OFFSET, next);
    }

    pub fn set_prev_page_id(&mut self, prev: Option<PageId>) {
        write_link(self.page, PREV_PAGE_OFFSET, prev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_page() -> Page {
        let mut page = Page::new(1);
        SlottedPageMut::new(&mut page).format();
        page
    }

    #[test]
    fn insert_and_read_back() {
        let mut page = fresh_page();
        let mut view = SlottedPageMut::new(&mut page);

        let a = view.insert(b"alpha").unwrap();
        let b = view.insert(b"bravo").unwrap();
        assert_eq!((a, b), (0, 1));

        drop(view);
        let view = SlottedPage::new(&page);
        assert_eq!(view.read(a).unwrap(), b"alpha");
        assert_eq!(view.read(b).unwrap(), b"bravo");
        assert_eq!(view.slot_count(), 2);
    }

    #[test]
    fn slot_numbers_survive_deletes() {
        let mut page = fresh_page();
        let mut view = SlottedPageMut::new(&mut page);

        let a = view.insert(b"first").unwrap();
        let doomed = view.insert(b"second").unwrap();
        let c = view.insert(b"third").unwrap();

        view.delete(doomed).unwrap();
        assert!(matches!(view.read(doomed), Err(PageError::SlotDead(_))));
        assert!(matches!(view.delete(doomed), Err(PageError::SlotDead(_))));

        // dead slots are never reassigned
        let d = view.insert(b"fourth").unwrap();
        assert_eq!(d, 3);

        assert_eq!(view.read(a).unwrap(), b"first");
        assert_eq!(view.read(c).unwrap(), b"third");
        assert_eq!(view.fragmented_space(), b"second".len());
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let mut page = fresh_page();
        let mut view = SlottedPageMut::new(&mut page);
        view.insert(b"only").unwrap();

        assert!(matches!(view.read(7), Err(PageError::SlotOutOfRange(7))));
        assert!(matches!(view.update(7, b"x"), Err(PageError::SlotOutOfRange(7))));
    }

    #[test]
    fn update_shrinks_in_place_and_grows_by_relocation() {
        let mut page = fresh_page();
        let mut view = SlottedPageMut::new(&mut page);

        let slot = view.insert(b"a medium payload").unwrap();
        let other = view.insert(b"neighbour").unwrap();

        view.update(slot, b"tiny").unwrap();
        assert_eq!(view.read(slot).unwrap(), b"tiny");
        assert!(view.fragmented_space() > 0);

        view.update(slot, b"a significantly longer payload than before")
            .unwrap();
        assert_eq!(
            view.read(slot).unwrap(),
            b"a significantly longer payload than before"
        );
        // the neighbour is untouched by the relocation
        assert_eq!(view.read(other).unwrap(), b"neighbour");
    }

    #[test]
    fn compaction_reclaims_dead_bytes_without_renumbering() {
        let mut page = fresh_page();
        let mut view = SlottedPageMut::new(&mut page);

        // fill the page with chunky payloads
        let chunk = vec![0x5au8; 512];
        let mut slots = Vec::new();
        loop {
            match view.insert(&chunk) {
                Ok(slot) => slots.push(slot),
                Err(PageError::PageFull) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(slots.len() >= 7);

        // free one chunk in the middle; the gap is fragmented, not free
        view.delete(slots[2]).unwrap();
        assert!(view.free_space() < 512 + SLOT_SIZE);
        assert_eq!(view.fragmented_space(), 512);

        // an insert larger than the free gap triggers compaction and fits
        let replacement = vec![0xa5u8; 500];
        let new_slot = view.insert(&replacement).unwrap();
        assert_eq!(new_slot as usize, slots.len());
        assert_eq!(view.fragmented_space(), 0);

        // survivors kept their numbers and their bytes
        for &slot in slots.iter().filter(|&&s| s != slots[2]) {
            assert_eq!(view.read(slot).unwrap(), &chunk[..]);
        }
        assert!(matches!(view.read(slots[2]), Err(PageError::SlotDead(_))));
        assert_eq!(view.read(new_slot).unwrap(), &replacement[..]);
    }

    #[test]
    fn oversized_payload_is_rejected_outright() {
        let mut page = fresh_page();
        let mut view = SlottedPageMut::new(&mut page);
        let huge = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            view.insert(&huge),
            Err(PageError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn chain_links_round_trip() {
        let mut page = fresh_page();
        let mut view = SlottedPageMut::new(&mut page);

        assert_eq!(view.next_page_id(), None);
        view.set_next_page_id(Some(9));
        view.set_prev_page_id(Some(4));
        drop(view);

        let view = SlottedPage::new(&page);
        assert_eq!(view.next_page_id(), Some(9));
        assert_eq!(view.prev_page_id(), Some(4));
    }

    #[test]
    fn free_space_accounting() {
        let mut page = fresh_page();
        let mut view = SlottedPageMut::new(&mut page);

        let initial = view.free_space();
        assert_eq!(initial, PAGE_SIZE - PAGE_HEADER_SIZE);

        view.insert(b"0123456789").unwrap();
        assert_eq!(view.free_space(), initial - 10 - SLOT_SIZE);
    }
}
