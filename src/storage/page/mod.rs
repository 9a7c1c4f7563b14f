mod error;
mod slotted;

pub use error::PageError;
pub use slotted::{SlottedPage, SlottedPageMut, PAGE_HEADER_SIZE, SLOT_SIZE};
