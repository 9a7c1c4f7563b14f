pub mod config;
pub mod types;

pub use config::{INVALID_PAGE_ID, INVALID_TXN_ID, PAGE_SIZE};
pub use types::{FrameId, Lsn, Page, PageId, PagePtr, Rid, TxnId};
