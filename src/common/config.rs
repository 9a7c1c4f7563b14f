use crate::common::types::{PageId, TxnId};

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Sentinel for "no page"
pub const INVALID_PAGE_ID: PageId = -1;

/// Sentinel for "no transaction"
pub const INVALID_TXN_ID: TxnId = TxnId::MAX;

/// Number of directory slots in an extendible hash directory page
pub const DIRECTORY_ARRAY_SIZE: usize = 512;

/// Upper bound on the directory's global depth (2^9 = 512 slots)
pub const MAX_GLOBAL_DEPTH: u32 = 9;
