// Export public modules
pub mod common;
pub mod index;
pub mod query;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use index::hash::ExtendibleHashTable;
pub use storage::buffer::{BufferPoolError, BufferPoolManager, ParallelBufferPoolManager};
pub use storage::disk::DiskManager;
pub use storage::page::{SlottedPage, SlottedPageMut};
pub use transaction::concurrency::{LockManager, Transaction, TransactionManager};
