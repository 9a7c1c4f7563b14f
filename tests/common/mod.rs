use std::sync::Arc;
use anyhow::Result;
use tempfile::NamedTempFile;

use granitedb::storage::buffer::{BufferPoolManager, ParallelBufferPoolManager};
use granitedb::transaction::concurrency::{IsolationLevel, Transaction};
use granitedb::common::types::TxnId;

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<(NamedTempFile, String)> {
    let file = NamedTempFile::new()?;
    let path = file.path().to_str().unwrap().to_string();
    Ok((file, path))
}

// Create a buffer pool manager with a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(pool_size: usize) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, path)?);
    Ok((buffer_pool, file))
}

// Create a sharded buffer pool with a temporary database
#[allow(dead_code)]
pub fn create_parallel_buffer_pool(
    num_instances: usize,
    pool_size_per_instance: usize,
) -> Result<(Arc<ParallelBufferPoolManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let pool = Arc::new(ParallelBufferPoolManager::new(
        num_instances,
        pool_size_per_instance,
        path,
    )?);
    Ok((pool, file))
}

// A transaction with a chosen id, for tests that care about age ordering
#[allow(dead_code)]
pub fn test_txn(id: TxnId) -> Arc<Transaction> {
    Arc::new(Transaction::new(id, IsolationLevel::RepeatableRead))
}

#[allow(dead_code)]
pub fn test_txn_with_isolation(id: TxnId, isolation: IsolationLevel) -> Arc<Transaction> {
    Arc::new(Transaction::new(id, isolation))
}
