// Query Execution Module
//
// Volcano-style executors over the storage and transaction cores: each
// operator exposes init/next/close and pulls tuples from its children.

pub mod operators;
pub mod result;

use std::sync::Arc;

use crate::common::types::Rid;
use crate::index::hash::{ExtendibleHashTable, HashTableError};
use crate::query::executor::result::{DataValue, Tuple};
use crate::storage::buffer::BufferPoolManager;
use crate::transaction::concurrency::{LockManager, Transaction};

pub use operators::Executor;
pub use result::{QueryError, QueryResult};

/// Everything an executor needs from the engine. Handles are injected, never
/// reached through globals.
#[derive(Clone)]
pub struct ExecutionContext {
    pub buffer_pool: Arc<BufferPoolManager>,
    pub lock_manager: Arc<LockManager>,
    pub txn: Arc<Transaction>,
}

impl ExecutionContext {
    pub fn new(
        buffer_pool: Arc<BufferPoolManager>,
        lock_manager: Arc<LockManager>,
        txn: Arc<Transaction>,
    ) -> Self {
        Self {
            buffer_pool,
            lock_manager,
            txn,
        }
    }
}

/// A hash index over one integer column of a table, maintained by the write
/// executors
pub struct IndexInfo {
    pub name: String,
    pub key_column: usize,
    pub index: ExtendibleHashTable<i64, Rid>,
}

impl IndexInfo {
    pub fn new(
        name: impl Into<String>,
        key_column: usize,
        buffer_pool: Arc<BufferPoolManager>,
    ) -> Result<Self, HashTableError> {
        Ok(Self {
            name: name.into(),
            key_column,
            index: ExtendibleHashTable::new(buffer_pool)?,
        })
    }

    fn key_of(&self, tuple: &Tuple) -> Option<i64> {
        match tuple.get(self.key_column) {
            Some(DataValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn insert_entry(
        &self,
        txn: &Arc<Transaction>,
        tuple: &Tuple,
        rid: Rid,
    ) -> Result<(), HashTableError> {
        if let Some(key) = self.key_of(tuple) {
            self.index.insert(txn, &key, &rid)?;
        }
        Ok(())
    }

    pub fn delete_entry(
        &self,
        txn: &Arc<Transaction>,
        tuple: &Tuple,
        rid: Rid,
    ) -> Result<(), HashTableError> {
        if let Some(key) = self.key_of(tuple) {
            self.index.remove(txn, &key, &rid)?;
        }
        Ok(())
    }
}
