// Sequential Scan Operator
//
// Walks a table heap in chain order, taking row-level shared locks as the
// isolation level requires.

use std::sync::Arc;

use crate::query::executor::operators::{Executor, Predicate};
use crate::query::executor::result::{decode_tuple, QueryResult, Tuple};
use crate::query::executor::ExecutionContext;
use crate::common::types::Rid;
use crate::storage::table::{TableHeap, TableIterator};
use crate::transaction::concurrency::{AbortReason, IsolationLevel, TransactionAbort};

pub struct SeqScanExecutor {
    ctx: ExecutionContext,
    heap: Arc<TableHeap>,
    predicate: Option<Predicate>,
    iter: Option<TableIterator>,
}

impl SeqScanExecutor {
    pub fn new(ctx: ExecutionContext, heap: Arc<TableHeap>, predicate: Option<Predicate>) -> Self {
        Self {
            ctx,
            heap,
            predicate,
            iter: None,
        }
    }

    /// Shared-lock a row before reading it. READ_UNCOMMITTED reads without
    /// locks; READ_COMMITTED drops the lock again right after the copy.
    fn lock_row(&self, rid: Rid) -> QueryResult<()> {
        let txn = &self.ctx.txn;
        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            return Ok(());
        }
        if txn.is_shared_locked(rid) || txn.is_exclusive_locked(rid) {
            return Ok(());
        }
        if !self.ctx.lock_manager.lock_shared(txn, rid)? {
            return Err(TransactionAbort::new(txn.id(), AbortReason::Deadlock).into());
        }
        Ok(())
    }

    fn unlock_row_if_read_committed(&self, rid: Rid) {
        let txn = &self.ctx.txn;
        if txn.isolation_level() == IsolationLevel::ReadCommitted && txn.is_shared_locked(rid) {
            self.ctx.lock_manager.unlock(txn, rid);
        }
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.iter = Some(self.heap.iter());
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.iter.is_none() {
            return Ok(None);
        }

        loop {
            let Some(entry) = self.iter.as_mut().unwrap().next() else {
                return Ok(None);
            };
            let (rid, bytes) = entry?;

            self.lock_row(rid)?;
            let tuple = decode_tuple(&bytes)?;
            self.unlock_row_if_read_committed(rid);

            if let Some(predicate) = &self.predicate {
                if !predicate(&tuple) {
                    continue;
                }
            }

            return Ok(Some((tuple, rid)));
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.iter = None;
        Ok(())
    }
}
