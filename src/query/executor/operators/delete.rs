// Delete Operator
//
// Tombstones every tuple its child produces, in the heap and in every hash
// index, under an exclusive row lock.

use std::sync::Arc;

use crate::query::executor::operators::{lock_for_write, Executor};
use crate::query::executor::result::{QueryResult, Tuple};
use crate::query::executor::{ExecutionContext, IndexInfo};
use crate::common::types::Rid;
use crate::storage::table::TableHeap;

pub struct DeleteExecutor {
    ctx: ExecutionContext,
    heap: Arc<TableHeap>,
    child: Box<dyn Executor>,
    indexes: Vec<Arc<IndexInfo>>,
}

impl DeleteExecutor {
    pub fn new(
        ctx: ExecutionContext,
        heap: Arc<TableHeap>,
        child: Box<dyn Executor>,
        indexes: Vec<Arc<IndexInfo>>,
    ) -> Self {
        Self {
            ctx,
            heap,
            child,
            indexes,
        }
    }
}

impl Executor for DeleteExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.child.init()
    }

    /// Each call deletes one row and returns its final image
    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        let Some((tuple, rid)) = self.child.next()? else {
            return Ok(None);
        };

        lock_for_write(&self.ctx, rid)?;

        self.heap.delete_tuple(rid)?;
        for index in &self.indexes {
            index.delete_entry(&self.ctx.txn, &tuple, rid)?;
        }

        Ok(Some((tuple, rid)))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.child.close()
    }
}
