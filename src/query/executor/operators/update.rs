// Update Operator
//
// Rewrites every tuple its child produces through an update function,
// upgrading held shared locks to exclusive before touching the heap.

use std::sync::Arc;

use crate::query::executor::operators::{lock_for_write, Executor};
use crate::query::executor::result::{encode_tuple, QueryResult, Tuple};
use crate::query::executor::{ExecutionContext, IndexInfo};
use crate::common::types::Rid;
use crate::storage::table::TableHeap;

pub type UpdateFn = Box<dyn Fn(&Tuple) -> Tuple + Send + Sync>;

pub struct UpdateExecutor {
    ctx: ExecutionContext,
    heap: Arc<TableHeap>,
    child: Box<dyn Executor>,
    update_fn: UpdateFn,
    indexes: Vec<Arc<IndexInfo>>,
}

impl UpdateExecutor {
    pub fn new(
        ctx: ExecutionContext,
        heap: Arc<TableHeap>,
        child: Box<dyn Executor>,
        update_fn: UpdateFn,
        indexes: Vec<Arc<IndexInfo>>,
    ) -> Self {
        Self {
            ctx,
            heap,
            child,
            update_fn,
            indexes,
        }
    }
}

impl Executor for UpdateExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.child.init()
    }

    /// Each call updates one row and returns its new image
    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        let Some((old_tuple, rid)) = self.child.next()? else {
            return Ok(None);
        };

        lock_for_write(&self.ctx, rid)?;

        let new_tuple = (self.update_fn)(&old_tuple);
        let bytes = encode_tuple(&new_tuple)?;
        self.heap.update_tuple(rid, &bytes)?;

        for index in &self.indexes {
            index.delete_entry(&self.ctx.txn, &old_tuple, rid)?;
            index.insert_entry(&self.ctx.txn, &new_tuple, rid)?;
        }

        Ok(Some((new_tuple, rid)))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.child.close()
    }
}
