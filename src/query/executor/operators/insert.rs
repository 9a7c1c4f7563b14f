// Insert Operator
//
// Appends raw tuples to a table heap, exclusive-locking each new row and
// keeping the table's hash indexes in step.

use std::sync::Arc;

use crate::query::executor::operators::{lock_for_write, Executor};
use crate::query::executor::result::{encode_tuple, QueryResult, Tuple};
use crate::query::executor::{ExecutionContext, IndexInfo};
use crate::common::types::Rid;
use crate::storage::table::TableHeap;

pub struct InsertExecutor {
    ctx: ExecutionContext,
    heap: Arc<TableHeap>,
    rows: Vec<Tuple>,
    indexes: Vec<Arc<IndexInfo>>,
    cursor: usize,
}

impl InsertExecutor {
    pub fn new(
        ctx: ExecutionContext,
        heap: Arc<TableHeap>,
        rows: Vec<Tuple>,
        indexes: Vec<Arc<IndexInfo>>,
    ) -> Self {
        Self {
            ctx,
            heap,
            rows,
            indexes,
            cursor: 0,
        }
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.cursor = 0;
        Ok(())
    }

    /// Each call inserts one pending row and returns it with its new RID
    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        let Some(row) = self.rows.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        let bytes = encode_tuple(row)?;
        let rid = self.heap.insert_tuple(&bytes)?;

        lock_for_write(&self.ctx, rid)?;

        for index in &self.indexes {
            index.insert_entry(&self.ctx.txn, row, rid)?;
        }

        Ok(Some((row.clone(), rid)))
    }

    fn close(&mut self) -> QueryResult<()> {
        Ok(())
    }
}
