// Query Operators Module
//
// Operators for the iterator-based execution model. Each operator processes
// tuples and hands them to its parent in the plan tree.

pub mod aggregation;
pub mod delete;
pub mod distinct;
pub mod hash_join;
pub mod insert;
pub mod nested_loop_join;
pub mod seq_scan;
pub mod update;

use crate::common::types::Rid;
use crate::query::executor::result::{QueryResult, Tuple};
use crate::query::executor::ExecutionContext;
use crate::transaction::concurrency::{AbortReason, TransactionAbort};

pub use aggregation::{AggregateExpr, AggregateFunction, AggregationExecutor};
pub use delete::DeleteExecutor;
pub use distinct::DistinctExecutor;
pub use hash_join::HashJoinExecutor;
pub use insert::InsertExecutor;
pub use nested_loop_join::NestedLoopJoinExecutor;
pub use seq_scan::SeqScanExecutor;
pub use update::UpdateExecutor;

/// The interface every operator in the iterator-based execution model
/// implements: `init` prepares the operator, `next` produces one tuple and
/// its RID at a time, `close` releases resources.
pub trait Executor {
    fn init(&mut self) -> QueryResult<()>;

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>>;

    fn close(&mut self) -> QueryResult<()>;
}

/// Filter over a tuple
pub type Predicate = Box<dyn Fn(&Tuple) -> bool + Send + Sync>;

/// Join condition over a (left, right) tuple pair
pub type JoinPredicate = Box<dyn Fn(&Tuple, &Tuple) -> bool + Send + Sync>;

/// Take an exclusive lock for a write, upgrading a held shared lock. A
/// wound while waiting surfaces as a deadlock abort for the caller's
/// transaction manager to roll back.
pub(crate) fn lock_for_write(ctx: &ExecutionContext, rid: Rid) -> QueryResult<()> {
    let txn = &ctx.txn;
    let granted = if txn.is_exclusive_locked(rid) {
        true
    } else if txn.is_shared_locked(rid) {
        ctx.lock_manager.lock_upgrade(txn, rid)?
    } else {
        ctx.lock_manager.lock_exclusive(txn, rid)?
    };

    if granted {
        Ok(())
    } else {
        Err(TransactionAbort::new(txn.id(), AbortReason::Deadlock).into())
    }
}
