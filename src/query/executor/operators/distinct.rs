// Distinct Operator
//
// Suppresses duplicate tuples from its child using an in-memory hash set.

use std::collections::HashSet;

use crate::query::executor::operators::Executor;
use crate::query::executor::result::{QueryResult, Tuple};
use crate::common::types::Rid;

pub struct DistinctExecutor {
    child: Box<dyn Executor>,
    seen: HashSet<Tuple>,
}

impl DistinctExecutor {
    pub fn new(child: Box<dyn Executor>) -> Self {
        Self {
            child,
            seen: HashSet::new(),
        }
    }
}

impl Executor for DistinctExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.seen.clear();
        self.child.init()
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        loop {
            let Some((tuple, rid)) = self.child.next()? else {
                return Ok(None);
            };
            if self.seen.insert(tuple.clone()) {
                return Ok(Some((tuple, rid)));
            }
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.seen.clear();
        self.child.close()
    }
}
