// Nested Loop Join Operator
//
// Materialises the right child on init, then streams the left child and
// emits every pair the predicate accepts. The joined tuple carries the left
// row's RID.

use crate::query::executor::operators::{Executor, JoinPredicate};
use crate::query::executor::result::{QueryResult, Tuple};
use crate::common::types::Rid;

pub struct NestedLoopJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    predicate: JoinPredicate,
    right_tuples: Vec<Tuple>,
    current_left: Option<(Tuple, Rid)>,
    right_cursor: usize,
}

impl NestedLoopJoinExecutor {
    pub fn new(left: Box<dyn Executor>, right: Box<dyn Executor>, predicate: JoinPredicate) -> Self {
        Self {
            left,
            right,
            predicate,
            right_tuples: Vec::new(),
            current_left: None,
            right_cursor: 0,
        }
    }
}

impl Executor for NestedLoopJoinExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.left.init()?;
        self.right.init()?;

        self.right_tuples.clear();
        while let Some((tuple, _)) = self.right.next()? {
            self.right_tuples.push(tuple);
        }

        self.current_left = None;
        self.right_cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        loop {
            if self.current_left.is_none() {
                self.current_left = self.left.next()?;
                self.right_cursor = 0;
                if self.current_left.is_none() {
                    return Ok(None);
                }
            }

            let Some((left_tuple, left_rid)) = self.current_left.as_ref() else {
                continue;
            };

            while self.right_cursor < self.right_tuples.len() {
                let right_tuple = &self.right_tuples[self.right_cursor];
                self.right_cursor += 1;

                if (self.predicate)(left_tuple, right_tuple) {
                    let mut joined = left_tuple.clone();
                    joined.extend(right_tuple.iter().cloned());
                    return Ok(Some((joined, *left_rid)));
                }
            }

            self.current_left = None;
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.right_tuples.clear();
        self.left.close()?;
        self.right.close()
    }
}
