// Hash Join Operator
//
// Equality join: builds a hash table over the left child's join keys on
// init, then probes it with each right tuple. O(n + m) where the nested
// loop join is O(n * m).

use std::collections::HashMap;

use crate::common::types::Rid;
use crate::query::executor::operators::Executor;
use crate::query::executor::result::{DataValue, QueryResult, Tuple};

pub struct HashJoinExecutor {
    /// Build side
    left: Box<dyn Executor>,
    /// Probe side
    right: Box<dyn Executor>,
    left_key_column: usize,
    right_key_column: usize,
    hash_table: HashMap<DataValue, Vec<Tuple>>,
    current_right: Option<(Tuple, Rid)>,
    current_matches: Vec<Tuple>,
    current_match_index: usize,
}

impl HashJoinExecutor {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        left_key_column: usize,
        right_key_column: usize,
    ) -> Self {
        Self {
            left,
            right,
            left_key_column,
            right_key_column,
            hash_table: HashMap::new(),
            current_right: None,
            current_matches: Vec::new(),
            current_match_index: 0,
        }
    }
}

impl Executor for HashJoinExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.left.init()?;
        self.right.init()?;

        self.hash_table.clear();
        while let Some((tuple, _rid)) = self.left.next()? {
            let key = tuple
                .get(self.left_key_column)
                .cloned()
                .unwrap_or(DataValue::Null);
            // NULL never joins with anything
            if key == DataValue::Null {
                continue;
            }
            self.hash_table.entry(key).or_insert_with(Vec::new).push(tuple);
        }

        self.current_right = None;
        self.current_matches.clear();
        self.current_match_index = 0;
        Ok(())
    }

    /// Emits left ++ right for every build-side tuple matching the current
    /// probe tuple's key, carrying the probe row's RID
    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        loop {
            if let Some((right_tuple, right_rid)) = &self.current_right {
                if self.current_match_index < self.current_matches.len() {
                    let left_tuple = &self.current_matches[self.current_match_index];
                    self.current_match_index += 1;

                    let mut joined = left_tuple.clone();
                    joined.extend(right_tuple.iter().cloned());
                    return Ok(Some((joined, *right_rid)));
                }
            }

            // advance the probe side
            match self.right.next()? {
                Some((tuple, rid)) => {
                    let key = tuple
                        .get(self.right_key_column)
                        .cloned()
                        .unwrap_or(DataValue::Null);
                    self.current_matches = if key == DataValue::Null {
                        Vec::new()
                    } else {
                        self.hash_table.get(&key).cloned().unwrap_or_default()
                    };
                    self.current_match_index = 0;
                    self.current_right = Some((tuple, rid));
                }
                None => return Ok(None),
            }
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.hash_table.clear();
        self.current_matches.clear();
        self.current_right = None;
        self.left.close()?;
        self.right.close()
    }
}
