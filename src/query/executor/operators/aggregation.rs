// Hash-based Aggregation Operator
//
// Groups the child's tuples with a hash table and folds aggregate functions
// over each group. Groups come back in first-seen order.

use std::cmp::Ordering;
use linked_hash_map::LinkedHashMap;

use crate::common::config::INVALID_PAGE_ID;
use crate::common::types::Rid;
use crate::query::executor::operators::{Executor, Predicate};
use crate::query::executor::result::{DataValue, QueryError, QueryResult, Tuple};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    CountStar,
    Count,
    Sum,
    Min,
    Max,
}

/// One aggregate to compute: the function and the child column it reads.
/// `CountStar` ignores the column.
#[derive(Debug, Clone, Copy)]
pub struct AggregateExpr {
    pub function: AggregateFunction,
    pub column: usize,
}

impl AggregateExpr {
    pub fn count_star() -> Self {
        Self {
            function: AggregateFunction::CountStar,
            column: 0,
        }
    }

    pub fn new(function: AggregateFunction, column: usize) -> Self {
        Self { function, column }
    }
}

/// Running state of one aggregate within one group. NULL inputs never
/// contribute, per SQL; COUNT(*) counts rows regardless.
#[derive(Debug, Clone)]
struct Accumulator {
    expr: AggregateExpr,
    count: i64,
    value: DataValue,
}

impl Accumulator {
    fn new(expr: AggregateExpr) -> Self {
        let value = match expr.function {
            AggregateFunction::CountStar | AggregateFunction::Count => DataValue::Integer(0),
            _ => DataValue::Null,
        };
        Self {
            expr,
            count: 0,
            value,
        }
    }

    fn update(&mut self, tuple: &Tuple) -> QueryResult<()> {
        if self.expr.function == AggregateFunction::CountStar {
            self.count += 1;
            self.value = DataValue::Integer(self.count);
            return Ok(());
        }

        let input = tuple
            .get(self.expr.column)
            .cloned()
            .unwrap_or(DataValue::Null);
        if input == DataValue::Null {
            return Ok(());
        }

        match self.expr.function {
            AggregateFunction::CountStar => {}
            AggregateFunction::Count => {
                self.count += 1;
                self.value = DataValue::Integer(self.count);
            }
            AggregateFunction::Sum => {
                self.value = match (self.value.clone(), input) {
                    (DataValue::Null, value) => value,
                    (DataValue::Integer(sum), DataValue::Integer(value)) => DataValue::Integer(
                        sum.checked_add(value).ok_or(QueryError::NumericOverflow)?,
                    ),
                    (DataValue::Float(sum), DataValue::Float(value)) => {
                        DataValue::Float(sum + value)
                    }
                    (DataValue::Integer(sum), DataValue::Float(value)) => {
                        DataValue::Float(sum as f64 + value)
                    }
                    (DataValue::Float(sum), DataValue::Integer(value)) => {
                        DataValue::Float(sum + value as f64)
                    }
                    (sum, value) => {
                        return Err(QueryError::TypeError(format!(
                            "cannot add {} to {}",
                            value, sum
                        )))
                    }
                };
            }
            AggregateFunction::Min | AggregateFunction::Max => {
                if self.value == DataValue::Null {
                    self.value = input;
                } else {
                    let ordering = input.partial_cmp(&self.value).ok_or_else(|| {
                        QueryError::TypeError(format!(
                            "cannot compare {} with {}",
                            input, self.value
                        ))
                    })?;
                    let replace = match self.expr.function {
                        AggregateFunction::Min => ordering == Ordering::Less,
                        _ => ordering == Ordering::Greater,
                    };
                    if replace {
                        self.value = input;
                    }
                }
            }
        }

        Ok(())
    }
}

pub struct AggregationExecutor {
    child: Box<dyn Executor>,
    group_by: Vec<usize>,
    aggregates: Vec<AggregateExpr>,
    having: Option<Predicate>,
    output: Vec<Tuple>,
    cursor: usize,
}

impl AggregationExecutor {
    pub fn new(
        child: Box<dyn Executor>,
        group_by: Vec<usize>,
        aggregates: Vec<AggregateExpr>,
        having: Option<Predicate>,
    ) -> Self {
        Self {
            child,
            group_by,
            aggregates,
            having,
            output: Vec::new(),
            cursor: 0,
        }
    }
}

impl Executor for AggregationExecutor {
    /// Drains the child and builds every group up front; aggregation cannot
    /// emit anything before its input is exhausted.
    fn init(&mut self) -> QueryResult<()> {
        self.child.init()?;

        let mut groups: LinkedHashMap<Vec<DataValue>, Vec<Accumulator>> = LinkedHashMap::new();
        while let Some((tuple, _rid)) = self.child.next()? {
            let key: Vec<DataValue> = self
                .group_by
                .iter()
                .map(|&column| tuple.get(column).cloned().unwrap_or(DataValue::Null))
                .collect();
            let accumulators = groups
                .entry(key)
                .or_insert_with(|| self.aggregates.iter().map(|&e| Accumulator::new(e)).collect());
            for accumulator in accumulators.iter_mut() {
                accumulator.update(&tuple)?;
            }
        }

        // With no GROUP BY, an empty input still produces one row of initial
        // values (COUNT = 0, the rest NULL)
        if groups.is_empty() && self.group_by.is_empty() {
            groups.insert(
                Vec::new(),
                self.aggregates.iter().map(|&e| Accumulator::new(e)).collect(),
            );
        }

        self.output = groups
            .into_iter()
            .map(|(mut key, accumulators)| {
                key.extend(accumulators.into_iter().map(|a| a.value));
                key
            })
            .collect();
        self.cursor = 0;
        Ok(())
    }

    /// Emits one group per call: the group-by values followed by the
    /// aggregate results. Aggregate rows have no storage identity.
    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        while self.cursor < self.output.len() {
            let tuple = self.output[self.cursor].clone();
            self.cursor += 1;

            if let Some(having) = &self.having {
                if !having(&tuple) {
                    continue;
                }
            }

            return Ok(Some((tuple, Rid::new(INVALID_PAGE_ID, 0))));
        }
        Ok(None)
    }

    fn close(&mut self) -> QueryResult<()> {
        self.output.clear();
        self.child.close()
    }
}
