// Result and error types for query execution.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::index::hash::HashTableError;
use crate::storage::buffer::BufferPoolError;
use crate::storage::page::PageError;
use crate::storage::table::HeapError;
use crate::transaction::concurrency::TransactionAbort;

/// Possible data types for values in a tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
}

impl Eq for DataValue {}

impl Hash for DataValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Discriminant first, so values of different types never collide
        match self {
            DataValue::Null => {
                0.hash(state);
            }
            DataValue::Integer(i) => {
                1.hash(state);
                i.hash(state);
            }
            DataValue::Float(f) => {
                2.hash(state);
                f.to_bits().hash(state);
            }
            DataValue::Text(s) => {
                3.hash(state);
                s.hash(state);
            }
            DataValue::Boolean(b) => {
                4.hash(state);
                b.hash(state);
            }
        }
    }
}

impl PartialOrd for DataValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            // Null is incomparable with anything
            (DataValue::Null, _) | (_, DataValue::Null) => None,

            (DataValue::Integer(a), DataValue::Integer(b)) => a.partial_cmp(b),
            (DataValue::Float(a), DataValue::Float(b)) => a.partial_cmp(b),

            // Integer and float can be compared
            (DataValue::Integer(a), DataValue::Float(b)) => (*a as f64).partial_cmp(b),
            (DataValue::Float(a), DataValue::Integer(b)) => a.partial_cmp(&(*b as f64)),

            (DataValue::Text(a), DataValue::Text(b)) => a.partial_cmp(b),
            (DataValue::Boolean(a), DataValue::Boolean(b)) => a.partial_cmp(b),

            // Other cross-type comparisons are undefined
            _ => None,
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => write!(f, "NULL"),
            DataValue::Integer(i) => write!(f, "{}", i),
            DataValue::Float(fl) => write!(f, "{}", fl),
            DataValue::Text(s) => write!(f, "\"{}\"", s),
            DataValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// A row as the executors see it
pub type Tuple = Vec<DataValue>;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Buffer pool error: {0}")]
    Storage(#[from] BufferPoolError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Table heap error: {0}")]
    Heap(#[from] HeapError),

    #[error("Index error: {0}")]
    Index(#[from] HashTableError),

    #[error("{0}")]
    Aborted(#[from] TransactionAbort),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Numeric overflow")]
    NumericOverflow,
}

pub type QueryResult<T> = Result<T, QueryError>;

/// Encode a tuple for storage in a heap page
pub fn encode_tuple(tuple: &Tuple) -> QueryResult<Vec<u8>> {
    bincode::serialize(tuple).map_err(|e| QueryError::Serialization(e.to_string()))
}

/// Decode a tuple read back from a heap page
pub fn decode_tuple(bytes: &[u8]) -> QueryResult<Tuple> {
    bincode::deserialize(bytes).map_err(|e| QueryError::Serialization(e.to_string()))
}
