use granite::{DbError, StorageError, Type};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Raised by the storage layer. Transaction aborts arrive here unchanged.
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("table {table_id} stores ({expected}) but the child produces ({found})")]
    SchemaMismatch {
        table_id: u32,
        expected: String,
        found: String,
    },

    #[error("illegal aggregate: {0}")]
    IllegalAggregate(String),

    #[error("unknown aggregate operator {0:?}")]
    UnknownAggregate(String),

    #[error("no field at position {0}")]
    NoSuchField(usize),

    #[error("field {index} is {found}, expected {expected}")]
    TypeMismatch {
        index: usize,
        expected: Type,
        found: Type,
    },

    #[error("aggregate result {0} does not fit in an int")]
    IntegerOverflow(i64),

    #[error("no more rows")]
    NoSuchElement,

    #[error("operator is not open")]
    NotOpen,

    #[error("expected {expected} child operator(s), got {found}")]
    ChildCount { expected: usize, found: usize },
}

impl From<StorageError> for ExecutionError {
    fn from(err: StorageError) -> Self {
        ExecutionError::Db(DbError::Storage(err))
    }
}

impl ExecutionError {
    pub fn is_transaction_aborted(&self) -> bool {
        matches!(self, ExecutionError::Db(DbError::TransactionAborted(_)))
    }
}
