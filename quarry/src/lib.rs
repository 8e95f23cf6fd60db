//! Pull-based query operators over granite heap storage: sequential scan,
//! transactional insert and delete, and grouping aggregation.

pub mod aggregate_executor;

pub mod aggregator;

pub mod errors;

pub mod executor;

pub use aggregate_executor::Aggregate;
pub use aggregator::{AggregateOp, Aggregator, GroupBy, IntegerAggregator, StringAggregator};
pub use errors::ExecutionError;
pub use executor::{Cursor, Delete, Executor, Insert, Operator, SeqScan, TupleIterator};
