//! Page-oriented heap storage: fixed-size pages of fixed-width rows, a
//! shared buffer pool with page-level two-phase locking, and the catalog
//! that maps table ids to their files.

pub mod buffer_pool;

pub mod catalog;

pub mod config;

pub mod error;

pub mod failpoint;

pub mod heap_file;

pub mod lock_manager;

pub mod page;

pub mod transaction;

pub mod tuple;

pub mod types;

pub use buffer_pool::{BufferManager, BufferPool, PageRef, Permissions};
pub use catalog::Catalog;
pub use config::StorageConfig;
pub use error::{DbError, StorageError};
pub use heap_file::{HeapFile, HeapFileIterator};
pub use page::{HeapPage, HeapPageId, RecordId};
pub use transaction::{Transaction, TransactionId};
pub use tuple::{TdItem, Tuple, TupleDesc};
pub use types::{Field, Type};
