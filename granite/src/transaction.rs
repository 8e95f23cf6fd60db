//! Transaction identities.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::buffer_pool::BufferPool;
use crate::error::DbError;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Vends the next unused id.
    pub fn new() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// A running transaction. Consumed by [`Transaction::commit`] or
/// [`Transaction::abort`].
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
}

impl Transaction {
    pub fn start() -> Self {
        let id = TransactionId::new();
        debug!("[Transaction::start] {id}");
        Self { id }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Flushes the pages this transaction dirtied and releases its locks.
    pub fn commit(self, pool: &BufferPool) -> Result<(), DbError> {
        debug!("[Transaction::commit] {}", self.id);
        pool.transaction_complete(self.id, true)
    }

    /// Restores the pages this transaction dirtied and releases its locks.
    pub fn abort(self, pool: &BufferPool) -> Result<(), DbError> {
        debug!("[Transaction::abort] {}", self.id);
        pool.transaction_complete(self.id, false)
    }
}
