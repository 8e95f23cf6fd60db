//! Error types for the storage layer.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::page::{HeapPageId, RecordId};
use crate::transaction::TransactionId;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backing file of an open table could not be read.
    #[error("cannot read heap file {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("page {page_id} lies beyond the end of a {file_len}-byte file")]
    PageOutOfBounds { page_id: HeapPageId, file_len: u64 },

    #[error("data corruption: {0}")]
    Corrupted(String),

    #[error("buffer pool is full: all {0} frames are dirty or in use")]
    BufferFull(usize),

    #[error("no empty slot on page {0}")]
    PageFull(HeapPageId),

    #[error("no tuple at {0}")]
    TupleNotFound(RecordId),

    #[error("tuple has no record id")]
    MissingRecordId,

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StorageError {
    /// Integrity failures. The storage layer never retries or repairs these.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StorageError::Unreadable { .. }
                | StorageError::PageOutOfBounds { .. }
                | StorageError::Corrupted(_)
        )
    }
}

/// Errors surfaced through the buffer pool to the operators above it.
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("transaction {0} aborted")]
    TransactionAborted(TransactionId),

    #[error("no table with id {0}")]
    NoSuchTable(u32),
}

impl From<io::Error> for DbError {
    fn from(err: io::Error) -> Self {
        DbError::Storage(StorageError::Io(err))
    }
}
