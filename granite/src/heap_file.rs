//! A table stored as a flat file of equal-size heap pages.
//!
//! Page `k` occupies bytes `[k * page_size, (k + 1) * page_size)`. Trailing
//! bytes that do not make up a whole page are never surfaced as a page.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error};

use crate::buffer_pool::{BufferManager, PageRef, Permissions};
use crate::error::{DbError, StorageError};
use crate::failpoint::{self, FailPoint};
use crate::page::{HeapPage, HeapPageId};
use crate::transaction::TransactionId;
use crate::tuple::{Tuple, TupleDesc};

#[derive(Debug)]
pub struct HeapFile {
    path: PathBuf,
    desc: Arc<TupleDesc>,
    table_id: u32,
    page_size: usize,
}

impl HeapFile {
    /// Opens the table file at `path`, creating it and its parent directories
    /// if they don't exist.
    pub fn open<P: AsRef<Path>>(
        path: P,
        desc: Arc<TupleDesc>,
        page_size: usize,
    ) -> Result<Self, StorageError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            create_dir_all(parent)?;
        }
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path_ref)?;

        let path = path_ref.canonicalize()?;
        let table_id = table_id_for(&path);
        debug!("[HeapFile::open] {path:?} as table {table_id}");
        Ok(Self {
            path,
            desc,
            table_id,
            page_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stable identifier derived from the absolute path of the file.
    pub fn table_id(&self) -> u32 {
        self.table_id
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of whole pages in the file, recomputed on every call.
    pub fn num_pages(&self) -> Result<u32, StorageError> {
        let len = std::fs::metadata(&self.path)
            .map_err(|e| self.unreadable(e))?
            .len();
        Ok((len / self.page_size as u64) as u32)
    }

    /// Reads and decodes one page. A page extending past the end of the file
    /// and any failure to read the file are integrity errors.
    pub fn read_page(&self, pid: HeapPageId) -> Result<HeapPage, StorageError> {
        if pid.table_id != self.table_id {
            return Err(StorageError::Corrupted(format!(
                "page {pid} requested from table {}",
                self.table_id
            )));
        }
        failpoint::maybe_fail(FailPoint::ReadPage).map_err(|e| self.unreadable(e))?;

        let mut file = File::open(&self.path).map_err(|e| self.unreadable(e))?;
        let file_len = file.metadata().map_err(|e| self.unreadable(e))?.len();
        let offset = pid.page_no as u64 * self.page_size as u64;
        if offset + self.page_size as u64 > file_len {
            error!(
                "[HeapFile::read_page] page {pid} at offset {offset} exceeds {file_len}-byte file {:?}",
                self.path
            );
            return Err(StorageError::PageOutOfBounds {
                page_id: pid,
                file_len,
            });
        }

        let mut data = vec![0u8; self.page_size];
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.read_exact(&mut data))
            .map_err(|e| self.unreadable(e))?;
        debug!("[HeapFile::read_page] read page {pid}");

        HeapPage::new(pid, &data, self.desc.clone()).map_err(|e| {
            error!("[HeapFile::read_page] cannot decode page {pid}: {e}");
            e
        })
    }

    pub fn write_page(&self, page: &HeapPage) -> Result<(), StorageError> {
        let pid = page.id();
        let data = page.page_data()?;
        self.write_at(pid.page_no, &data)?;
        debug!("[HeapFile::write_page] wrote page {pid}");
        Ok(())
    }

    /// Adds one all-empty page at the end of the file.
    fn append_empty_page(&self) -> Result<HeapPageId, StorageError> {
        let page_no = self.num_pages()?;
        self.write_at(page_no, &HeapPage::empty_page_data(self.page_size))?;
        let pid = HeapPageId::new(self.table_id, page_no);
        debug!("[HeapFile::append_empty_page] allocated page {pid}");
        Ok(pid)
    }

    fn write_at(&self, page_no: u32, data: &[u8]) -> Result<(), StorageError> {
        failpoint::maybe_fail(FailPoint::WritePage)?;
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(page_no as u64 * self.page_size as u64))?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }

    fn unreadable(&self, source: io::Error) -> StorageError {
        error!("[HeapFile] cannot read {:?}: {source}", self.path);
        StorageError::Unreadable {
            path: self.path.clone(),
            source,
        }
    }

    /// Places `tuple` in the first page with a free slot, appending a page
    /// when every existing one is full. Pages are fetched through `pool` with
    /// read-write intent. Returns the pages modified.
    pub fn insert_tuple(
        &self,
        pool: &dyn BufferManager,
        tx: TransactionId,
        tuple: Tuple,
    ) -> Result<Vec<PageRef>, DbError> {
        if **tuple.desc() != *self.desc {
            return Err(StorageError::SchemaMismatch(format!(
                "table {} stores ({}), tuple is ({})",
                self.table_id,
                self.desc,
                tuple.desc()
            ))
            .into());
        }

        for page_no in 0..self.num_pages()? {
            let pid = HeapPageId::new(self.table_id, page_no);
            let page = pool.get_page(tx, pid, Permissions::ReadWrite)?;
            let mut guard = page.write();
            if guard.num_empty_slots() > 0 {
                guard.insert_tuple(tuple)?;
                drop(guard);
                return Ok(vec![page]);
            }
        }

        let pid = self.append_empty_page()?;
        let page = pool.get_page(tx, pid, Permissions::ReadWrite)?;
        page.write().insert_tuple(tuple)?;
        Ok(vec![page])
    }

    /// Frees the slot named by the tuple's record id. Returns the pages
    /// modified.
    pub fn delete_tuple(
        &self,
        pool: &dyn BufferManager,
        tx: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageRef>, DbError> {
        let record_id = tuple.record_id().ok_or(StorageError::MissingRecordId)?;
        if record_id.page_id.table_id != self.table_id {
            return Err(StorageError::TupleNotFound(record_id).into());
        }
        let page = pool.get_page(tx, record_id.page_id, Permissions::ReadWrite)?;
        page.write().delete_tuple(tuple)?;
        Ok(vec![page])
    }

    /// A cursor over every occupied row, fetching pages through `pool`.
    pub fn iter(
        self: &Arc<Self>,
        pool: Arc<dyn BufferManager>,
        tx: TransactionId,
    ) -> HeapFileIterator {
        HeapFileIterator::new(self.clone(), pool, tx)
    }
}

fn table_id_for(path: &Path) -> u32 {
    crc32fast::hash(path.to_string_lossy().as_bytes())
}

/// Forward-only, restartable cursor over the rows of a heap file.
///
/// Pages are visited in order `0..num_pages` and each page yields its rows in
/// slot order. Only the rows of the current page are held; the page itself is
/// released as soon as its rows are copied out.
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    pool: Arc<dyn BufferManager>,
    tx: TransactionId,
    /// Next page to fetch, or `None` while closed.
    next_page: Option<u32>,
    rows: std::vec::IntoIter<Tuple>,
    peeked: Option<Tuple>,
}

impl HeapFileIterator {
    pub fn new(file: Arc<HeapFile>, pool: Arc<dyn BufferManager>, tx: TransactionId) -> Self {
        Self {
            file,
            pool,
            tx,
            next_page: None,
            rows: Vec::new().into_iter(),
            peeked: None,
        }
    }

    pub fn open(&mut self) {
        self.next_page = Some(0);
        self.rows = Vec::new().into_iter();
        self.peeked = None;
    }

    pub fn is_open(&self) -> bool {
        self.next_page.is_some()
    }

    pub fn has_next(&mut self) -> Result<bool, DbError> {
        if self.peeked.is_none() {
            self.peeked = self.read_next()?;
        }
        Ok(self.peeked.is_some())
    }

    /// The next row, or `None` once every page has been visited or the
    /// cursor is closed.
    pub fn next(&mut self) -> Result<Option<Tuple>, DbError> {
        match self.peeked.take() {
            Some(tuple) => Ok(Some(tuple)),
            None => self.read_next(),
        }
    }

    pub fn rewind(&mut self) {
        self.close();
        self.open();
    }

    pub fn close(&mut self) {
        self.next_page = None;
        self.rows = Vec::new().into_iter();
        self.peeked = None;
    }

    fn read_next(&mut self) -> Result<Option<Tuple>, DbError> {
        loop {
            if let Some(tuple) = self.rows.next() {
                return Ok(Some(tuple));
            }
            let Some(page_no) = self.next_page else {
                return Ok(None);
            };
            if page_no >= self.file.num_pages()? {
                return Ok(None);
            }

            let pid = HeapPageId::new(self.file.table_id(), page_no);
            let page = self.pool.get_page(self.tx, pid, Permissions::ReadOnly)?;
            self.rows = page.read().iter().cloned().collect::<Vec<_>>().into_iter();
            self.next_page = Some(page_no + 1);
        }
    }
}
