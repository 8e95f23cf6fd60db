//! The buffer pool caches heap pages in memory. Operators read and modify
//! storage only through it.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::catalog::Catalog;
use crate::config::StorageConfig;
use crate::error::{DbError, StorageError};
use crate::lock_manager::{LockError, LockManager, LockMode};
use crate::page::{HeapPage, HeapPageId};
use crate::transaction::TransactionId;
use crate::tuple::Tuple;

/// Intent declared when fetching a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

/// A page shared with the buffer pool. Holders must not keep it past the call
/// that fetched it.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// The page cache consumed by heap files and operators.
pub trait BufferManager: Send + Sync {
    /// Size of every page in bytes.
    fn page_size(&self) -> usize;

    /// Fetches a page on behalf of `tx`, taking a shared lock for
    /// [`Permissions::ReadOnly`] and an exclusive one for
    /// [`Permissions::ReadWrite`]. May block; a deadlock aborts `tx`.
    fn get_page(
        &self,
        tx: TransactionId,
        pid: HeapPageId,
        perm: Permissions,
    ) -> Result<PageRef, DbError>;

    /// Adds `tuple` to table `table_id` and marks the touched pages dirty.
    fn insert_tuple(&self, tx: TransactionId, table_id: u32, tuple: Tuple) -> Result<(), DbError>;

    /// Removes `tuple`, located by its record id, and marks the touched
    /// pages dirty.
    fn delete_tuple(&self, tx: TransactionId, tuple: &Tuple) -> Result<(), DbError>;
}

/// A single frame in the buffer pool.
#[derive(Debug)]
struct Frame {
    pid: HeapPageId,
    page: PageRef,
    recently_used: bool,
}

impl Frame {
    /// Someone outside the pool still holds the page.
    fn pinned(&self) -> bool {
        Arc::strong_count(&self.page) > 1
    }
}

#[derive(Debug)]
struct PoolState {
    frames: Vec<Option<Frame>>,
    page_table: HashMap<HeapPageId, usize>,
    free_list: Vec<usize>,
    clock_hand: usize,
}

impl PoolState {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: (0..capacity).map(|_| None).collect(),
            page_table: HashMap::with_capacity(capacity),
            free_list: (0..capacity).rev().collect(),
            clock_hand: 0,
        }
    }

    fn lookup(&mut self, pid: HeapPageId) -> Option<PageRef> {
        let idx = *self.page_table.get(&pid)?;
        let frame = self.frames[idx].as_mut()?;
        frame.recently_used = true;
        Some(frame.page.clone())
    }

    fn install(&mut self, pid: HeapPageId, page: PageRef) -> Result<(), StorageError> {
        let idx = match self.page_table.get(&pid) {
            Some(&idx) => idx,
            None => self.find_victim_frame()?,
        };
        self.frames[idx] = Some(Frame {
            pid,
            page,
            recently_used: true,
        });
        self.page_table.insert(pid, idx);
        Ok(())
    }

    fn remove(&mut self, pid: HeapPageId) {
        if let Some(idx) = self.page_table.remove(&pid) {
            self.frames[idx] = None;
            self.free_list.push(idx);
        }
    }

    /// Clock sweep over clean, unpinned frames. Dirty pages are never
    /// evicted.
    fn find_victim_frame(&mut self) -> Result<usize, StorageError> {
        if let Some(idx) = self.free_list.pop() {
            return Ok(idx);
        }

        let frame_count = self.frames.len();
        // Two full passes: the first can clear second-chance bits, the second
        // can pick a victim.
        for _ in 0..(frame_count * 2) {
            let idx = self.clock_hand;
            self.clock_hand = (self.clock_hand + 1) % frame_count;

            let Some(frame) = self.frames[idx].as_mut() else {
                return Ok(idx);
            };
            if frame.pinned() || frame.page.read().is_dirty() {
                continue;
            }
            if frame.recently_used {
                frame.recently_used = false;
                continue;
            }

            let pid = frame.pid;
            self.frames[idx] = None;
            self.page_table.remove(&pid);
            debug!("[BufferPool] evicted page {pid} from frame {idx}");
            return Ok(idx);
        }

        Err(StorageError::BufferFull(frame_count))
    }

    fn cached_pages(&self) -> Vec<(HeapPageId, PageRef)> {
        self.frames
            .iter()
            .flatten()
            .map(|frame| (frame.pid, frame.page.clone()))
            .collect()
    }
}

/// The buffer pool manager.
pub struct BufferPool {
    config: StorageConfig,
    catalog: Arc<Catalog>,
    lock_manager: LockManager,
    state: Mutex<PoolState>,
}

impl BufferPool {
    pub fn new(config: StorageConfig, catalog: Arc<Catalog>) -> Result<Self, StorageError> {
        config.validate()?;
        Ok(Self {
            config,
            catalog,
            lock_manager: LockManager::new(),
            state: Mutex::new(PoolState::with_capacity(config.pool_pages)),
        })
    }

    pub fn config(&self) -> StorageConfig {
        self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn num_cached_pages(&self) -> usize {
        self.state.lock().page_table.len()
    }

    pub fn holds_lock(&self, tx: TransactionId, pid: HeapPageId) -> bool {
        self.lock_manager.holds_lock(tx, pid)
    }

    /// Releases `tx`'s lock on one page before the transaction ends.
    pub fn release_page(&self, tx: TransactionId, pid: HeapPageId) {
        self.lock_manager.unlock(tx, pid);
    }

    /// Writes the page to disk if it is cached and dirty.
    pub fn flush_page(&self, pid: HeapPageId) -> Result<(), DbError> {
        let Some(page) = self.state.lock().lookup(pid) else {
            return Ok(());
        };
        self.write_back(pid, &page)
    }

    pub fn flush_all_pages(&self) -> Result<(), DbError> {
        let cached = self.state.lock().cached_pages();
        for (pid, page) in cached {
            self.write_back(pid, &page)?;
        }
        Ok(())
    }

    /// Writes every page dirtied by `tx`.
    pub fn flush_pages(&self, tx: TransactionId) -> Result<(), DbError> {
        for (pid, page) in self.pages_dirtied_by(tx) {
            self.write_back(pid, &page)?;
        }
        Ok(())
    }

    /// Drops a page from the cache without writing it.
    pub fn discard_page(&self, pid: HeapPageId) {
        self.state.lock().remove(pid);
    }

    /// Ends `tx`: on commit its dirty pages are written, on abort they are
    /// reloaded from disk. Either way its locks are released.
    pub fn transaction_complete(&self, tx: TransactionId, commit: bool) -> Result<(), DbError> {
        let result = if commit {
            self.flush_pages(tx)
        } else {
            self.restore_pages(tx)
        };
        self.lock_manager.unlock_all(tx);
        result
    }

    fn restore_pages(&self, tx: TransactionId) -> Result<(), DbError> {
        for (pid, page) in self.pages_dirtied_by(tx) {
            let file = self.catalog.heap_file(pid.table_id)?;
            let on_disk = file.read_page(pid)?;
            *page.write() = on_disk;
            debug!("[BufferPool] restored page {pid} for aborted {tx}");
        }
        Ok(())
    }

    fn pages_dirtied_by(&self, tx: TransactionId) -> Vec<(HeapPageId, PageRef)> {
        let cached = self.state.lock().cached_pages();
        cached
            .into_iter()
            .filter(|(_, page)| page.read().dirtied_by() == Some(tx))
            .collect()
    }

    fn write_back(&self, pid: HeapPageId, page: &PageRef) -> Result<(), DbError> {
        let mut page = page.write();
        if page.is_dirty() {
            let file = self.catalog.heap_file(pid.table_id)?;
            file.write_page(&page)?;
            page.mark_dirty(None);
        }
        Ok(())
    }

    fn mark_dirty(&self, tx: TransactionId, pages: Vec<PageRef>) -> Result<(), DbError> {
        for page in pages {
            let pid = {
                let mut page = page.write();
                page.mark_dirty(Some(tx));
                page.id()
            };
            self.state.lock().install(pid, page)?;
        }
        Ok(())
    }
}

impl BufferManager for BufferPool {
    fn page_size(&self) -> usize {
        self.config.page_size
    }

    fn get_page(
        &self,
        tx: TransactionId,
        pid: HeapPageId,
        perm: Permissions,
    ) -> Result<PageRef, DbError> {
        let mode = match perm {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        };
        self.lock_manager
            .lock(tx, pid, mode)
            .map_err(|err| match err {
                LockError::Deadlock => DbError::TransactionAborted(tx),
            })?;

        if let Some(page) = self.state.lock().lookup(pid) {
            return Ok(page);
        }

        let file = self.catalog.heap_file(pid.table_id)?;
        if file.page_size() != self.config.page_size {
            return Err(StorageError::Config(format!(
                "table {} uses {}-byte pages, buffer pool uses {}",
                pid.table_id,
                file.page_size(),
                self.config.page_size
            ))
            .into());
        }
        let page = Arc::new(RwLock::new(file.read_page(pid)?));

        let mut state = self.state.lock();
        // Another reader may have loaded it while we were on disk.
        if let Some(cached) = state.lookup(pid) {
            return Ok(cached);
        }
        state.install(pid, page.clone())?;
        Ok(page)
    }

    fn insert_tuple(&self, tx: TransactionId, table_id: u32, tuple: Tuple) -> Result<(), DbError> {
        let file = self.catalog.heap_file(table_id)?;
        let pages = file.insert_tuple(self, tx, tuple)?;
        self.mark_dirty(tx, pages)
    }

    fn delete_tuple(&self, tx: TransactionId, tuple: &Tuple) -> Result<(), DbError> {
        let record_id = tuple.record_id().ok_or(StorageError::MissingRecordId)?;
        let file = self.catalog.heap_file(record_id.page_id.table_id)?;
        let pages = file.delete_tuple(self, tx, tuple)?;
        self.mark_dirty(tx, pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap_file::HeapFile;
    use crate::transaction::Transaction;
    use crate::tuple::TupleDesc;
    use crate::types::{Field, Type};
    use tempfile::{tempdir, TempDir};

    // 64-byte pages of single int rows: 64 * 8 / 33 = 15 slots per page.
    const PAGE: usize = 64;

    fn setup(pool_pages: usize) -> (TempDir, Arc<BufferPool>, u32, Arc<TupleDesc>) {
        let dir = tempdir().unwrap();
        let desc = Arc::new(TupleDesc::with_names(&[Type::Int], &["v"]));
        let catalog = Arc::new(Catalog::new());
        let file = HeapFile::open(dir.path().join("t.dat"), desc.clone(), PAGE).unwrap();
        let table_id = catalog.add_table(file, "t");
        let config = StorageConfig::default()
            .with_page_size(PAGE)
            .with_pool_pages(pool_pages);
        let pool = Arc::new(BufferPool::new(config, catalog).unwrap());
        (dir, pool, table_id, desc)
    }

    fn int_row(desc: &Arc<TupleDesc>, v: i32) -> Tuple {
        Tuple::with_fields(desc.clone(), vec![Field::Int(v)]).unwrap()
    }

    #[test]
    fn insert_allocates_pages_and_commit_persists() {
        let (_dir, pool, table_id, desc) = setup(8);
        let tx = Transaction::start();
        for v in 0..20 {
            pool.insert_tuple(tx.id(), table_id, int_row(&desc, v)).unwrap();
        }
        let file = pool.catalog().heap_file(table_id).unwrap();
        assert_eq!(file.num_pages().unwrap(), 2);
        assert!(pool.holds_lock(tx.id(), HeapPageId::new(table_id, 1)));
        tx.commit(&pool).unwrap();

        let first = file.read_page(HeapPageId::new(table_id, 0)).unwrap();
        let second = file.read_page(HeapPageId::new(table_id, 1)).unwrap();
        assert_eq!(first.iter().count(), 15);
        assert_eq!(second.iter().count(), 5);
    }

    #[test]
    fn abort_restores_pages_from_disk() {
        let (_dir, pool, table_id, desc) = setup(8);
        let setup_tx = Transaction::start();
        pool.insert_tuple(setup_tx.id(), table_id, int_row(&desc, 1)).unwrap();
        setup_tx.commit(&pool).unwrap();

        let tx = Transaction::start();
        pool.insert_tuple(tx.id(), table_id, int_row(&desc, 2)).unwrap();
        let pid = HeapPageId::new(table_id, 0);
        assert_eq!(
            pool.get_page(tx.id(), pid, Permissions::ReadOnly)
                .unwrap()
                .read()
                .iter()
                .count(),
            2
        );
        let tx_id = tx.id();
        tx.abort(&pool).unwrap();
        assert!(!pool.holds_lock(tx_id, pid));

        let reader = Transaction::start();
        let page = pool.get_page(reader.id(), pid, Permissions::ReadOnly).unwrap();
        assert_eq!(page.read().iter().count(), 1);
        assert!(!page.read().is_dirty());
    }

    #[test]
    fn delete_frees_slot() {
        let (_dir, pool, table_id, desc) = setup(8);
        let tx = Transaction::start();
        pool.insert_tuple(tx.id(), table_id, int_row(&desc, 7)).unwrap();
        let pid = HeapPageId::new(table_id, 0);
        let stored = pool
            .get_page(tx.id(), pid, Permissions::ReadOnly)
            .unwrap()
            .read()
            .iter()
            .next()
            .cloned()
            .unwrap();
        pool.delete_tuple(tx.id(), &stored).unwrap();
        assert_eq!(
            pool.get_page(tx.id(), pid, Permissions::ReadOnly)
                .unwrap()
                .read()
                .iter()
                .count(),
            0
        );
        assert!(pool.delete_tuple(tx.id(), &int_row(&desc, 7)).is_err());
    }

    #[test]
    fn clean_pages_are_evicted() {
        let (_dir, pool, table_id, desc) = setup(2);
        let tx = Transaction::start();
        // Flush after every row so no page stays dirty.
        for v in 0..45 {
            pool.insert_tuple(tx.id(), table_id, int_row(&desc, v)).unwrap();
            pool.flush_pages(tx.id()).unwrap();
        }
        tx.commit(&pool).unwrap();
        assert!(pool.num_cached_pages() <= 2);

        let reader = Transaction::start();
        for page_no in 0..3 {
            let pid = HeapPageId::new(table_id, page_no);
            let page = pool.get_page(reader.id(), pid, Permissions::ReadOnly).unwrap();
            assert_eq!(page.read().iter().count(), 15);
        }
        assert_eq!(pool.num_cached_pages(), 2);
    }

    #[test]
    fn dirty_pages_are_never_evicted() {
        let (_dir, pool, table_id, desc) = setup(1);
        let tx = Transaction::start();
        for v in 0..15 {
            pool.insert_tuple(tx.id(), table_id, int_row(&desc, v)).unwrap();
        }
        // Page 0 is full and dirty; the next row needs a second frame.
        let err = pool
            .insert_tuple(tx.id(), table_id, int_row(&desc, 15))
            .unwrap_err();
        assert!(matches!(err, DbError::Storage(StorageError::BufferFull(1))));
    }

    #[test]
    fn discard_page_drops_uncommitted_change() {
        let (_dir, pool, table_id, desc) = setup(8);
        let setup_tx = Transaction::start();
        pool.insert_tuple(setup_tx.id(), table_id, int_row(&desc, 1)).unwrap();
        setup_tx.commit(&pool).unwrap();

        let tx = Transaction::start();
        pool.insert_tuple(tx.id(), table_id, int_row(&desc, 2)).unwrap();
        let pid = HeapPageId::new(table_id, 0);
        pool.discard_page(pid);
        assert_eq!(pool.num_cached_pages(), 0);

        let page = pool.get_page(tx.id(), pid, Permissions::ReadOnly).unwrap();
        assert_eq!(page.read().iter().count(), 1);
        assert!(!page.read().is_dirty());
        tx.commit(&pool).unwrap();
    }

    #[test]
    fn flush_all_pages_persists_and_cleans() {
        let (_dir, pool, table_id, desc) = setup(8);
        let tx = Transaction::start();
        for v in 0..20 {
            pool.insert_tuple(tx.id(), table_id, int_row(&desc, v)).unwrap();
        }
        let first = HeapPageId::new(table_id, 0);
        let second = HeapPageId::new(table_id, 1);
        let file = pool.catalog().heap_file(table_id).unwrap();
        assert_eq!(file.read_page(first).unwrap().iter().count(), 0);

        pool.flush_all_pages().unwrap();
        for pid in [first, second] {
            let page = pool.get_page(tx.id(), pid, Permissions::ReadOnly).unwrap();
            assert!(!page.read().is_dirty());
        }
        assert_eq!(file.read_page(first).unwrap().iter().count(), 15);
        assert_eq!(file.read_page(second).unwrap().iter().count(), 5);
        tx.commit(&pool).unwrap();
    }

    #[test]
    fn flush_page_writes_only_that_page() {
        let (_dir, pool, table_id, desc) = setup(8);
        let tx = Transaction::start();
        for v in 0..20 {
            pool.insert_tuple(tx.id(), table_id, int_row(&desc, v)).unwrap();
        }
        let file = pool.catalog().heap_file(table_id).unwrap();
        pool.flush_page(HeapPageId::new(table_id, 1)).unwrap();

        assert_eq!(file.read_page(HeapPageId::new(table_id, 0)).unwrap().iter().count(), 0);
        assert_eq!(file.read_page(HeapPageId::new(table_id, 1)).unwrap().iter().count(), 5);
        tx.commit(&pool).unwrap();
    }

    #[test]
    fn release_page_drops_the_lock() {
        let (_dir, pool, table_id, desc) = setup(8);
        let setup_tx = Transaction::start();
        pool.insert_tuple(setup_tx.id(), table_id, int_row(&desc, 1)).unwrap();
        setup_tx.commit(&pool).unwrap();

        let tx = Transaction::start();
        let pid = HeapPageId::new(table_id, 0);
        pool.get_page(tx.id(), pid, Permissions::ReadOnly).unwrap();
        assert!(pool.holds_lock(tx.id(), pid));
        pool.release_page(tx.id(), pid);
        assert!(!pool.holds_lock(tx.id(), pid));

        let writer = Transaction::start();
        pool.get_page(writer.id(), pid, Permissions::ReadWrite).unwrap();
        assert!(pool.holds_lock(writer.id(), pid));
    }

    #[test]
    fn page_size_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let desc = Arc::new(TupleDesc::from_types(&[Type::Int]));
        let catalog = Arc::new(Catalog::new());
        let file = HeapFile::open(dir.path().join("t.dat"), desc, 128).unwrap();
        std::fs::write(file.path(), vec![0u8; 128]).unwrap();
        let table_id = catalog.add_table(file, "t");
        let pool = BufferPool::new(StorageConfig::default().with_page_size(PAGE), catalog).unwrap();
        let err = pool
            .get_page(
                TransactionId::new(),
                HeapPageId::new(table_id, 0),
                Permissions::ReadOnly,
            )
            .unwrap_err();
        assert!(matches!(err, DbError::Storage(StorageError::Config(_))));
    }
}
