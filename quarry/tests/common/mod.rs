#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use granite::{
    BufferManager, BufferPool, Catalog, Field, HeapFile, StorageConfig, Transaction, Tuple,
    TupleDesc, Type,
};
use quarry::executor::drain;
use quarry::{Cursor, ExecutionError, Executor, SeqScan, TupleIterator};
use tempfile::{tempdir, TempDir};

/// A catalog and buffer pool over tables in a temporary directory.
pub struct TestDb {
    _dir: TempDir,
    pub catalog: Arc<Catalog>,
    pub pool: Arc<BufferPool>,
}

impl TestDb {
    pub fn new() -> Self {
        Self::with_page_size(4096)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        let dir = tempdir().unwrap();
        let catalog = Arc::new(Catalog::new());
        let config = StorageConfig::default().with_page_size(page_size);
        let pool = Arc::new(BufferPool::new(config, catalog.clone()).unwrap());
        Self {
            _dir: dir,
            catalog,
            pool,
        }
    }

    pub fn create_table(&self, name: &str, types: &[Type], names: &[&str]) -> u32 {
        let desc = Arc::new(TupleDesc::with_names(types, names));
        let path = self._dir.path().join(format!("{name}.dat"));
        let file = HeapFile::open(path, desc, self.pool.config().page_size).unwrap();
        self.catalog.add_table(file, name)
    }

    pub fn shared_pool(&self) -> Arc<dyn BufferManager> {
        self.pool.clone()
    }

    /// Inserts `rows` in one committed transaction.
    pub fn load(&self, table_id: u32, rows: Vec<Vec<Field>>) {
        let desc = self.catalog.schema_of(table_id).unwrap();
        let tx = Transaction::start();
        for fields in rows {
            let row = Tuple::with_fields(desc.clone(), fields).unwrap();
            self.pool.insert_tuple(tx.id(), table_id, row).unwrap();
        }
        tx.commit(&self.pool).unwrap();
    }

    /// Every row of the table, read in a fresh committed transaction.
    pub fn scan(&self, table_id: u32) -> Vec<Vec<Field>> {
        let tx = Transaction::start();
        let mut scan =
            SeqScan::new(self.shared_pool(), &self.catalog, tx.id(), table_id, "t").unwrap();
        let rows = drain(&mut scan).unwrap();
        scan.close();
        tx.commit(&self.pool).unwrap();
        values(&rows)
    }
}

pub fn values(rows: &[Tuple]) -> Vec<Vec<Field>> {
    rows.iter()
        .map(|row| row.fields().map(|f| f.cloned().unwrap()).collect())
        .collect()
}

pub fn ints(values: &[i32]) -> Vec<Vec<Field>> {
    values.iter().map(|&v| vec![Field::Int(v)]).collect()
}

pub fn tuple_iter(desc: &Arc<TupleDesc>, rows: Vec<Vec<Field>>) -> TupleIterator {
    let rows = rows
        .into_iter()
        .map(|fields| Tuple::with_fields(desc.clone(), fields).unwrap())
        .collect();
    TupleIterator::new(desc.clone(), rows)
}

/// Wraps another executor and records whether a row was ever requested.
pub struct RecordingChild {
    inner: TupleIterator,
    pub touched: Arc<AtomicBool>,
}

impl RecordingChild {
    pub fn new(inner: TupleIterator) -> Self {
        Self {
            inner,
            touched: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Executor for RecordingChild {
    fn schema(&self) -> &Arc<TupleDesc> {
        self.inner.schema()
    }

    fn open(&mut self) -> Result<(), ExecutionError> {
        self.inner.open()
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn rewind(&mut self) -> Result<(), ExecutionError> {
        self.inner.rewind()
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>, ExecutionError> {
        self.touched.store(true, Ordering::SeqCst);
        self.inner.fetch_next()
    }

    fn cursor(&mut self) -> &mut Cursor {
        self.inner.cursor()
    }
}
