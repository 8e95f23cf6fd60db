use std::sync::Arc;

use granite::{BufferManager, Catalog, HeapFileIterator, TransactionId, Tuple, TupleDesc};
use log::debug;

use super::{prefixed, relabel, Cursor, Executor};
use crate::errors::ExecutionError;

/// Sequential scan over every row of one table, in page-then-slot order.
/// Output fields are named `alias.field`.
pub struct SeqScan {
    tx: TransactionId,
    table_id: u32,
    alias: String,
    desc: Arc<TupleDesc>,
    rows: HeapFileIterator,
    cursor: Cursor,
}

impl SeqScan {
    pub fn new(
        pool: Arc<dyn BufferManager>,
        catalog: &Catalog,
        tx: TransactionId,
        table_id: u32,
        alias: &str,
    ) -> Result<Self, ExecutionError> {
        let file = catalog.heap_file(table_id)?;
        let desc = Arc::new(prefixed(file.desc(), alias));
        let rows = file.iter(pool, tx);
        Ok(Self {
            tx,
            table_id,
            alias: alias.to_string(),
            desc,
            rows,
            cursor: Cursor::default(),
        })
    }

    pub fn table_id(&self) -> u32 {
        self.table_id
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl Executor for SeqScan {
    fn schema(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    fn open(&mut self) -> Result<(), ExecutionError> {
        debug!(
            "[SeqScan::open] table {} as {} for {}",
            self.table_id, self.alias, self.tx
        );
        self.rows.open();
        self.cursor.open();
        Ok(())
    }

    fn close(&mut self) {
        self.rows.close();
        self.cursor.close();
    }

    fn rewind(&mut self) -> Result<(), ExecutionError> {
        self.rows.rewind();
        self.cursor.reset();
        Ok(())
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>, ExecutionError> {
        match self.rows.next()? {
            Some(row) => Ok(Some(relabel(&row, &self.desc)?)),
            None => Ok(None),
        }
    }

    fn cursor(&mut self) -> &mut Cursor {
        &mut self.cursor
    }
}
