//! Insert and Delete. Each drains its child through the buffer pool on the
//! first fetch and answers with a single row holding the number of rows
//! affected.

use std::sync::Arc;

use granite::{
    BufferManager, Catalog, DbError, Field, StorageError, TransactionId, Tuple, TupleDesc, Type,
};
use log::{debug, warn};

use super::{single_child, Cursor, Executor, Operator};
use crate::errors::ExecutionError;

fn summary_desc() -> Arc<TupleDesc> {
    Arc::new(TupleDesc::with_names(&[Type::Int], &["number"]))
}

/// Pushes every row of `child` through `apply`. A row whose push fails with a
/// plain I/O error is logged and left out of the count; any other error ends
/// the batch.
fn push_rows(
    what: &str,
    child: &mut dyn Executor,
    mut apply: impl FnMut(Tuple) -> Result<(), DbError>,
) -> Result<i32, ExecutionError> {
    let mut count: i64 = 0;
    while child.has_next()? {
        let row = child.next()?;
        match apply(row) {
            Ok(()) => count += 1,
            Err(DbError::Storage(StorageError::Io(err))) => {
                warn!("[{what}] row skipped after I/O failure: {err}");
            }
            Err(err) => return Err(err.into()),
        }
    }
    i32::try_from(count).map_err(|_| ExecutionError::IntegerOverflow(count))
}

fn summary(desc: &Arc<TupleDesc>, count: i32) -> Result<Tuple, ExecutionError> {
    Ok(Tuple::with_fields(desc.clone(), vec![Field::Int(count)])?)
}

/// Inserts the rows of its child into one table.
pub struct Insert {
    pool: Arc<dyn BufferManager>,
    tx: TransactionId,
    table_id: u32,
    table_desc: Arc<TupleDesc>,
    child: Box<dyn Executor>,
    desc: Arc<TupleDesc>,
    answered: bool,
    cursor: Cursor,
}

impl Insert {
    /// Fails with [`ExecutionError::SchemaMismatch`] if the child's rows do
    /// not have the table's schema. The child is not touched.
    pub fn new(
        pool: Arc<dyn BufferManager>,
        catalog: &Catalog,
        tx: TransactionId,
        child: Box<dyn Executor>,
        table_id: u32,
    ) -> Result<Self, ExecutionError> {
        let table_desc = catalog.schema_of(table_id)?;
        check_schema(table_id, &table_desc, child.as_ref())?;
        Ok(Self {
            pool,
            tx,
            table_id,
            table_desc,
            child,
            desc: summary_desc(),
            answered: false,
            cursor: Cursor::default(),
        })
    }

    pub fn table_id(&self) -> u32 {
        self.table_id
    }
}

fn check_schema(
    table_id: u32,
    table_desc: &TupleDesc,
    child: &dyn Executor,
) -> Result<(), ExecutionError> {
    if **child.schema() != *table_desc {
        return Err(ExecutionError::SchemaMismatch {
            table_id,
            expected: table_desc.to_string(),
            found: child.schema().to_string(),
        });
    }
    Ok(())
}

impl Executor for Insert {
    fn schema(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    fn open(&mut self) -> Result<(), ExecutionError> {
        self.child.open()?;
        self.answered = false;
        self.cursor.open();
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        self.cursor.close();
    }

    fn rewind(&mut self) -> Result<(), ExecutionError> {
        self.child.rewind()?;
        self.cursor.reset();
        Ok(())
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>, ExecutionError> {
        if self.answered {
            return Ok(None);
        }
        // A failed batch is not retried by a later fetch.
        self.answered = true;
        let pool = &self.pool;
        let (tx, table_id) = (self.tx, self.table_id);
        let count = push_rows("Insert", self.child.as_mut(), |row| {
            pool.insert_tuple(tx, table_id, row)
        })?;
        debug!("[Insert] {count} row(s) into table {table_id} for {tx}");
        summary(&self.desc, count).map(Some)
    }

    fn cursor(&mut self) -> &mut Cursor {
        &mut self.cursor
    }
}

impl Operator for Insert {
    fn children(&self) -> Vec<&dyn Executor> {
        vec![self.child.as_ref()]
    }

    fn set_children(&mut self, children: Vec<Box<dyn Executor>>) -> Result<(), ExecutionError> {
        let child = single_child(children)?;
        check_schema(self.table_id, &self.table_desc, child.as_ref())?;
        self.child = child;
        Ok(())
    }
}

/// Deletes the rows its child produces, located by their record ids.
pub struct Delete {
    pool: Arc<dyn BufferManager>,
    tx: TransactionId,
    child: Box<dyn Executor>,
    desc: Arc<TupleDesc>,
    answered: bool,
    cursor: Cursor,
}

impl Delete {
    pub fn new(pool: Arc<dyn BufferManager>, tx: TransactionId, child: Box<dyn Executor>) -> Self {
        Self {
            pool,
            tx,
            child,
            desc: summary_desc(),
            answered: false,
            cursor: Cursor::default(),
        }
    }
}

impl Executor for Delete {
    fn schema(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    fn open(&mut self) -> Result<(), ExecutionError> {
        self.child.open()?;
        self.answered = false;
        self.cursor.open();
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        self.cursor.close();
    }

    fn rewind(&mut self) -> Result<(), ExecutionError> {
        self.child.rewind()?;
        self.cursor.reset();
        Ok(())
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>, ExecutionError> {
        if self.answered {
            return Ok(None);
        }
        self.answered = true;
        let pool = &self.pool;
        let tx = self.tx;
        let count = push_rows("Delete", self.child.as_mut(), |row| {
            pool.delete_tuple(tx, &row)
        })?;
        debug!("[Delete] {count} row(s) for {tx}");
        summary(&self.desc, count).map(Some)
    }

    fn cursor(&mut self) -> &mut Cursor {
        &mut self.cursor
    }
}

impl Operator for Delete {
    fn children(&self) -> Vec<&dyn Executor> {
        vec![self.child.as_ref()]
    }

    fn set_children(&mut self, children: Vec<Box<dyn Executor>>) -> Result<(), ExecutionError> {
        self.child = single_child(children)?;
        Ok(())
    }
}
