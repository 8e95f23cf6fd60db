use std::sync::Arc;

use granite::{Tuple, TupleDesc};

use super::{Cursor, Executor};
use crate::errors::ExecutionError;

/// A finite, restartable executor over rows already in memory.
#[derive(Debug)]
pub struct TupleIterator {
    desc: Arc<TupleDesc>,
    rows: Vec<Tuple>,
    pos: usize,
    cursor: Cursor,
}

impl TupleIterator {
    /// `rows` are expected to conform to `desc`.
    pub fn new(desc: Arc<TupleDesc>, rows: Vec<Tuple>) -> Self {
        Self {
            desc,
            rows,
            pos: 0,
            cursor: Cursor::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Tuple] {
        &self.rows
    }
}

impl Executor for TupleIterator {
    fn schema(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    fn open(&mut self) -> Result<(), ExecutionError> {
        self.pos = 0;
        self.cursor.open();
        Ok(())
    }

    fn close(&mut self) {
        self.cursor.close();
    }

    fn rewind(&mut self) -> Result<(), ExecutionError> {
        self.pos = 0;
        self.cursor.reset();
        Ok(())
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>, ExecutionError> {
        let row = self.rows.get(self.pos).cloned();
        if row.is_some() {
            self.pos += 1;
        }
        Ok(row)
    }

    fn cursor(&mut self) -> &mut Cursor {
        &mut self.cursor
    }
}
