//! The pull-based operator protocol and the leaf and mutation operators.
//!
//! Every operator is driven through [`Executor`]: `open`, then `has_next` /
//! `next` until exhausted, optionally `rewind`, and finally `close`.
//! Operators only implement [`Executor::fetch_next`]; the one-row lookahead
//! lives in a [`Cursor`] they own.

use std::sync::Arc;

use granite::{TdItem, Tuple, TupleDesc};

use crate::errors::ExecutionError;

mod dml;
mod scan;
mod tuple_iterator;

pub use dml::{Delete, Insert};
pub use scan::SeqScan;
pub use tuple_iterator::TupleIterator;

/// Open flag plus one row of lookahead.
#[derive(Debug, Default)]
pub struct Cursor {
    open: bool,
    peeked: Option<Tuple>,
}

impl Cursor {
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) {
        self.open = true;
        self.peeked = None;
    }

    pub fn close(&mut self) {
        self.open = false;
        self.peeked = None;
    }

    /// Drops the lookahead row; used on rewind.
    pub fn reset(&mut self) {
        self.peeked = None;
    }

    fn has_peeked(&self) -> bool {
        self.peeked.is_some()
    }

    fn put(&mut self, tuple: Option<Tuple>) {
        self.peeked = tuple;
    }

    fn take(&mut self) -> Option<Tuple> {
        self.peeked.take()
    }
}

pub trait Executor {
    fn schema(&self) -> &Arc<TupleDesc>;

    fn open(&mut self) -> Result<(), ExecutionError>;

    fn close(&mut self);

    /// Restarts the stream from its first row.
    fn rewind(&mut self) -> Result<(), ExecutionError>;

    /// The next row, or `None` at end of stream. Only called while open.
    fn fetch_next(&mut self) -> Result<Option<Tuple>, ExecutionError>;

    fn cursor(&mut self) -> &mut Cursor;

    fn has_next(&mut self) -> Result<bool, ExecutionError> {
        if !self.cursor().is_open() {
            return Err(ExecutionError::NotOpen);
        }
        if !self.cursor().has_peeked() {
            let next = self.fetch_next()?;
            self.cursor().put(next);
        }
        Ok(self.cursor().has_peeked())
    }

    fn next(&mut self) -> Result<Tuple, ExecutionError> {
        if !self.has_next()? {
            return Err(ExecutionError::NoSuchElement);
        }
        self.cursor().take().ok_or(ExecutionError::NoSuchElement)
    }
}

/// An executor with rewritable inputs.
pub trait Operator: Executor {
    fn children(&self) -> Vec<&dyn Executor>;

    fn set_children(&mut self, children: Vec<Box<dyn Executor>>) -> Result<(), ExecutionError>;
}

pub(crate) fn single_child(
    children: Vec<Box<dyn Executor>>,
) -> Result<Box<dyn Executor>, ExecutionError> {
    let [child]: [Box<dyn Executor>; 1] =
        children
            .try_into()
            .map_err(|rest: Vec<Box<dyn Executor>>| ExecutionError::ChildCount {
                expected: 1,
                found: rest.len(),
            })?;
    Ok(child)
}

/// Copies the fields and record id of `tuple` into a row of `desc`, which
/// must have the same types.
pub(crate) fn relabel(tuple: &Tuple, desc: &Arc<TupleDesc>) -> Result<Tuple, ExecutionError> {
    let mut out = Tuple::new(desc.clone());
    for (i, field) in tuple.fields().enumerate() {
        if let Some(field) = field {
            out.set_field(i, field.clone())?;
        }
    }
    out.set_record_id(tuple.record_id());
    Ok(out)
}

/// `desc` with every named field renamed to `prefix.name`.
pub(crate) fn prefixed(desc: &TupleDesc, prefix: &str) -> TupleDesc {
    TupleDesc::new(
        desc.items()
            .iter()
            .map(|item| TdItem {
                field_type: item.field_type,
                field_name: item
                    .field_name
                    .as_ref()
                    .map(|name| format!("{prefix}.{name}")),
            })
            .collect(),
    )
}

/// Opens `exec` and collects every row it produces.
pub fn drain(exec: &mut dyn Executor) -> Result<Vec<Tuple>, ExecutionError> {
    exec.open()?;
    let mut rows = Vec::new();
    while exec.has_next()? {
        rows.push(exec.next()?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use granite::{Field, Type};

    fn ints(values: &[i32]) -> TupleIterator {
        let desc = Arc::new(TupleDesc::with_names(&[Type::Int], &["v"]));
        let rows = values
            .iter()
            .map(|&v| Tuple::with_fields(desc.clone(), vec![Field::Int(v)]).unwrap())
            .collect();
        TupleIterator::new(desc, rows)
    }

    #[test]
    fn unopened_executor_is_not_open() {
        let mut exec = ints(&[1]);
        assert!(matches!(exec.has_next(), Err(ExecutionError::NotOpen)));
        assert!(matches!(exec.next(), Err(ExecutionError::NotOpen)));
    }

    #[test]
    fn next_past_end_is_no_such_element() {
        let mut exec = ints(&[1]);
        exec.open().unwrap();
        assert_eq!(exec.next().unwrap().field(0), Some(&Field::Int(1)));
        assert!(!exec.has_next().unwrap());
        assert!(matches!(exec.next(), Err(ExecutionError::NoSuchElement)));
    }

    #[test]
    fn has_next_does_not_consume() {
        let mut exec = ints(&[4, 5]);
        exec.open().unwrap();
        assert!(exec.has_next().unwrap());
        assert!(exec.has_next().unwrap());
        assert_eq!(exec.next().unwrap().field(0), Some(&Field::Int(4)));
        assert_eq!(exec.next().unwrap().field(0), Some(&Field::Int(5)));
    }

    #[test]
    fn rewind_drops_lookahead() {
        let mut exec = ints(&[1, 2, 3]);
        exec.open().unwrap();
        exec.next().unwrap();
        assert!(exec.has_next().unwrap());
        exec.rewind().unwrap();
        assert_eq!(exec.next().unwrap().field(0), Some(&Field::Int(1)));
    }

    #[test]
    fn close_stops_production() {
        let mut exec = ints(&[1, 2]);
        exec.open().unwrap();
        exec.close();
        assert!(matches!(exec.has_next(), Err(ExecutionError::NotOpen)));
    }

    #[test]
    fn single_child_counts() {
        let one: Vec<Box<dyn Executor>> = vec![Box::new(ints(&[]))];
        assert!(single_child(one).is_ok());

        let two: Vec<Box<dyn Executor>> = vec![Box::new(ints(&[])), Box::new(ints(&[]))];
        assert!(matches!(
            single_child(two),
            Err(ExecutionError::ChildCount {
                expected: 1,
                found: 2
            })
        ));
        assert!(matches!(
            single_child(Vec::new()),
            Err(ExecutionError::ChildCount { found: 0, .. })
        ));
    }

    #[test]
    fn prefixed_renames_named_fields_only() {
        let desc = TupleDesc::new(vec![
            TdItem {
                field_type: Type::Int,
                field_name: Some("id".into()),
            },
            TdItem {
                field_type: Type::String,
                field_name: None,
            },
        ]);
        let renamed = prefixed(&desc, "t");
        assert_eq!(renamed.field_name(0), Some("t.id"));
        assert_eq!(renamed.field_name(1), None);
        assert_eq!(renamed, desc);
    }
}
