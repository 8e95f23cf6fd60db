//! The aggregation operator.

use std::sync::Arc;

use granite::{TdItem, Tuple, TupleDesc, Type};
use log::debug;

use crate::aggregator::{AggregateOp, Aggregator, GroupBy, IntegerAggregator, StringAggregator};
use crate::errors::ExecutionError;
use crate::executor::{relabel, single_child, Cursor, Executor, Operator, TupleIterator};

/// Computes one aggregate over its child, optionally grouped by one field.
///
/// The child is drained on `open`; rewinding replays the materialized groups
/// without reading the child again. Output fields are the group-by field's
/// name followed by `op(field)`, e.g. `sum(t.price)`.
pub struct Aggregate {
    child: Box<dyn Executor>,
    field: usize,
    group_field: Option<usize>,
    op: AggregateOp,
    desc: Arc<TupleDesc>,
    results: Option<TupleIterator>,
    cursor: Cursor,
}

impl Aggregate {
    pub fn new(
        child: Box<dyn Executor>,
        field: usize,
        group_field: Option<usize>,
        op: AggregateOp,
    ) -> Result<Self, ExecutionError> {
        let desc = output_desc(child.schema(), field, group_field, op)?;
        Ok(Self {
            child,
            field,
            group_field,
            op,
            desc,
            results: None,
            cursor: Cursor::default(),
        })
    }

    pub fn aggregate_field(&self) -> usize {
        self.field
    }

    pub fn group_field(&self) -> Option<usize> {
        self.group_field
    }

    pub fn aggregate_op(&self) -> AggregateOp {
        self.op
    }

    fn aggregator(&self) -> Result<Box<dyn Aggregator>, ExecutionError> {
        let input = self.child.schema();
        let group_by = match self.group_field {
            Some(i) => {
                let field_type = input.field_type(i).ok_or(ExecutionError::NoSuchField(i))?;
                Some(GroupBy::new(i, field_type))
            }
            None => None,
        };
        match input.field_type(self.field) {
            Some(Type::Int) => Ok(Box::new(IntegerAggregator::new(
                group_by, self.field, self.op,
            ))),
            Some(Type::String) => Ok(Box::new(StringAggregator::new(
                group_by, self.field, self.op,
            )?)),
            None => Err(ExecutionError::NoSuchField(self.field)),
        }
    }
}

fn output_desc(
    input: &TupleDesc,
    field: usize,
    group_field: Option<usize>,
    op: AggregateOp,
) -> Result<Arc<TupleDesc>, ExecutionError> {
    let field_type = input
        .field_type(field)
        .ok_or(ExecutionError::NoSuchField(field))?;
    if field_type == Type::String && op != AggregateOp::Count {
        return Err(ExecutionError::IllegalAggregate(format!(
            "{op} over string field {field}; only count is supported"
        )));
    }

    let mut items = Vec::with_capacity(2);
    if let Some(g) = group_field {
        let item = input
            .items()
            .get(g)
            .cloned()
            .ok_or(ExecutionError::NoSuchField(g))?;
        items.push(item);
    }
    let source = match input.field_name(field) {
        Some(name) => name.to_string(),
        None => field.to_string(),
    };
    items.push(TdItem {
        field_type: Type::Int,
        field_name: Some(format!("{op}({source})")),
    });
    Ok(Arc::new(TupleDesc::new(items)))
}

impl Executor for Aggregate {
    fn schema(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    fn open(&mut self) -> Result<(), ExecutionError> {
        let mut aggregator = self.aggregator()?;
        self.child.open()?;
        let mut merged = 0usize;
        while self.child.has_next()? {
            aggregator.merge_tuple_into_group(&self.child.next()?)?;
            merged += 1;
        }
        let mut results = aggregator.iterator()?;
        debug!(
            "[Aggregate::open] {} over {merged} row(s) into {} group(s)",
            self.op,
            results.len()
        );
        results.open()?;
        self.results = Some(results);
        self.cursor.open();
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        self.results = None;
        self.cursor.close();
    }

    fn rewind(&mut self) -> Result<(), ExecutionError> {
        if let Some(results) = self.results.as_mut() {
            results.rewind()?;
        }
        self.cursor.reset();
        Ok(())
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>, ExecutionError> {
        let Some(results) = self.results.as_mut() else {
            return Ok(None);
        };
        if !results.has_next()? {
            return Ok(None);
        }
        let row = results.next()?;
        relabel(&row, &self.desc).map(Some)
    }

    fn cursor(&mut self) -> &mut Cursor {
        &mut self.cursor
    }
}

impl Operator for Aggregate {
    fn children(&self) -> Vec<&dyn Executor> {
        vec![self.child.as_ref()]
    }

    fn set_children(&mut self, children: Vec<Box<dyn Executor>>) -> Result<(), ExecutionError> {
        let child = single_child(children)?;
        self.desc = output_desc(child.schema(), self.field, self.group_field, self.op)?;
        self.child = child;
        Ok(())
    }
}
