//! Incremental grouping aggregation.
//!
//! An aggregator consumes rows one at a time through
//! [`Aggregator::merge_tuple_into_group`] and materializes one result row per
//! group, in the order groups were first seen.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use granite::{Field, Tuple, TupleDesc, Type};
use indexmap::map::Entry;
use indexmap::IndexMap;

use crate::errors::ExecutionError;
use crate::executor::TupleIterator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl FromStr for AggregateOp {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "min" => Ok(AggregateOp::Min),
            "max" => Ok(AggregateOp::Max),
            "sum" => Ok(AggregateOp::Sum),
            "avg" => Ok(AggregateOp::Avg),
            "count" => Ok(AggregateOp::Count),
            _ => Err(ExecutionError::UnknownAggregate(s.to_string())),
        }
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Count => "count",
        };
        f.write_str(name)
    }
}

/// Position and type of the group-by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupBy {
    pub field: usize,
    pub field_type: Type,
}

impl GroupBy {
    pub fn new(field: usize, field_type: Type) -> Self {
        Self { field, field_type }
    }
}

pub trait Aggregator {
    /// Folds one row into its group.
    fn merge_tuple_into_group(&mut self, tuple: &Tuple) -> Result<(), ExecutionError>;

    /// Materializes every group. The returned iterator is unopened.
    fn iterator(&self) -> Result<TupleIterator, ExecutionError>;

    /// `(group type, int)` when grouped, `(int)` otherwise.
    fn result_schema(&self) -> &Arc<TupleDesc>;
}

fn result_desc(group_by: Option<GroupBy>) -> Arc<TupleDesc> {
    let types = match group_by {
        Some(group) => vec![group.field_type, Type::Int],
        None => vec![Type::Int],
    };
    Arc::new(TupleDesc::from_types(&types))
}

/// The row's group key: `Some(None)` when ungrouped, `None` when the row's
/// group-by field does not have the configured type.
fn group_key(group_by: Option<GroupBy>, tuple: &Tuple) -> Option<Option<Field>> {
    let Some(group) = group_by else {
        return Some(None);
    };
    if tuple.desc().field_type(group.field) != Some(group.field_type) {
        return None;
    }
    tuple.field(group.field).cloned().map(Some)
}

fn result_row(
    desc: &Arc<TupleDesc>,
    key: &Option<Field>,
    value: i64,
) -> Result<Tuple, ExecutionError> {
    let value = i32::try_from(value).map_err(|_| ExecutionError::IntegerOverflow(value))?;
    let mut fields = Vec::with_capacity(2);
    fields.extend(key.clone());
    fields.push(Field::Int(value));
    Ok(Tuple::with_fields(desc.clone(), fields)?)
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    value: i64,
    count: i64,
}

/// Aggregates an int field with any [`AggregateOp`].
#[derive(Debug)]
pub struct IntegerAggregator {
    group_by: Option<GroupBy>,
    field: usize,
    op: AggregateOp,
    desc: Arc<TupleDesc>,
    groups: IndexMap<Option<Field>, Accumulator>,
}

impl IntegerAggregator {
    pub fn new(group_by: Option<GroupBy>, field: usize, op: AggregateOp) -> Self {
        Self {
            group_by,
            field,
            op,
            desc: result_desc(group_by),
            groups: IndexMap::new(),
        }
    }

    fn value_of(&self, tuple: &Tuple) -> Result<i64, ExecutionError> {
        match tuple.field(self.field) {
            Some(Field::Int(v)) => Ok(i64::from(*v)),
            Some(other) => Err(ExecutionError::TypeMismatch {
                index: self.field,
                expected: Type::Int,
                found: other.field_type(),
            }),
            None => Err(ExecutionError::NoSuchField(self.field)),
        }
    }

    fn finish(&self, acc: &Accumulator) -> i64 {
        match self.op {
            AggregateOp::Min | AggregateOp::Max | AggregateOp::Sum => acc.value,
            AggregateOp::Avg => acc.value / acc.count,
            AggregateOp::Count => acc.count,
        }
    }
}

impl Aggregator for IntegerAggregator {
    fn merge_tuple_into_group(&mut self, tuple: &Tuple) -> Result<(), ExecutionError> {
        let Some(key) = group_key(self.group_by, tuple) else {
            return Ok(());
        };
        let value = self.value_of(tuple)?;

        match self.groups.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(Accumulator { value, count: 1 });
            }
            Entry::Occupied(mut entry) => {
                let acc = entry.get_mut();
                acc.value = match self.op {
                    AggregateOp::Min => acc.value.min(value),
                    AggregateOp::Max => acc.value.max(value),
                    AggregateOp::Sum | AggregateOp::Avg => {
                        let current = acc.value;
                        current.checked_add(value).ok_or_else(|| {
                            ExecutionError::IntegerOverflow(current.saturating_add(value))
                        })?
                    }
                    AggregateOp::Count => acc.value,
                };
                acc.count += 1;
            }
        }
        Ok(())
    }

    fn iterator(&self) -> Result<TupleIterator, ExecutionError> {
        let mut rows = self
            .groups
            .iter()
            .map(|(key, acc)| result_row(&self.desc, key, self.finish(acc)))
            .collect::<Result<Vec<_>, _>>()?;
        if rows.is_empty()
            && self.group_by.is_none()
            && matches!(self.op, AggregateOp::Count | AggregateOp::Sum)
        {
            rows.push(result_row(&self.desc, &None, 0)?);
        }
        Ok(TupleIterator::new(self.desc.clone(), rows))
    }

    fn result_schema(&self) -> &Arc<TupleDesc> {
        &self.desc
    }
}

/// Counts a string field. COUNT is the only operator it accepts.
#[derive(Debug)]
pub struct StringAggregator {
    group_by: Option<GroupBy>,
    field: usize,
    desc: Arc<TupleDesc>,
    counts: IndexMap<Option<Field>, i64>,
}

impl StringAggregator {
    pub fn new(
        group_by: Option<GroupBy>,
        field: usize,
        op: AggregateOp,
    ) -> Result<Self, ExecutionError> {
        if op != AggregateOp::Count {
            return Err(ExecutionError::IllegalAggregate(format!(
                "{op} over a string field; only count is supported"
            )));
        }
        Ok(Self {
            group_by,
            field,
            desc: result_desc(group_by),
            counts: IndexMap::new(),
        })
    }
}

impl Aggregator for StringAggregator {
    fn merge_tuple_into_group(&mut self, tuple: &Tuple) -> Result<(), ExecutionError> {
        let Some(key) = group_key(self.group_by, tuple) else {
            return Ok(());
        };
        if tuple.field(self.field).is_none() {
            return Err(ExecutionError::NoSuchField(self.field));
        }
        *self.counts.entry(key).or_insert(0) += 1;
        Ok(())
    }

    fn iterator(&self) -> Result<TupleIterator, ExecutionError> {
        let mut rows = self
            .counts
            .iter()
            .map(|(key, &count)| result_row(&self.desc, key, count))
            .collect::<Result<Vec<_>, _>>()?;
        if rows.is_empty() && self.group_by.is_none() {
            rows.push(result_row(&self.desc, &None, 0)?);
        }
        Ok(TupleIterator::new(self.desc.clone(), rows))
    }

    fn result_schema(&self) -> &Arc<TupleDesc> {
        &self.desc
    }
}
