//! Rows ([`Tuple`]) and their schemas ([`TupleDesc`]).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bytes::{Buf, BufMut};

use crate::error::StorageError;
use crate::page::RecordId;
use crate::types::{Field, Type};

#[derive(Debug, Clone)]
pub struct TdItem {
    pub field_type: Type,
    pub field_name: Option<String>,
}

/// Ordered field types with optional names. Two schemas are equal when their
/// type sequences are equal; names are cosmetic.
#[derive(Debug, Clone)]
pub struct TupleDesc {
    items: Vec<TdItem>,
}

impl TupleDesc {
    pub fn new(items: Vec<TdItem>) -> Self {
        Self { items }
    }

    /// Fields without names.
    pub fn from_types(types: &[Type]) -> Self {
        Self::new(
            types
                .iter()
                .map(|&field_type| TdItem {
                    field_type,
                    field_name: None,
                })
                .collect(),
        )
    }

    /// Pairs `types[i]` with `names[i]`; fields past the end of `names` are
    /// left unnamed.
    pub fn with_names(types: &[Type], names: &[&str]) -> Self {
        Self::new(
            types
                .iter()
                .enumerate()
                .map(|(i, &field_type)| TdItem {
                    field_type,
                    field_name: names.get(i).map(|n| n.to_string()),
                })
                .collect(),
        )
    }

    /// Concatenates the fields of `a` and `b`.
    pub fn merge(a: &TupleDesc, b: &TupleDesc) -> Self {
        Self::new(a.items.iter().chain(&b.items).cloned().collect())
    }

    pub fn num_fields(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[TdItem] {
        &self.items
    }

    pub fn field_type(&self, i: usize) -> Option<Type> {
        self.items.get(i).map(|item| item.field_type)
    }

    pub fn field_name(&self, i: usize) -> Option<&str> {
        self.items.get(i).and_then(|item| item.field_name.as_deref())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| item.field_name.as_deref() == Some(name))
    }

    pub fn types(&self) -> impl Iterator<Item = Type> + '_ {
        self.items.iter().map(|item| item.field_type)
    }

    /// On-disk width of a row with this schema.
    pub fn byte_size(&self) -> usize {
        self.types().map(|t| t.byte_len()).sum()
    }
}

impl PartialEq for TupleDesc {
    fn eq(&self, other: &Self) -> bool {
        self.types().eq(other.types())
    }
}

impl Eq for TupleDesc {}

impl Hash for TupleDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for t in self.types() {
            t.hash(state);
        }
    }
}

impl fmt::Display for TupleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(
                f,
                "{}({})",
                item.field_type,
                item.field_name.as_deref().unwrap_or("")
            )?;
        }
        Ok(())
    }
}

/// A row. Fields start unset and are filled in place; the schema is fixed at
/// construction.
#[derive(Debug, Clone)]
pub struct Tuple {
    desc: Arc<TupleDesc>,
    fields: Vec<Option<Field>>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(desc: Arc<TupleDesc>) -> Self {
        let fields = vec![None; desc.num_fields()];
        Self {
            desc,
            fields,
            record_id: None,
        }
    }

    pub fn with_fields(desc: Arc<TupleDesc>, fields: Vec<Field>) -> Result<Self, StorageError> {
        if fields.len() != desc.num_fields() {
            return Err(StorageError::SchemaMismatch(format!(
                "{} values for a {}-field schema",
                fields.len(),
                desc.num_fields()
            )));
        }
        let mut tuple = Self::new(desc);
        for (i, field) in fields.into_iter().enumerate() {
            tuple.set_field(i, field)?;
        }
        Ok(tuple)
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i).and_then(Option::as_ref)
    }

    pub fn fields(&self) -> impl Iterator<Item = Option<&Field>> {
        self.fields.iter().map(Option::as_ref)
    }

    pub fn set_field(&mut self, i: usize, field: Field) -> Result<(), StorageError> {
        match self.desc.field_type(i) {
            Some(t) if t == field.field_type() => {
                self.fields[i] = Some(field);
                Ok(())
            }
            Some(t) => Err(StorageError::SchemaMismatch(format!(
                "field {i} is {t}, got {}",
                field.field_type()
            ))),
            None => Err(StorageError::SchemaMismatch(format!(
                "field {i} out of range for {} fields",
                self.fields.len()
            ))),
        }
    }

    /// True once every field has a value.
    pub fn is_complete(&self) -> bool {
        self.fields.iter().all(Option::is_some)
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    pub fn serialize(&self, buf: &mut impl BufMut) -> Result<(), StorageError> {
        for (i, field) in self.fields.iter().enumerate() {
            let field = field
                .as_ref()
                .ok_or_else(|| StorageError::SchemaMismatch(format!("field {i} is unset")))?;
            field.serialize(buf);
        }
        Ok(())
    }

    pub fn parse(desc: &Arc<TupleDesc>, buf: &mut impl Buf) -> Result<Self, StorageError> {
        let fields = desc
            .types()
            .map(|t| t.parse(buf).map(Some))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            desc: Arc::clone(desc),
            fields,
            record_id: None,
        })
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.desc == other.desc && self.fields == other.fields
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str("\t")?;
            }
            match field {
                Some(field) => write!(f, "{field}")?,
                None => f.write_str("null")?,
            }
        }
        Ok(())
    }
}
