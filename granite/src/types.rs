//! Field types and values, and their fixed-width on-disk encoding.

use std::fmt;

use bytes::{Buf, BufMut};

use crate::error::StorageError;

/// Maximum number of bytes stored for a string field.
pub const STRING_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    String,
}

impl Type {
    /// Number of bytes a field of this type occupies on disk.
    pub fn byte_len(&self) -> usize {
        match self {
            Type::Int => 4,
            Type::String => STRING_LEN + 4,
        }
    }

    /// Decodes one field of this type from the front of `buf`.
    pub fn parse(&self, buf: &mut impl Buf) -> Result<Field, StorageError> {
        if buf.remaining() < self.byte_len() {
            return Err(StorageError::Corrupted(format!(
                "{self} field needs {} bytes, {} left",
                self.byte_len(),
                buf.remaining()
            )));
        }
        match self {
            Type::Int => Ok(Field::Int(buf.get_i32())),
            Type::String => {
                let len = buf.get_i32();
                let len = usize::try_from(len)
                    .ok()
                    .filter(|&len| len <= STRING_LEN)
                    .ok_or_else(|| {
                        StorageError::Corrupted(format!("string length {len} out of range"))
                    })?;
                let mut bytes = vec![0u8; STRING_LEN];
                buf.copy_to_slice(&mut bytes);
                bytes.truncate(len);
                String::from_utf8(bytes)
                    .map(Field::String)
                    .map_err(|e| StorageError::Corrupted(format!("string field: {e}")))
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::String => f.write_str("string"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Int(i32),
    String(String),
}

impl Field {
    pub fn field_type(&self) -> Type {
        match self {
            Field::Int(_) => Type::Int,
            Field::String(_) => Type::String,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Field::Int(v) => Some(*v),
            Field::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::String(s) => Some(s),
            Field::Int(_) => None,
        }
    }

    /// Writes exactly `self.field_type().byte_len()` bytes. Strings longer
    /// than [`STRING_LEN`] bytes are cut at the last char boundary that fits.
    pub fn serialize(&self, buf: &mut impl BufMut) {
        match self {
            Field::Int(v) => buf.put_i32(*v),
            Field::String(s) => {
                let bytes = truncated(s, STRING_LEN);
                buf.put_i32(bytes.len() as i32);
                buf.put_slice(bytes);
                buf.put_bytes(0, STRING_LEN - bytes.len());
            }
        }
    }
}

fn truncated(s: &str, max: usize) -> &[u8] {
    let mut end = s.len().min(max);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s.as_bytes()[..end]
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{v}"),
            Field::String(s) => f.write_str(s),
        }
    }
}

impl From<i32> for Field {
    fn from(v: i32) -> Self {
        Field::Int(v)
    }
}

impl From<&str> for Field {
    fn from(s: &str) -> Self {
        Field::String(s.to_string())
    }
}

impl From<String> for Field {
    fn from(s: String) -> Self {
        Field::String(s)
    }
}
