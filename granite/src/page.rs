//! The on-disk layout of a heap page.
//!
//! A page of `P` bytes holding rows `W` bytes wide has
//! `floor(P * 8 / (W * 8 + 1))` slots. It starts with a bitmap of
//! `ceil(slots / 8)` bytes (slot `i` is bit `i % 8` of byte `i / 8`, least
//! significant bit first), followed by the row slots and zero padding.

use std::fmt;
use std::sync::Arc;

use bytes::{Buf, BufMut};

use crate::error::StorageError;
use crate::transaction::TransactionId;
use crate::tuple::{Tuple, TupleDesc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapPageId {
    pub table_id: u32,
    pub page_no: u32,
}

impl HeapPageId {
    pub fn new(table_id: u32, page_no: u32) -> Self {
        Self { table_id, page_no }
    }
}

impl fmt::Display for HeapPageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table_id, self.page_no)
    }
}

/// Locates a row: the page it lives on and its slot within that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: HeapPageId,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page_id: HeapPageId, slot: usize) -> Self {
        Self { page_id, slot }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.page_id, self.slot)
    }
}

pub fn slots_per_page(page_size: usize, row_size: usize) -> usize {
    (page_size * 8) / (row_size * 8 + 1)
}

pub fn header_len(num_slots: usize) -> usize {
    (num_slots + 7) / 8
}

#[derive(Debug, Clone)]
pub struct HeapPage {
    id: HeapPageId,
    desc: Arc<TupleDesc>,
    page_size: usize,
    slots: Vec<Option<Tuple>>,
    dirtied_by: Option<TransactionId>,
}

impl HeapPage {
    /// Decodes a page. `data` must be exactly one page long.
    pub fn new(id: HeapPageId, data: &[u8], desc: Arc<TupleDesc>) -> Result<Self, StorageError> {
        let page_size = data.len();
        let row_size = desc.byte_size();
        let num_slots = slots_per_page(page_size, row_size);
        if num_slots == 0 {
            return Err(StorageError::Corrupted(format!(
                "page {id} of {page_size} bytes cannot hold a {row_size}-byte row"
            )));
        }

        let (header, mut body) = data.split_at(header_len(num_slots));
        let mut slots = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if header[slot / 8] & (1 << (slot % 8)) != 0 {
                let mut tuple = Tuple::parse(&desc, &mut body)?;
                tuple.set_record_id(Some(RecordId::new(id, slot)));
                slots.push(Some(tuple));
            } else {
                body.advance(row_size);
                slots.push(None);
            }
        }

        Ok(Self {
            id,
            desc,
            page_size,
            slots,
            dirtied_by: None,
        })
    }

    /// Bytes of a page with every slot free.
    pub fn empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0; page_size]
    }

    pub fn id(&self) -> HeapPageId {
        self.id
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn num_empty_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Some(_)))
    }

    /// Encodes the page back into exactly `page_size` bytes.
    pub fn page_data(&self) -> Result<Vec<u8>, StorageError> {
        let row_size = self.desc.byte_size();
        let mut header = vec![0u8; header_len(self.slots.len())];
        for (slot, _) in self.slots.iter().enumerate().filter(|(_, s)| s.is_some()) {
            header[slot / 8] |= 1 << (slot % 8);
        }

        let mut buf = Vec::with_capacity(self.page_size);
        buf.put_slice(&header);
        for slot in &self.slots {
            match slot {
                Some(tuple) => tuple.serialize(&mut buf)?,
                None => buf.put_bytes(0, row_size),
            }
        }
        buf.put_bytes(0, self.page_size - buf.len());
        Ok(buf)
    }

    /// Stores `tuple` in the first free slot and stamps it with its new
    /// record id.
    pub fn insert_tuple(&mut self, mut tuple: Tuple) -> Result<RecordId, StorageError> {
        if **tuple.desc() != *self.desc {
            return Err(StorageError::SchemaMismatch(format!(
                "page {} stores ({}), tuple is ({})",
                self.id,
                self.desc,
                tuple.desc()
            )));
        }
        if !tuple.is_complete() {
            return Err(StorageError::SchemaMismatch(format!(
                "tuple inserted into page {} has unset fields",
                self.id
            )));
        }
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(StorageError::PageFull(self.id))?;
        let record_id = RecordId::new(self.id, slot);
        tuple.set_record_id(Some(record_id));
        self.slots[slot] = Some(tuple);
        Ok(record_id)
    }

    /// Frees the slot named by the tuple's record id.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<(), StorageError> {
        let record_id = tuple.record_id().ok_or(StorageError::MissingRecordId)?;
        if record_id.page_id != self.id || !self.is_slot_used(record_id.slot) {
            return Err(StorageError::TupleNotFound(record_id));
        }
        self.slots[record_id.slot] = None;
        Ok(())
    }

    /// Occupied rows in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.slots.iter().flatten()
    }

    pub fn mark_dirty(&mut self, tx: Option<TransactionId>) {
        self.dirtied_by = tx;
    }

    /// The transaction that last modified this page, if it has unflushed
    /// changes.
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirtied_by
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtied_by.is_some()
    }
}
