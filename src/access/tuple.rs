use crate::access::schema::TupleDesc;
use crate::access::value::Value;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use std::io::{Read, Write};
use std::sync::Arc;

/// Where a tuple currently resides: a page plus a slot index.
///
/// Valid only while the tuple occupies that exact slot; deleting the
/// tuple invalidates it. Orders by page first, then slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    pub page: PageId,
    pub slot: u16,
}

impl RecordId {
    pub fn new(page: PageId, slot: u16) -> Self {
        Self { page, slot }
    }
}

/// A row: typed field values matching some heap file's schema, plus the
/// record id of the slot it occupies (if stored).
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    desc: Arc<TupleDesc>,
    values: Vec<Value>,
    rid: Option<RecordId>,
}

impl Tuple {
    /// Builds a tuple, validating arity and field types against the schema.
    pub fn new(desc: Arc<TupleDesc>, values: Vec<Value>) -> StorageResult<Self> {
        if values.len() != desc.field_count() {
            return Err(StorageError::SchemaMismatch);
        }
        for (i, v) in values.iter().enumerate() {
            if v.data_type() != desc.field_type(i) {
                return Err(StorageError::SchemaMismatch);
            }
        }
        Ok(Self {
            desc,
            values,
            rid: None,
        })
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn value(&self, i: usize) -> &Value {
        &self.values[i]
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.rid
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.rid = rid;
    }

    /// Writes the tuple's fixed-width field encoding, `desc().byte_len()`
    /// bytes in total.
    pub fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        for v in &self.values {
            v.write_to(w)?;
        }
        Ok(())
    }

    /// Decodes one tuple under the given schema. The record id is not part
    /// of the encoding; callers that know the slot stamp it afterwards.
    pub fn read_from<R: Read>(r: &mut R, desc: &Arc<TupleDesc>) -> StorageResult<Self> {
        let mut values = Vec::with_capacity(desc.field_count());
        for i in 0..desc.field_count() {
            values.push(Value::read_from(r, desc.field_type(i))?);
        }
        Ok(Self {
            desc: desc.clone(),
            values,
            rid: None,
        })
    }
}
