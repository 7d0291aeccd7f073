use crate::access::schema::TupleDesc;
use crate::access::tuple::{RecordId, Tuple};
use crate::storage::disk::PAGE_SIZE;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use std::sync::Arc;

/// One fixed-size page of a heap file.
///
/// Layout: an occupancy bitmap (one bit per slot, LSB-first within each
/// byte, 1 = occupied) followed by `slot_count` fixed-width tuple slots,
/// then zero padding to `PAGE_SIZE`. The slot count is derived once from
/// the schema's tuple width:
///
/// ```text
/// slot_count = floor(PAGE_SIZE * 8 / (tuple_len * 8 + 1))
/// ```
///
/// The raw byte image is the source of truth; tuples are decoded from it
/// on demand and the image serializes back byte-for-byte.
pub struct HeapPage {
    pid: PageId,
    schema: Arc<TupleDesc>,
    data: Box<[u8; PAGE_SIZE]>,
    dirtier: Option<TransactionId>,
}

impl HeapPage {
    /// Hydrates a page from a disk image.
    pub fn new(pid: PageId, schema: Arc<TupleDesc>, data: Box<[u8; PAGE_SIZE]>) -> Self {
        Self {
            pid,
            schema,
            data,
            dirtier: None,
        }
    }

    /// An all-zero page: every slot free, every slot zero-filled. This is
    /// exactly what a freshly appended page contains.
    pub fn empty(pid: PageId, schema: Arc<TupleDesc>) -> Self {
        Self::new(pid, schema, Box::new([0u8; PAGE_SIZE]))
    }

    pub fn id(&self) -> PageId {
        self.pid
    }

    pub fn schema(&self) -> &Arc<TupleDesc> {
        &self.schema
    }

    /// Slots that fit a page for the given tuple width, counting one
    /// bitmap bit per slot.
    pub fn slots_for_tuple_len(tuple_len: usize) -> usize {
        (PAGE_SIZE * 8) / (tuple_len * 8 + 1)
    }

    pub fn slot_count(&self) -> usize {
        Self::slots_for_tuple_len(self.schema.byte_len())
    }

    fn bitmap_len(&self) -> usize {
        self.slot_count().div_ceil(8)
    }

    fn slot_offset(&self, slot: u16) -> usize {
        self.bitmap_len() + slot as usize * self.schema.byte_len()
    }

    pub fn is_slot_used(&self, slot: u16) -> bool {
        let i = slot as usize;
        i < self.slot_count() && (self.data[i / 8] >> (i % 8)) & 1 == 1
    }

    fn set_slot_used(&mut self, slot: u16, used: bool) {
        let i = slot as usize;
        if used {
            self.data[i / 8] |= 1 << (i % 8);
        } else {
            self.data[i / 8] &= !(1 << (i % 8));
        }
    }

    pub fn free_slot_count(&self) -> usize {
        (0..self.slot_count() as u16)
            .filter(|&s| !self.is_slot_used(s))
            .count()
    }

    /// Inserts into the first free slot, stamping the tuple's record id.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> StorageResult<()> {
        if tuple.desc() != &self.schema {
            return Err(StorageError::SchemaMismatch);
        }
        let slot = (0..self.slot_count() as u16)
            .find(|&s| !self.is_slot_used(s))
            .ok_or(StorageError::PageFull(self.pid))?;

        let offset = self.slot_offset(slot);
        let len = self.schema.byte_len();
        let mut target = &mut self.data[offset..offset + len];
        tuple.write_to(&mut target)?;

        self.set_slot_used(slot, true);
        tuple.set_record_id(Some(RecordId::new(self.pid, slot)));
        Ok(())
    }

    /// Clears the slot named by the tuple's record id.
    ///
    /// The record id carries no liveness guarantee, so membership is
    /// re-checked here: the id must target this page and an occupied slot.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> StorageResult<()> {
        let rid = tuple.record_id().ok_or(StorageError::NotAMember)?;
        if rid.page != self.pid || !self.is_slot_used(rid.slot) {
            return Err(StorageError::NotAMember);
        }

        let offset = self.slot_offset(rid.slot);
        let len = self.schema.byte_len();
        self.data[offset..offset + len].fill(0);
        self.set_slot_used(rid.slot, false);
        Ok(())
    }

    /// Decodes the tuple in the given slot.
    pub fn tuple_at(&self, slot: u16) -> StorageResult<Tuple> {
        if slot as usize >= self.slot_count() {
            return Err(StorageError::InvalidSlot {
                pid: self.pid,
                slot,
            });
        }
        if !self.is_slot_used(slot) {
            return Err(StorageError::EmptySlot {
                pid: self.pid,
                slot,
            });
        }

        let offset = self.slot_offset(slot);
        let len = self.schema.byte_len();
        let mut source = &self.data[offset..offset + len];
        let mut tuple = Tuple::read_from(&mut source, &self.schema)?;
        tuple.set_record_id(Some(RecordId::new(self.pid, slot)));
        Ok(tuple)
    }

    /// All occupied tuples in ascending slot order.
    pub fn tuples(&self) -> StorageResult<Vec<Tuple>> {
        (0..self.slot_count() as u16)
            .filter(|&s| self.is_slot_used(s))
            .map(|s| self.tuple_at(s))
            .collect()
    }

    /// The serialized page image.
    pub fn page_data(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn mark_dirty(&mut self, dirtier: Option<TransactionId>) {
        self.dirtier = dirtier;
    }

    pub fn dirtier(&self) -> Option<TransactionId> {
        self.dirtier
    }
}
