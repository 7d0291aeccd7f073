//! Page-spanning sequential scan.

use crate::access::heap::HeapFile;
use crate::access::tuple::Tuple;
use crate::storage::buffer::Permission;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;

/// Restartable cursor over every tuple in a heap file, in page-number
/// ascending then slot ascending order.
///
/// The cursor holds at most one page's worth of decoded tuples at a time
/// and re-resolves page content through the buffer pool on every page
/// step, so memory stays bounded by the page size and scan reads take
/// part in the same locking discipline as writes. Closing drops only the
/// in-memory position; page locks belong to the transaction.
pub struct HeapScan<'f> {
    file: &'f HeapFile,
    tid: TransactionId,
    page_no: u32,
    /// Remaining tuples of the current page; `None` while unopened or
    /// closed.
    tuples: Option<std::vec::IntoIter<Tuple>>,
}

impl<'f> HeapScan<'f> {
    pub(crate) fn new(file: &'f HeapFile, tid: TransactionId) -> Self {
        Self {
            file,
            tid,
            page_no: 0,
            tuples: None,
        }
    }

    fn page_tuples(&self, page_no: u32) -> StorageResult<std::vec::IntoIter<Tuple>> {
        if page_no >= self.file.num_pages()? {
            // an empty file has nothing to position on
            return Ok(Vec::new().into_iter());
        }
        let pid = PageId::new(self.file.id(), page_no);
        let frame = self.file.pool().get_page(self.tid, pid, Permission::ReadOnly)?;
        let tuples = frame.read().tuples()?;
        Ok(tuples.into_iter())
    }

    /// Positions the cursor at page 0. Exhaustion is discovered lazily by
    /// [`has_next`], so opening over an empty page (or an empty file)
    /// succeeds.
    ///
    /// [`has_next`]: HeapScan::has_next
    pub fn open(&mut self) -> StorageResult<()> {
        self.page_no = 0;
        self.tuples = Some(self.page_tuples(0)?);
        Ok(())
    }

    /// Whether another tuple remains, advancing past exhausted pages as a
    /// side effect. `false` on an unopened cursor.
    pub fn has_next(&mut self) -> StorageResult<bool> {
        if self.tuples.is_none() {
            return Ok(false);
        }
        loop {
            if let Some(tuples) = &self.tuples {
                if !tuples.as_slice().is_empty() {
                    return Ok(true);
                }
            }
            if self.page_no + 1 >= self.file.num_pages()? {
                return Ok(false);
            }
            self.page_no += 1;
            self.tuples = Some(self.page_tuples(self.page_no)?);
        }
    }

    /// The next tuple in scan order; an exhausted-scan error when
    /// [`has_next`] would be `false`.
    ///
    /// [`has_next`]: HeapScan::has_next
    pub fn next_tuple(&mut self) -> StorageResult<Tuple> {
        if !self.has_next()? {
            return Err(StorageError::ScanExhausted);
        }
        // has_next just positioned us on a non-empty page
        Ok(self.tuples.as_mut().unwrap().next().unwrap())
    }

    /// Returns to the start of the table as it is now, not a snapshot of
    /// open time: mutations since the last open are visible.
    pub fn rewind(&mut self) -> StorageResult<()> {
        self.close();
        self.open()
    }

    /// Releases the cursor's position. Does not release any page locks.
    pub fn close(&mut self) {
        self.tuples = None;
    }
}

impl Iterator for HeapScan<'_> {
    type Item = StorageResult<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => Some(self.next_tuple()),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
