use crate::access::scan::HeapScan;
use crate::access::schema::TupleDesc;
use crate::access::tuple::Tuple;
use crate::storage::buffer::{BufferPool, Permission};
use crate::storage::disk::PageStore;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, PageId, TableId};
use crate::transaction::TransactionId;
use log::debug;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// One table's tuples, stored in no particular order across the pages of
/// a backing file.
///
/// The heap file owns no page state: all page content flows through the
/// buffer pool under the calling transaction's locks, and every mutating
/// call reports the complete set of pages it dirtied so rollback and
/// flush logic can act on exactly those.
pub struct HeapFile {
    store: Arc<PageStore>,
    pool: BufferPool,
    /// Serializes the all-pages-full check against the append that
    /// follows it; without this two inserters can both grow the file.
    append_lock: Mutex<()>,
}

impl HeapFile {
    /// Opens (creating if absent) a heap file and registers it with the
    /// buffer pool.
    pub fn open(
        pool: BufferPool,
        path: impl AsRef<Path>,
        schema: Arc<TupleDesc>,
    ) -> StorageResult<Self> {
        let store = Arc::new(PageStore::open(path, schema)?);
        pool.register(store.clone());
        Ok(Self {
            store,
            pool,
            append_lock: Mutex::new(()),
        })
    }

    /// Stable table id for this file's canonical path.
    pub fn id(&self) -> TableId {
        self.store.table_id()
    }

    pub fn schema(&self) -> &Arc<TupleDesc> {
        self.store.schema()
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Whole pages currently in the file. Never cached: insert-driven
    /// growth changes it between calls.
    pub fn num_pages(&self) -> StorageResult<u32> {
        self.store.num_pages()
    }

    /// Reads a page image directly from disk, bypassing the cache. The
    /// buffer pool calls this on a miss; everyone else should fetch
    /// through the pool.
    pub fn read_page(&self, pid: PageId) -> StorageResult<HeapPage> {
        if pid.table != self.id() {
            return Err(StorageError::InvalidPage(pid));
        }
        self.store.read_page(pid.page_no)
    }

    /// Writes a page image directly to disk.
    pub fn write_page(&self, page: &HeapPage) -> StorageResult<()> {
        self.store.write_page(page)
    }

    /// Inserts a tuple into the first page with a free slot, growing the
    /// file by one page when every existing page is full.
    ///
    /// Returns the pages dirtied by the call: always exactly one.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> StorageResult<Vec<PageId>> {
        if tuple.desc() != self.schema() {
            return Err(StorageError::SchemaMismatch);
        }

        let mut next_page = 0u32;
        loop {
            let page_count = self.num_pages()?;

            // first-fit over the pages not yet tried
            while next_page < page_count {
                let pid = PageId::new(self.id(), next_page);
                next_page += 1;

                let frame = self.pool.get_page(tid, pid, Permission::ReadWrite)?;
                let mut page = frame.write();
                if page.free_slot_count() == 0 {
                    continue;
                }
                page.insert_tuple(tuple)?;
                page.mark_dirty(Some(tid));
                return Ok(vec![pid]);
            }

            // Every page is full. The check-then-append pair below is the
            // race window between concurrent inserters, so it runs under
            // the file's append section.
            let new_pid = {
                let _guard = self.append_lock.lock();
                if self.num_pages()? > page_count {
                    // someone else grew the file; rescan their pages first
                    continue;
                }
                self.store.append_empty_page()?
            };
            debug!("{}: table {} grew to page {}", tid, self.id(), new_pid.page_no);

            let frame = self.pool.get_page(tid, new_pid, Permission::ReadWrite)?;
            let mut page = frame.write();
            if page.free_slot_count() == 0 {
                // a fresh page only rejects tuples wider than a page
                return Err(StorageError::InsertFoundNoRoom);
            }
            page.insert_tuple(tuple)?;
            page.mark_dirty(Some(tid));
            return Ok(vec![new_pid]);
        }
    }

    /// Deletes the tuple from the slot named by its record id.
    ///
    /// Returns the pages dirtied by the call: always exactly one.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> StorageResult<Vec<PageId>> {
        let rid = tuple.record_id().ok_or(StorageError::NotAMember)?;
        if rid.page.table != self.id() {
            return Err(StorageError::NotAMember);
        }

        let frame = self.pool.get_page(tid, rid.page, Permission::ReadWrite)?;
        let mut page = frame.write();
        page.delete_tuple(tuple)?;
        page.mark_dirty(Some(tid));
        Ok(vec![rid.page])
    }

    /// A restartable cursor over every tuple in the file, in page-number
    /// then slot order. Call [`HeapScan::open`] before iterating.
    pub fn scan(&self, tid: TransactionId) -> HeapScan<'_> {
        HeapScan::new(self, tid)
    }
}
