pub mod lru;
pub mod replacer;

use crate::concurrency::lock::{LockManager, LockMode};
use crate::storage::disk::PageStore;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, PageId, TableId};
use crate::transaction::TransactionId;
use dashmap::DashMap;
use log::{debug, trace};
use lru::LruReplacer;
use parking_lot::{Mutex, RwLock};
use replacer::Replacer;
use std::collections::HashMap;
use std::sync::Arc;

/// Default number of resident pages.
pub const DEFAULT_CAPACITY: usize = 50;

/// A cached page. Repeated fetches of a resident page hand out the same
/// shared object, so every holder sees the same bytes.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Access level requested when fetching a page. Maps one-to-one onto the
/// lock manager's modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    fn lock_mode(self) -> LockMode {
        match self {
            Permission::ReadOnly => LockMode::Shared,
            Permission::ReadWrite => LockMode::Exclusive,
        }
    }
}

/// Page cache mediating all page access under per-transaction locking.
///
/// Keyed by (table, page number); owns the in-memory page buffers. Heap
/// files hold no page state of their own and go through [`get_page`]
/// for every read and write.
///
/// [`get_page`]: BufferPool::get_page
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    capacity: usize,
    frames: RwLock<HashMap<PageId, PageRef>>,
    replacer: Mutex<Box<dyn Replacer>>,
    stores: DashMap<TableId, Arc<PageStore>>,
    locks: LockManager,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self::with_replacer(Box::new(LruReplacer::new()), capacity)
    }

    pub fn with_replacer(replacer: Box<dyn Replacer>, capacity: usize) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                capacity,
                frames: RwLock::new(HashMap::with_capacity(capacity)),
                replacer: Mutex::new(replacer),
                stores: DashMap::new(),
                locks: LockManager::new(),
            }),
        }
    }

    /// Binds a table's store so cache misses on its pages can be loaded.
    pub fn register(&self, store: Arc<PageStore>) {
        self.inner.stores.insert(store.table_id(), store);
    }

    fn store(&self, table: TableId) -> StorageResult<Arc<PageStore>> {
        self.inner
            .stores
            .get(&table)
            .map(|e| e.value().clone())
            .ok_or(StorageError::UnknownTable(table))
    }

    /// Fetches a page on behalf of a transaction.
    ///
    /// Takes the page lock matching `perm` first (blocking until the lock
    /// manager grants it), then returns the cached frame, loading it from
    /// the backing store on a miss.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permission,
    ) -> StorageResult<PageRef> {
        self.inner.locks.acquire(tid, pid, perm.lock_mode(), None)?;

        if let Some(frame) = self.inner.frames.read().get(&pid) {
            self.inner.replacer.lock().touch(pid);
            return Ok(frame.clone());
        }

        let store = self.store(pid.table)?;
        let page = store.read_page(pid.page_no)?;

        let mut frames = self.inner.frames.write();
        // a concurrent fetch may have loaded it while we read from disk
        if let Some(frame) = frames.get(&pid) {
            self.inner.replacer.lock().touch(pid);
            return Ok(frame.clone());
        }

        if frames.len() >= self.inner.capacity {
            self.evict_one(&mut frames)?;
        }

        let frame: PageRef = Arc::new(RwLock::new(page));
        frames.insert(pid, frame.clone());
        self.inner.replacer.lock().touch(pid);
        trace!("page {} loaded", pid);
        Ok(frame)
    }

    /// Drops one unreferenced frame, flushing it first if dirty. Fails
    /// when every frame is still referenced.
    fn evict_one(&self, frames: &mut HashMap<PageId, PageRef>) -> StorageResult<()> {
        let mut replacer = self.inner.replacer.lock();
        for _ in 0..replacer.len() {
            let Some(victim) = replacer.victim() else {
                break;
            };
            let referenced = frames
                .get(&victim)
                .is_some_and(|f| Arc::strong_count(f) > 1);
            if referenced {
                replacer.touch(victim);
                continue;
            }

            if let Some(frame) = frames.get(&victim) {
                let mut page = frame.write();
                if page.dirtier().is_some() {
                    self.store(victim.table)?.write_page(&page)?;
                    page.mark_dirty(None);
                }
            }
            frames.remove(&victim);
            debug!("page {} evicted", victim);
            return Ok(());
        }
        Err(StorageError::BufferPoolFull)
    }

    /// Writes a resident dirty page back to its store.
    pub fn flush_page(&self, pid: PageId) -> StorageResult<()> {
        let frame = self.inner.frames.read().get(&pid).cloned();
        if let Some(frame) = frame {
            let mut page = frame.write();
            if page.dirtier().is_some() {
                self.store(pid.table)?.write_page(&page)?;
                page.mark_dirty(None);
                trace!("page {} flushed", pid);
            }
        }
        Ok(())
    }

    /// Flushes every resident dirty page.
    pub fn flush_all_pages(&self) -> StorageResult<()> {
        let pids: Vec<PageId> = self.inner.frames.read().keys().copied().collect();
        for pid in pids {
            self.flush_page(pid)?;
        }
        Ok(())
    }

    /// Drops a resident page without writing it back. Used for rollback:
    /// the next fetch re-reads the on-disk image.
    pub fn discard_page(&self, pid: PageId) {
        self.inner.frames.write().remove(&pid);
        self.inner.replacer.lock().forget(pid);
    }

    /// Finishes a transaction: on commit its dirtied pages are flushed,
    /// on abort they are discarded. Either way its locks are released.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> StorageResult<()> {
        let dirtied: Vec<PageId> = self
            .inner
            .frames
            .read()
            .iter()
            .filter(|(_, frame)| frame.read().dirtier() == Some(tid))
            .map(|(pid, _)| *pid)
            .collect();

        for pid in dirtied {
            if commit {
                self.flush_page(pid)?;
            } else {
                debug!("{}: discarding page {}", tid, pid);
                self.discard_page(pid);
            }
        }

        self.inner.locks.release_all(tid);
        Ok(())
    }

    /// Whether the transaction currently holds a lock on the page.
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId, perm: Permission) -> bool {
        self.inner.locks.holds(tid, pid, perm.lock_mode())
    }

    /// Number of resident pages.
    pub fn resident_pages(&self) -> usize {
        self.inner.frames.read().len()
    }
}
