use crate::access::schema::TupleDesc;
use crate::storage::disk::PAGE_SIZE;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, PageId, TableId};
use log::debug;
use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One table's backing file plus the schema its tuples are laid out with.
///
/// No file handle is held across calls: every operation opens the file,
/// performs a single seek and transfer, and lets the handle drop. The page
/// count is always recomputed from the current file length, since inserts
/// grow the file.
pub struct PageStore {
    path: PathBuf,
    table: TableId,
    schema: Arc<TupleDesc>,
}

impl PageStore {
    /// Opens (creating if absent) the backing file at `path`.
    ///
    /// The table id is a hash of the canonical path, so the same file
    /// always resolves to the same id within a process.
    pub fn open(path: impl AsRef<Path>, schema: Arc<TupleDesc>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        let canonical = path.canonicalize()?;

        let mut hasher = DefaultHasher::new();
        canonical.hash(&mut hasher);
        let table = TableId(hasher.finish() as u32);

        Ok(Self {
            path,
            table,
            schema,
        })
    }

    pub fn table_id(&self) -> TableId {
        self.table
    }

    pub fn schema(&self) -> &Arc<TupleDesc> {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whole pages currently in the file; a partial trailing page is not
    /// addressable.
    pub fn num_pages(&self) -> StorageResult<u32> {
        let len = std::fs::metadata(&self.path)?.len();
        Ok((len / PAGE_SIZE as u64) as u32)
    }

    /// Reads one page image from disk.
    ///
    /// This is the only path by which page bytes reach memory; normal
    /// operation goes through the buffer pool, which calls this on a miss.
    pub fn read_page(&self, page_no: u32) -> StorageResult<HeapPage> {
        let pid = PageId::new(self.table, page_no);
        let mut file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        if (page_no as u64 + 1) * PAGE_SIZE as u64 > len {
            return Err(StorageError::InvalidPage(pid));
        }

        file.seek(SeekFrom::Start(page_no as u64 * PAGE_SIZE as u64))?;
        let mut buf = Box::new([0u8; PAGE_SIZE]);
        let mut got = 0;
        while got < PAGE_SIZE {
            let n = file.read(&mut buf[got..])?;
            if n == 0 {
                return Err(StorageError::ShortRead {
                    pid,
                    got,
                    want: PAGE_SIZE,
                });
            }
            got += n;
        }

        Ok(HeapPage::new(pid, self.schema.clone(), buf))
    }

    /// Writes one page image back to disk, synchronously.
    ///
    /// The page number may equal the current page count (a page appended
    /// elsewhere); anything beyond that is out of range. There is no log
    /// or journal behind this write.
    pub fn write_page(&self, page: &HeapPage) -> StorageResult<()> {
        let pid = page.id();
        if pid.table != self.table || pid.page_no > self.num_pages()? {
            return Err(StorageError::InvalidPage(pid));
        }

        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(pid.page_no as u64 * PAGE_SIZE as u64))?;
        file.write_all(page.page_data())?;
        file.sync_all()?;
        Ok(())
    }

    /// Appends one empty page to the file and returns its id.
    ///
    /// Callers must serialize growth per file; the heap file wraps this in
    /// its append section.
    pub fn append_empty_page(&self) -> StorageResult<PageId> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        let page_no = (file.metadata()?.len() / PAGE_SIZE as u64) as u32;
        file.write_all(&[0u8; PAGE_SIZE])?;
        file.sync_all()?;
        debug!("table {}: appended page {}", self.table, page_no);
        Ok(PageId::new(self.table, page_no))
    }
}
