//! Storage layer error types.

use crate::concurrency::lock::AbortError;
use crate::storage::page::{PageId, TableId};
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("page {0} is out of range")]
    InvalidPage(PageId),

    #[error("page {pid}: short read ({got} of {want} bytes)")]
    ShortRead { pid: PageId, got: usize, want: usize },

    #[error("page {0} has no free slot")]
    PageFull(PageId),

    #[error("slot {slot} of page {pid} is out of range")]
    InvalidSlot { pid: PageId, slot: u16 },

    #[error("slot {slot} of page {pid} is empty")]
    EmptySlot { pid: PageId, slot: u16 },

    #[error("tuple is not a member of this table")]
    NotAMember,

    #[error("tuple layout does not match the file schema")]
    SchemaMismatch,

    #[error("corrupt field encoding: {0}")]
    CorruptField(String),

    #[error("insert found no free slot even after growing the file")]
    InsertFoundNoRoom,

    #[error("unknown table {0}")]
    UnknownTable(TableId),

    #[error("buffer pool is full: every frame is in use")]
    BufferPoolFull,

    #[error("scan has no more tuples")]
    ScanExhausted,

    #[error(transparent)]
    Aborted(#[from] AbortError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
