pub mod access;
pub mod concurrency;
pub mod executor;
pub mod storage;
pub mod transaction;
