pub mod lock;

pub use lock::{AbortError, LockManager, LockMode};
