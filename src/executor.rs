//! Query-side operators over scanned tuples.
//!
//! Only grouped aggregation lives here; it accumulates over an in-memory
//! stream of tuples with no persistence or concurrency concerns.

pub mod aggregate;

pub use aggregate::{AggregateOp, IntAggregator, TextAggregator};
