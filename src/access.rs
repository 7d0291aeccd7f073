//! Access layer: typed tuples and the heap files that store them.
//!
//! - **TupleDesc**: ordered field layout every tuple in a file shares
//! - **Tuple** / **RecordId**: typed rows and their current slot
//! - **HeapFile**: insert/delete/scan against one table's backing file
//! - **HeapScan**: lazy page-spanning cursor over a heap file

pub mod heap;
pub mod scan;
pub mod schema;
pub mod tuple;
pub mod value;

pub use heap::HeapFile;
pub use scan::HeapScan;
pub use schema::TupleDesc;
pub use tuple::{RecordId, Tuple};
pub use value::{DataType, Value, TEXT_LEN};
