//! Lowest level crate of `sgfx`. Includes the inline/heap command storage used by the queues, the
//! generational handle table used by every backend, and some memory helpers.

pub mod dynamic_array;
pub use dynamic_array::DynamicArray;

pub mod handle_table;
pub use handle_table::HandleTable;
pub use handle_table::RawHandle;

pub mod memory;
