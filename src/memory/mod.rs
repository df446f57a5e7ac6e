//! Memory management for zcio.
//!
//! Virtual memory primitives, a growable arena, bump pools, the headerless
//! allocator backing the file cache, and a single-instance allocator.

mod arena;
mod checker;
mod headerless;
mod pool;
mod single;
pub mod vm;

pub use arena::DynArray;
pub use checker::AllocationChecker;
pub use headerless::{AllocatorStats, HeaderlessAllocator, ValidationError};
pub use pool::{Pool, POOL_VARIABLE_ALLOCS};
pub use single::{SingleAllocator, SingleBox};
pub use vm::{Protection, VmError};

/// Granularity of every allocation size.
pub const ALLOCATION_ALIGNMENT: usize = 16;

/// Smallest size the headerless allocator hands out; also large enough to
/// hold both boundary tags of a free block.
pub const MIN_ALLOCATION_SIZE: usize = 128;
