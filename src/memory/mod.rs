mod free_list;
mod linear;

pub use free_list::{AllocPolicy, Allocation, FreeListAllocator};
pub use linear::LinearAllocator;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AllocError {
    #[error("allocation of {requested} bytes does not fit (capacity {capacity}, {live} live)")]
    OutOfSpace {
        requested: u64,
        capacity: u64,
        live: u64,
    },
}

pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}
