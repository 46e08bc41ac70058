//! Memory Management
//!
//! The firmware has no paging and no address spaces: one arena, handed to
//! the boundary-tag heap at boot.

pub mod heap;

pub use heap::{HeapBox, HeapError, HeapStats, LockedHeap, PhysAddr, HEAP};

/// Initialize the firmware heap over `[start, end)` and report its size
///
/// # Safety
/// The range must be RAM reserved for the heap for the rest of execution.
pub unsafe fn init(start: usize, end: usize) -> Result<(), HeapError> {
    heap::init_at(start, end)?;
    crate::log!(
        "Heap initialized: {} KB at {:#x}",
        (end - start) / 1024,
        start
    );
    Ok(())
}

/// Bytes currently handed out by the firmware heap
pub fn used_bytes() -> usize {
    HEAP.used()
}

/// Bytes still available in the firmware heap
pub fn free_bytes() -> usize {
    HEAP.available()
}
