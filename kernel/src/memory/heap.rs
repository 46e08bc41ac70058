//! Firmware Heap Allocator
//!
//! Boundary-tag allocator over one contiguous arena. Every region starts
//! with a two-word header:
//!
//! ```text
//!   +-----------+-----------+---------------------------------+
//!   | prev_size | curr_size | payload (free: next/prev links) |
//!   +-----------+-----------+---------------------------------+
//! ```
//!
//! `curr_size` carries the payload size with bit 0 set while allocated;
//! `prev_size` mirrors the previous region's `curr_size`, flag included.
//! The first region's `prev_size` is 1 and a two-word tail sentinel with
//! `curr_size == 1` closes the arena, so coalescing stops at both ends.
//!
//! Free regions sit on an unordered doubly-linked list searched first fit
//! from the head. Split remainders go to the tail and freed blocks to the
//! head, so a just-released block is reused before untouched arena.
//! Freeing merges with a free successor, then with a free predecessor, so
//! there are never two adjacent free regions.
//!
//! Regions are addressed by arena offset, never by raw pointer; neighbours
//! are found through checked lookups that stop at the arena bounds.

use core::alloc::{GlobalAlloc, Layout};
use core::fmt;
use core::mem::{align_of, size_of};
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};

use crate::config::MIN_HEAP_LEN;
use crate::sync::IrqLock;

pub const WORD_SIZE: usize = size_of::<usize>();
const DWORD_SIZE: usize = 2 * WORD_SIZE;
/// Free-list links kept in the payload of a free region
const LIST_NODE_SIZE: usize = 2 * WORD_SIZE;
/// Header plus links: the smallest region worth splitting off
const REGION_SIZE: usize = DWORD_SIZE + LIST_NODE_SIZE;

const ALLOCATED: usize = 1;
const SIZE_MASK: usize = !(WORD_SIZE - 1);
const NIL: usize = usize::MAX;

#[inline]
fn is_free(tag: usize) -> bool {
    tag & (WORD_SIZE - 1) == 0
}

#[inline]
fn align_up(value: usize, align: usize) -> Option<usize> {
    Some(value.checked_add(align - 1)? & !(align - 1))
}

/// Heap errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// Arena bounds leave less than `MIN_HEAP_LEN` usable bytes
    InvalidRange,
    /// Pointer was not handed out by this heap, or is already free
    InvalidPointer,
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::InvalidRange => write!(f, "heap range too small"),
            HeapError::InvalidPointer => write!(f, "pointer not owned by heap"),
        }
    }
}

/// Bus address of a block as seen by DMA masters.
///
/// The firmware runs identity-mapped, so this is the CPU address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysAddr(usize);

impl PhysAddr {
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

/// Arena snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub arena_size: usize,
    pub used_bytes: usize,
    pub free_bytes: usize,
    pub used_regions: usize,
    pub free_regions: usize,
    pub largest_free: usize,
}

impl HeapStats {
    /// Header bytes, tail sentinel included
    pub fn overhead(&self) -> usize {
        (self.used_regions + self.free_regions + 1) * DWORD_SIZE
    }
}

/// Offset of a region header from the arena base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region(usize);

pub struct Heap {
    base: usize,
    len: usize,
    free_head: usize,
    free_tail: usize,
}

impl Heap {
    /// Format `[start, end)` as an empty heap.
    ///
    /// # Safety
    /// The range must be valid, writable memory owned exclusively by the
    /// heap for as long as it (and any pointer it hands out) lives.
    pub unsafe fn new(start: usize, end: usize) -> Result<Self, HeapError> {
        let start = align_up(start, WORD_SIZE).ok_or(HeapError::InvalidRange)?;
        let end = end & SIZE_MASK;

        match start.checked_add(MIN_HEAP_LEN) {
            Some(min_end) if min_end < end => {}
            _ => return Err(HeapError::InvalidRange),
        }

        let mut heap = Heap {
            base: start,
            len: end - start,
            free_head: NIL,
            free_tail: NIL,
        };

        let first = Region(0);
        let tail = heap.tail();
        let size = tail.0 - DWORD_SIZE;

        heap.write(first.0, ALLOCATED);
        heap.write(first.0 + WORD_SIZE, size);
        heap.write(tail.0, size);
        heap.write(tail.0 + WORD_SIZE, ALLOCATED);
        heap.push_tail(first);

        crate::mem_trace!("[HEAP] arena {:#x}..{:#x}, {} bytes free", start, end, size);
        Ok(heap)
    }

    /// Build a heap over a static word buffer
    pub fn from_words(mem: &'static mut [usize]) -> Result<Self, HeapError> {
        let start = mem.as_mut_ptr() as usize;
        let end = start + mem.len() * WORD_SIZE;
        // SAFETY: the 'static exclusive borrow hands the buffer to the heap
        unsafe { Self::new(start, end) }
    }

    /// Arena size in bytes
    pub fn arena_size(&self) -> usize {
        self.len
    }

    /// Whether `ptr` points into this arena
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        addr >= self.base && addr < self.base + self.len
    }

    // ------------------------------------------------------------------
    // Raw word access
    // ------------------------------------------------------------------

    #[inline]
    fn read(&self, off: usize) -> usize {
        debug_assert!(off + WORD_SIZE <= self.len);
        // SAFETY: `off` is inside the arena and word aligned
        unsafe { ptr::read((self.base + off) as *const usize) }
    }

    #[inline]
    fn write(&mut self, off: usize, value: usize) {
        debug_assert!(off + WORD_SIZE <= self.len);
        // SAFETY: as above
        unsafe { ptr::write((self.base + off) as *mut usize, value) }
    }

    // ------------------------------------------------------------------
    // Boundary tags
    // ------------------------------------------------------------------

    #[inline]
    fn tail(&self) -> Region {
        Region(self.len - DWORD_SIZE)
    }

    #[inline]
    fn prev_tag(&self, r: Region) -> usize {
        self.read(r.0)
    }

    #[inline]
    fn curr_tag(&self, r: Region) -> usize {
        self.read(r.0 + WORD_SIZE)
    }

    #[inline]
    fn size(&self, r: Region) -> usize {
        self.curr_tag(r) & SIZE_MASK
    }

    /// Physically next region, `None` past the tail sentinel
    fn successor(&self, r: Region) -> Option<Region> {
        if r == self.tail() {
            return None;
        }
        let off = r.0.checked_add(DWORD_SIZE)?.checked_add(self.size(r))?;
        (off <= self.tail().0).then_some(Region(off))
    }

    /// Physically previous region, `None` at the head of the arena
    fn predecessor(&self, r: Region) -> Option<Region> {
        let prev_size = self.prev_tag(r) & SIZE_MASK;
        r.0.checked_sub(prev_size + DWORD_SIZE).map(Region)
    }

    /// Write `tag` as the region's size and mirror it into the successor
    fn set_size(&mut self, r: Region, tag: usize) {
        self.write(r.0 + WORD_SIZE, tag);
        if let Some(succ) = self.successor(r) {
            self.write(succ.0, tag);
        }
    }

    fn payload(&self, r: Region) -> NonNull<u8> {
        // SAFETY: the arena base is the address of live memory, never null
        unsafe { NonNull::new_unchecked((self.base + r.0 + DWORD_SIZE) as *mut u8) }
    }

    // ------------------------------------------------------------------
    // Free list
    // ------------------------------------------------------------------

    #[inline]
    fn next_link(&self, r: Region) -> usize {
        self.read(r.0 + DWORD_SIZE)
    }

    #[inline]
    fn prev_link(&self, r: Region) -> usize {
        self.read(r.0 + DWORD_SIZE + WORD_SIZE)
    }

    #[inline]
    fn set_next_link(&mut self, r: Region, next: usize) {
        self.write(r.0 + DWORD_SIZE, next);
    }

    #[inline]
    fn set_prev_link(&mut self, r: Region, prev: usize) {
        self.write(r.0 + DWORD_SIZE + WORD_SIZE, prev);
    }

    fn push_tail(&mut self, r: Region) {
        self.set_next_link(r, NIL);
        self.set_prev_link(r, self.free_tail);
        if self.free_tail == NIL {
            self.free_head = r.0;
        } else {
            self.set_next_link(Region(self.free_tail), r.0);
        }
        self.free_tail = r.0;
    }

    fn push_head(&mut self, r: Region) {
        self.set_prev_link(r, NIL);
        self.set_next_link(r, self.free_head);
        if self.free_head == NIL {
            self.free_tail = r.0;
        } else {
            self.set_prev_link(Region(self.free_head), r.0);
        }
        self.free_head = r.0;
    }

    fn unlink(&mut self, r: Region) {
        let next = self.next_link(r);
        let prev = self.prev_link(r);
        if prev == NIL {
            self.free_head = next;
        } else {
            self.set_next_link(Region(prev), next);
        }
        if next == NIL {
            self.free_tail = prev;
        } else {
            self.set_prev_link(Region(next), prev);
        }
    }

    fn free_list(&self) -> FreeList<'_> {
        FreeList {
            heap: self,
            cursor: self.free_head,
        }
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    /// First-fit allocation. `None` when no free region is large enough.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        let alloc_size = align_up(size.max(1), LIST_NODE_SIZE)?;

        let region = self.free_list().find(|&r| self.size(r) >= alloc_size);
        let Some(region) = region else {
            crate::mem_trace!("[HEAP] out of memory for {} bytes", size);
            return None;
        };

        self.unlink(region);

        let region_size = self.size(region);
        let rest = region_size - alloc_size;
        if rest < REGION_SIZE {
            // Too small to stand alone; hand out the whole region
            self.set_size(region, region_size | ALLOCATED);
        } else {
            self.set_size(region, alloc_size | ALLOCATED);
            let succ = Region(region.0 + DWORD_SIZE + alloc_size);
            self.set_size(succ, rest - DWORD_SIZE);
            self.push_tail(succ);
        }

        let ptr = self.payload(region);
        crate::mem_trace!("[HEAP] alloc {} -> {:p} ({} bytes)", size, ptr, self.size(region));
        Some(ptr)
    }

    /// Allocate and clear `size` bytes
    pub fn zero_allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        let ptr = self.allocate(size)?;
        // SAFETY: the block just handed out holds at least `size` bytes
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Some(ptr)
    }

    /// Allocate and report the block's bus address
    pub fn allocate_with_physical_address(&mut self, size: usize) -> Option<(NonNull<u8>, PhysAddr)> {
        let ptr = self.allocate(size)?;
        Some((ptr, PhysAddr(ptr.as_ptr() as usize)))
    }

    /// Return a block to the heap, merging with free neighbours.
    ///
    /// Pointers that are outside the arena, misaligned, or whose header
    /// does not read as allocated are rejected before anything is touched.
    pub fn free(&mut self, ptr: NonNull<u8>) -> Result<(), HeapError> {
        let region = self.region_of(ptr)?;
        let mut size = self.size(region);

        if let Some(succ) = self.successor(region) {
            if is_free(self.curr_tag(succ)) {
                size += self.size(succ) + DWORD_SIZE;
                self.unlink(succ);
            }
        }
        self.set_size(region, size);

        if is_free(self.prev_tag(region)) {
            if let Some(pred) = self.predecessor(region) {
                // Already on the free list; grow it in place
                let merged = self.size(pred) + size + DWORD_SIZE;
                self.set_size(pred, merged);
                crate::mem_trace!("[HEAP] free {:p}, merged back into {} bytes", ptr, merged);
                return Ok(());
            }
        }

        self.push_head(region);
        crate::mem_trace!("[HEAP] free {:p} ({} bytes)", ptr, size);
        Ok(())
    }

    fn region_of(&self, ptr: NonNull<u8>) -> Result<Region, HeapError> {
        let addr = ptr.as_ptr() as usize;
        let off = addr
            .checked_sub(self.base + DWORD_SIZE)
            .ok_or(HeapError::InvalidPointer)?;

        if off % WORD_SIZE != 0 || off >= self.tail().0 {
            return Err(HeapError::InvalidPointer);
        }

        let region = Region(off);
        let tag = self.curr_tag(region);
        if tag & ALLOCATED == 0 {
            return Err(HeapError::InvalidPointer);
        }

        // The mirror in the successor must agree, or this is not a header
        match self.successor(region) {
            Some(succ) if self.prev_tag(succ) == tag => Ok(region),
            _ => Err(HeapError::InvalidPointer),
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    fn regions(&self) -> Regions<'_> {
        Regions {
            heap: self,
            cursor: Some(Region(0)),
        }
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            arena_size: self.len,
            ..HeapStats::default()
        };
        for r in self.regions() {
            let size = self.size(r);
            if is_free(self.curr_tag(r)) {
                stats.free_bytes += size;
                stats.free_regions += 1;
                stats.largest_free = stats.largest_free.max(size);
            } else {
                stats.used_bytes += size;
                stats.used_regions += 1;
            }
        }
        stats
    }

    /// Walk the arena and the free list and verify every invariant
    pub fn check(&self) -> Result<(), &'static str> {
        let mut prev_free = false;
        let mut free_in_arena = 0usize;
        let mut total = 0usize;
        let mut last = Region(0);

        if self.prev_tag(Region(0)) != ALLOCATED {
            return Err("head sentinel clobbered");
        }

        for r in self.regions() {
            let tag = self.curr_tag(r);
            let succ = self.successor(r).ok_or("region runs past tail")?;
            if self.prev_tag(succ) != tag {
                return Err("boundary tag mismatch");
            }
            let free = is_free(tag);
            if free && prev_free {
                return Err("adjacent free regions");
            }
            if free {
                free_in_arena += 1;
            }
            prev_free = free;
            total += self.size(r) + DWORD_SIZE;
            last = r;
        }

        if self.successor(last) != Some(self.tail()) || self.curr_tag(self.tail()) != ALLOCATED {
            return Err("tail sentinel clobbered");
        }
        if total + DWORD_SIZE != self.len {
            return Err("region sizes do not cover the arena");
        }

        let mut on_list = 0usize;
        let mut prev = NIL;
        for r in self.free_list() {
            if !is_free(self.curr_tag(r)) {
                return Err("allocated region on free list");
            }
            if self.prev_link(r) != prev {
                return Err("free list back link broken");
            }
            prev = r.0;
            on_list += 1;
            if on_list > free_in_arena {
                return Err("free list longer than free regions");
            }
        }
        if prev != self.free_tail {
            return Err("free list tail mismatch");
        }
        if on_list != free_in_arena {
            return Err("free region missing from free list");
        }
        Ok(())
    }
}

/// Physical walk from the first region up to (excluding) the tail
struct Regions<'a> {
    heap: &'a Heap,
    cursor: Option<Region>,
}

impl Iterator for Regions<'_> {
    type Item = Region;

    fn next(&mut self) -> Option<Region> {
        let r = self.cursor?;
        if r == self.heap.tail() {
            self.cursor = None;
            return None;
        }
        self.cursor = self.heap.successor(r);
        Some(r)
    }
}

struct FreeList<'a> {
    heap: &'a Heap,
    cursor: usize,
}

impl Iterator for FreeList<'_> {
    type Item = Region;

    fn next(&mut self) -> Option<Region> {
        if self.cursor == NIL {
            return None;
        }
        let r = Region(self.cursor);
        self.cursor = self.heap.next_link(r);
        Some(r)
    }
}

// ============================================================================
// Locked heap (process-wide)
// ============================================================================

/// Heap behind an interrupt-masking lock.
///
/// Every operation runs with interrupts off, so an interrupt handler that
/// allocates never observes a half-updated free list.
pub struct LockedHeap(IrqLock<Option<Heap>>);

impl LockedHeap {
    pub const fn empty() -> Self {
        Self(IrqLock::new(None))
    }

    /// Initialize the heap at `[start, end)`
    ///
    /// # Safety
    /// See [`Heap::new`].
    pub unsafe fn init(&self, start: usize, end: usize) -> Result<(), HeapError> {
        let heap = Heap::new(start, end)?;
        *self.0.lock() = Some(heap);
        Ok(())
    }

    /// Initialize the heap over a static word buffer
    pub fn init_from_words(&self, mem: &'static mut [usize]) -> Result<(), HeapError> {
        let heap = Heap::from_words(mem)?;
        *self.0.lock() = Some(heap);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.0.lock().is_some()
    }

    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.0.lock().as_mut()?.allocate(size)
    }

    pub fn zero_allocate(&self, size: usize) -> Option<NonNull<u8>> {
        self.0.lock().as_mut()?.zero_allocate(size)
    }

    pub fn allocate_with_physical_address(&self, size: usize) -> Option<(NonNull<u8>, PhysAddr)> {
        self.0.lock().as_mut()?.allocate_with_physical_address(size)
    }

    pub fn free(&self, ptr: NonNull<u8>) -> Result<(), HeapError> {
        self.0
            .lock()
            .as_mut()
            .ok_or(HeapError::InvalidPointer)?
            .free(ptr)
    }

    pub fn stats(&self) -> Option<HeapStats> {
        self.0.lock().as_ref().map(Heap::stats)
    }

    pub fn check(&self) -> Result<(), &'static str> {
        self.0.lock().as_ref().ok_or("heap not initialized")?.check()
    }

    /// Get used heap space in bytes
    pub fn used(&self) -> usize {
        self.stats().map_or(0, |s| s.used_bytes)
    }

    /// Get free heap space in bytes
    pub fn available(&self) -> usize {
        self.stats().map_or(0, |s| s.free_bytes)
    }
}

unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // Payloads are only guaranteed word alignment
        if layout.align() > WORD_SIZE {
            return ptr::null_mut();
        }
        self.allocate(layout.size())
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if let Some(ptr) = NonNull::new(ptr) {
            if let Err(e) = self.free(ptr) {
                crate::log_error!("[HEAP] dealloc {:p}: {}", ptr, e);
            }
        }
    }
}

/// Firmware heap; the global allocator on bare-metal targets
#[cfg_attr(target_os = "none", global_allocator)]
pub static HEAP: LockedHeap = LockedHeap::empty();

/// Initialize the firmware heap at the specified address range
///
/// # Safety
/// See [`Heap::new`].
pub unsafe fn init_at(start: usize, end: usize) -> Result<(), HeapError> {
    HEAP.init(start, end)
}

pub fn malloc(size: usize) -> Option<NonNull<u8>> {
    HEAP.allocate(size)
}

pub fn zalloc(size: usize) -> Option<NonNull<u8>> {
    HEAP.zero_allocate(size)
}

pub fn dma_malloc(size: usize) -> Option<(NonNull<u8>, PhysAddr)> {
    HEAP.allocate_with_physical_address(size)
}

pub fn free(ptr: NonNull<u8>) -> Result<(), HeapError> {
    HEAP.free(ptr)
}

// ============================================================================
// HeapBox
// ============================================================================

/// Owned value living in a specific heap.
///
/// Unlike `Box`, construction is fallible: exhaustion is reported to the
/// caller instead of aborting.
pub struct HeapBox<T> {
    ptr: NonNull<T>,
    heap: &'static LockedHeap,
}

unsafe impl<T: Send> Send for HeapBox<T> {}
unsafe impl<T: Sync> Sync for HeapBox<T> {}

impl<T> HeapBox<T> {
    /// Move `value` into `heap`; `None` if the heap is exhausted
    pub fn try_new_in(value: T, heap: &'static LockedHeap) -> Option<Self> {
        if align_of::<T>() > WORD_SIZE {
            return None;
        }
        let ptr = heap.allocate(size_of::<T>())?.cast::<T>();
        // SAFETY: fresh block, large enough and word aligned
        unsafe { ptr.as_ptr().write(value) };
        Some(Self { ptr, heap })
    }
}

impl<T> Deref for HeapBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: initialised in `try_new_in`, live until drop
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for HeapBox<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above; `&mut self` makes the access exclusive
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> Drop for HeapBox<T> {
    fn drop(&mut self) {
        // SAFETY: the value is dropped exactly once, before its block is freed
        unsafe { ptr::drop_in_place(self.ptr.as_ptr()) };
        if let Err(e) = self.heap.free(self.ptr.cast()) {
            crate::log_error!("[HEAP] HeapBox release {:p}: {}", self.ptr, e);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for HeapBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
