//! Packet buffers
//!
//! One heap block per frame: `headroom` bytes reserved in front of the
//! payload so lower layers can prepend their headers in place.
//!
//! ```text
//!   base            data()
//!   |<- headroom ->|<------- size ------->|
//! ```

use alloc::collections::VecDeque;
use core::fmt;
use core::ptr::NonNull;

use super::error::{NetError, Result};
use super::socket::Descriptor;
use crate::memory::heap::LockedHeap;

/// Ethernet + IPv4 + TCP header bytes
pub const TCP_HEADROOM: usize = 14 + 20 + 20;
/// Ethernet + IPv4 + UDP header bytes
pub const UDP_HEADROOM: usize = 14 + 20 + 8;

/// Per-socket FIFO of buffers; the queue owns what it holds.
///
/// The ring storage comes from the global allocator, which on the board is
/// the firmware heap, so always grow it through `enqueue`.
pub type PacketQueue = VecDeque<PacketBuffer>;

/// Append `buf` to `queue`. If the ring cannot grow the buffer is released
/// and `OutOfMemory` returned.
pub fn enqueue(queue: &mut PacketQueue, buf: PacketBuffer) -> Result<()> {
    queue.try_reserve(1).map_err(|_| NetError::OutOfMemory)?;
    queue.push_back(buf);
    Ok(())
}

pub struct PacketBuffer {
    base: NonNull<u8>,
    head: usize,
    size: usize,
    owner: Option<Descriptor>,
    heap: &'static LockedHeap,
}

// The block is exclusively owned; nothing else aliases it
unsafe impl Send for PacketBuffer {}

impl PacketBuffer {
    /// Allocate `header_reserve + payload` bytes from `heap`
    pub fn alloc(heap: &'static LockedHeap, header_reserve: usize, payload: usize) -> Result<Self> {
        let total = header_reserve
            .checked_add(payload)
            .ok_or(NetError::OutOfMemory)?;
        let base = heap.allocate(total).ok_or(NetError::OutOfMemory)?;
        Ok(Self {
            base,
            head: header_reserve,
            size: payload,
            owner: None,
            heap,
        })
    }

    /// Allocate and fill the payload with `data`
    pub fn from_slice(heap: &'static LockedHeap, header_reserve: usize, data: &[u8]) -> Result<Self> {
        let mut buf = Self::alloc(heap, header_reserve, data.len())?;
        buf.data_mut().copy_from_slice(data);
        Ok(buf)
    }

    pub fn data(&self) -> &[u8] {
        // SAFETY: `head + size` never exceeds the allocated block
        unsafe { core::slice::from_raw_parts(self.base.as_ptr().add(self.head), self.size) }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `data`, and `&mut self` owns the block
        unsafe { core::slice::from_raw_parts_mut(self.base.as_ptr().add(self.head), self.size) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Bytes still free in front of the data
    pub fn headroom(&self) -> usize {
        self.head
    }

    /// Grow the data area backwards by `len` bytes and return the new
    /// header slice, or `None` if the headroom is too small.
    pub fn push_header(&mut self, len: usize) -> Option<&mut [u8]> {
        if len > self.head {
            return None;
        }
        self.head -= len;
        self.size += len;
        Some(&mut self.data_mut()[..len])
    }

    /// Drop `len` bytes from the front of the data (e.g. a parsed header)
    pub fn pull_header(&mut self, len: usize) -> Option<&[u8]> {
        if len > self.size {
            return None;
        }
        let start = self.head;
        self.head += len;
        self.size -= len;
        // SAFETY: `start + len` was inside the data area checked above
        Some(unsafe { core::slice::from_raw_parts(self.base.as_ptr().add(start), len) })
    }

    /// Socket the buffer was queued for (lookup only)
    pub fn owner(&self) -> Option<Descriptor> {
        self.owner
    }

    pub fn set_owner(&mut self, fd: Descriptor) {
        self.owner = Some(fd);
    }

    /// Return the block to the heap
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PacketBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.heap.free(self.base) {
            crate::log_error!("[NETBUF] release {:p}: {}", self.base, e);
        }
    }
}

impl fmt::Debug for PacketBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBuffer")
            .field("size", &self.size)
            .field("headroom", &self.head)
            .field("owner", &self.owner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::vec;

    fn heap(bytes: usize) -> &'static LockedHeap {
        let heap = Box::leak(Box::new(LockedHeap::empty()));
        let words = Box::leak(vec![0usize; bytes / 8].into_boxed_slice());
        heap.init_from_words(words).unwrap();
        heap
    }

    #[test]
    fn test_alloc_reserves_headroom() {
        let heap = heap(4096);
        let buf = PacketBuffer::from_slice(heap, TCP_HEADROOM, b"hello").unwrap();
        assert_eq!(buf.data(), b"hello");
        assert_eq!(buf.size(), 5);
        assert_eq!(buf.headroom(), TCP_HEADROOM);
        assert!(buf.owner().is_none());
    }

    #[test]
    fn test_push_and_pull_header() {
        let heap = heap(4096);
        let mut buf = PacketBuffer::from_slice(heap, UDP_HEADROOM, b"data").unwrap();

        buf.push_header(8).unwrap().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(buf.size(), 12);
        assert_eq!(buf.headroom(), UDP_HEADROOM - 8);
        assert_eq!(&buf.data()[8..], b"data");

        assert_eq!(buf.pull_header(8).unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(buf.data(), b"data");
        assert!(buf.push_header(UDP_HEADROOM + 1).is_none());
    }

    #[test]
    fn test_release_returns_memory() {
        let heap = heap(4096);
        let before = heap.available();
        let buf = PacketBuffer::alloc(heap, TCP_HEADROOM, 512).unwrap();
        assert!(heap.available() < before);
        buf.release();
        assert_eq!(heap.available(), before);
    }

    #[test]
    fn test_enqueue_keeps_fifo_order() {
        let heap = heap(4096);
        let mut q = PacketQueue::new();
        for b in [b"one", b"two"] {
            enqueue(&mut q, PacketBuffer::from_slice(heap, 0, b).unwrap()).unwrap();
        }
        assert_eq!(q.pop_front().unwrap().data(), b"one");
        assert_eq!(q.pop_front().unwrap().data(), b"two");
    }

    #[test]
    fn test_alloc_fails_when_heap_exhausted() {
        let heap = heap(2048);
        let err = PacketBuffer::alloc(heap, TCP_HEADROOM, 4096).unwrap_err();
        assert_eq!(err, NetError::OutOfMemory);
        heap.check().unwrap();
    }
}
