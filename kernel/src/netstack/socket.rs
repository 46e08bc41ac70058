//! BSD-style Socket Table
//!
//! Fixed table of `MAX_SOCK_NUM` slots. Slot 0 is never handed out so that
//! 0 and negative values can carry errors through the C-style API; a
//! descriptor is always the lowest free index >= 1.
//!
//! Sockets live in the firmware heap (`HeapBox`), so socket creation fails
//! cleanly with `OutOfMemory` instead of aborting. The table is the only
//! owner of a socket; a socket is freed only from `CLOSED`, after both of
//! its packet queues have been released.

use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU16, Ordering};

use super::buffer::{self, PacketBuffer, PacketQueue};
use super::error::{NetError, Result};
use super::tcp::TcpState;
use super::Stack;
use crate::config::{MAX_SOCK_NUM, PORT_MIN};
use crate::memory::heap::{HeapBox, LockedHeap};
use crate::sync::IrqLock;

/// Validated socket descriptor (1..MAX_SOCK_NUM)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Descriptor(u8);

impl Descriptor {
    pub fn new(raw: i32) -> Result<Self> {
        if raw >= 1 && (raw as usize) < MAX_SOCK_NUM {
            Ok(Self(raw as u8))
        } else {
            Err(NetError::InvalidDescriptor)
        }
    }

    pub const fn as_raw(self) -> i32 {
        self.0 as i32
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Socket address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum AddressFamily {
    #[default]
    Unspec = 0,
    Inet = 2, // IPv4
}

impl From<u16> for AddressFamily {
    fn from(v: u16) -> Self {
        match v {
            2 => Self::Inet,
            _ => Self::Unspec,
        }
    }
}

/// Socket type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SocketType {
    Stream = 1, // TCP
    Dgram = 2,  // UDP
}

impl SocketType {
    pub fn from_raw(v: u32) -> Option<Self> {
        match v {
            1 => Some(Self::Stream),
            2 => Some(Self::Dgram),
            _ => None,
        }
    }
}

/// Wildcard local address, filled in from the device on `bind`
pub const INADDR_ANY: [u8; 4] = [0; 4];

/// IPv4 socket address. Port in host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SockAddrIn {
    pub family: AddressFamily,
    pub port: u16,
    pub addr: [u8; 4],
}

impl SockAddrIn {
    pub const fn new(addr: [u8; 4], port: u16) -> Self {
        Self {
            family: AddressFamily::Inet,
            port,
            addr,
        }
    }
}

impl fmt::Display for SockAddrIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.addr;
        write!(f, "{}.{}.{}.{}:{}", a, b, c, d, self.port)
    }
}

/// Socket internal data
#[derive(Debug)]
pub struct Socket {
    pub sock_type: SocketType,
    /// Stream state; datagram sockets stay `Closed`
    pub state: TcpState,
    pub seq_num: u32,
    pub ack_num: u32,
    pub local: SockAddrIn,
    pub remote: SockAddrIn,
    pub tx_queue: PacketQueue,
    pub rx_queue: PacketQueue,
}

impl Socket {
    fn new(sock_type: SocketType) -> Self {
        Self {
            sock_type,
            state: TcpState::Closed,
            seq_num: 1,
            ack_num: 0,
            local: SockAddrIn::default(),
            remote: SockAddrIn::default(),
            tx_queue: PacketQueue::new(),
            rx_queue: PacketQueue::new(),
        }
    }

    /// Release every queued buffer; returns how many were dropped
    fn drain_queues(&mut self) -> usize {
        let n = self.tx_queue.len() + self.rx_queue.len();
        self.tx_queue.drain(..).for_each(PacketBuffer::release);
        self.rx_queue.drain(..).for_each(PacketBuffer::release);
        n
    }
}

/// Copy of a socket's observable fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketInfo {
    pub descriptor: Descriptor,
    pub sock_type: SocketType,
    pub state: TcpState,
    pub seq_num: u32,
    pub ack_num: u32,
    pub local: SockAddrIn,
    pub remote: SockAddrIn,
    pub tx_pending: usize,
    pub rx_pending: usize,
}

type Slots = [Option<HeapBox<Socket>>; MAX_SOCK_NUM];

pub struct SocketTable {
    slots: IrqLock<Slots>,
    next_port: AtomicU16,
    heap: &'static LockedHeap,
}

impl SocketTable {
    pub const fn new(heap: &'static LockedHeap) -> Self {
        const EMPTY: Option<HeapBox<Socket>> = None;
        Self {
            slots: IrqLock::new([EMPTY; MAX_SOCK_NUM]),
            next_port: AtomicU16::new(PORT_MIN),
            heap,
        }
    }

    /// Heap that backs sockets and their packet buffers
    pub fn heap(&self) -> &'static LockedHeap {
        self.heap
    }

    /// Install a fresh socket in the lowest free slot
    pub fn create(&self, sock_type: SocketType) -> Result<Descriptor> {
        let mut slots = self.slots.lock();

        let index = (1..MAX_SOCK_NUM)
            .find(|&i| slots[i].is_none())
            .ok_or(NetError::NoSpace)?;

        let sock = HeapBox::try_new_in(Socket::new(sock_type), self.heap)
            .ok_or(NetError::OutOfMemory)?;
        slots[index] = Some(sock);

        let fd = Descriptor(index as u8);
        crate::net_trace!("[SOCKET] Created socket fd={} type={:?}", fd, sock_type);
        Ok(fd)
    }

    /// Free a `CLOSED` socket and clear its slot
    pub fn destroy(&self, fd: Descriptor) -> Result<()> {
        let mut slots = self.slots.lock();
        let slot = &mut slots[fd.index()];

        let state = slot
            .as_ref()
            .map(|s| s.state)
            .ok_or(NetError::InvalidDescriptor)?;
        if state != TcpState::Closed {
            crate::log_warn!("[SOCKET] destroy fd={} refused in {}", fd, state);
            return Err(NetError::InvalidState);
        }

        if let Some(mut sock) = slot.take() {
            let _released = sock.drain_queues();
            crate::net_trace!("[SOCKET] Destroyed fd={} ({} buffers released)", fd, _released);
        }
        Ok(())
    }

    pub fn lookup(&self, fd: Descriptor) -> Option<SocketInfo> {
        let slots = self.slots.lock();
        slots[fd.index()].as_ref().map(|s| SocketInfo {
            descriptor: fd,
            sock_type: s.sock_type,
            state: s.state,
            seq_num: s.seq_num,
            ack_num: s.ack_num,
            local: s.local,
            remote: s.remote,
            tx_pending: s.tx_queue.len(),
            rx_pending: s.rx_queue.len(),
        })
    }

    pub fn state(&self, fd: Descriptor) -> Option<TcpState> {
        self.slots.lock()[fd.index()].as_ref().map(|s| s.state)
    }

    /// Run `f` on the socket with the table locked (interrupts masked).
    ///
    /// `f` must not call back into the table.
    pub fn with_socket<R>(&self, fd: Descriptor, f: impl FnOnce(&mut Socket) -> Result<R>) -> Result<R> {
        let mut slots = self.slots.lock();
        let sock = slots[fd.index()]
            .as_deref_mut()
            .ok_or(NetError::InvalidDescriptor)?;
        f(sock)
    }

    /// Overwrite the TCP state (inbound path, timeouts)
    pub fn set_state(&self, fd: Descriptor, state: TcpState) -> Result<()> {
        self.with_socket(fd, |sock| {
            if sock.state != state {
                crate::net_trace!("[TCP] fd={} {} -> {}", fd, sock.state, state);
                sock.state = state;
            }
            Ok(())
        })
    }

    /// Queue an inbound buffer on the socket's receive queue. The buffer
    /// is released if the queue cannot grow.
    pub fn deliver(&self, fd: Descriptor, mut buf: PacketBuffer) -> Result<()> {
        buf.set_owner(fd);
        self.with_socket(fd, |sock| buffer::enqueue(&mut sock.rx_queue, buf))
    }

    /// Oldest buffer on the receive queue
    pub fn take_rx(&self, fd: Descriptor) -> Option<PacketBuffer> {
        self.with_socket(fd, |sock| Ok(sock.rx_queue.pop_front()))
            .ok()
            .flatten()
    }

    pub fn live_descriptors(&self) -> Vec<Descriptor> {
        let slots = self.slots.lock();
        (1..MAX_SOCK_NUM)
            .filter(|&i| slots[i].is_some())
            .map(|i| Descriptor(i as u8))
            .collect()
    }

    /// First stream socket bound to `dst_port`
    pub fn find_stream_socket(&self, dst_port: u16) -> Option<Descriptor> {
        self.find_bound(SocketType::Stream, dst_port)
    }

    /// First datagram socket bound to `dst_port`
    pub fn find_datagram_socket(&self, dst_port: u16) -> Option<Descriptor> {
        self.find_bound(SocketType::Dgram, dst_port)
    }

    // Destination port only; the peer address is not compared
    fn find_bound(&self, sock_type: SocketType, dst_port: u16) -> Option<Descriptor> {
        let slots = self.slots.lock();
        (1..MAX_SOCK_NUM)
            .find(|&i| {
                slots[i]
                    .as_ref()
                    .is_some_and(|s| s.sock_type == sock_type && s.local.port == dst_port)
            })
            .map(|i| Descriptor(i as u8))
    }

    /// Next ephemeral port. Wraps back to `PORT_MIN`; ports are not
    /// checked for reuse.
    pub fn alloc_port(&self) -> u16 {
        let next = |p: u16| p.checked_add(1).unwrap_or(PORT_MIN);
        let prev = self
            .next_port
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |p| Some(next(p)))
            .unwrap_or(PORT_MIN);
        next(prev)
    }
}

// ============================================================================
// Socket API: creation and binding
// ============================================================================

impl Stack {
    /// Create a socket of the given type
    pub fn socket(&self, sock_type: SocketType) -> Result<Descriptor> {
        self.table.create(sock_type)
    }

    /// Bind a local address. Port 0 takes the next ephemeral port and the
    /// wildcard address takes the device's configured address.
    pub fn bind(&self, fd: Descriptor, addr: &SockAddrIn) -> Result<SockAddrIn> {
        if self.table.lookup(fd).is_none() {
            return Err(NetError::InvalidDescriptor);
        }

        let ip = if addr.addr == INADDR_ANY {
            self.engine.device_local_ip()?
        } else {
            addr.addr
        };

        let local = self.table.with_socket(fd, |sock| {
            sock.local.family = addr.family;
            sock.local.port = match addr.port {
                0 => self.table.alloc_port(),
                port => port,
            };
            sock.local.addr = ip;
            Ok(sock.local)
        })?;

        crate::net_trace!("[SOCKET] Bound fd={} to {}", fd, local);
        Ok(local)
    }
}
