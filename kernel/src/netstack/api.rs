//! C-style socket entry points
//!
//! Thin wrappers over the process-wide `Stack`: raw `i32` descriptors in,
//! non-negative results or negative errno values out. Until `init` runs
//! every call fails with `-ENODEV`.

use spin::Once;

use super::error::{errno, NetError, Result};
use super::socket::{AddressFamily, Descriptor, SockAddrIn, SocketType};
use super::Stack;

pub const AF_INET: u16 = AddressFamily::Inet as u16;
pub const SOCK_STREAM: u32 = SocketType::Stream as u32;
pub const SOCK_DGRAM: u32 = SocketType::Dgram as u32;

static STACK: Once<Stack> = Once::new();

/// Install the process-wide stack. Later calls return the first one.
pub fn init(stack: Stack) -> &'static Stack {
    let stack = STACK.call_once(|| stack);
    crate::log!("[NET] socket layer ready ({} ticks wait budget)", stack.policy().budget());
    stack
}

pub fn stack() -> Option<&'static Stack> {
    STACK.get()
}

fn installed(slot: &'static Once<Stack>) -> Result<&'static Stack> {
    slot.get().ok_or(NetError::NoDevice)
}

fn call<T>(f: impl FnOnce(&'static Stack) -> Result<T>) -> Result<T> {
    f(installed(&STACK)?)
}

fn status(r: Result<()>) -> i32 {
    r.map_or_else(NetError::errno, |()| 0)
}

fn length(r: Result<usize>) -> isize {
    r.map_or_else(|e| e.errno() as isize, |n| n as isize)
}

/// Create a socket; returns the descriptor
pub fn socket(domain: u16, sock_type: u32, _protocol: u32) -> i32 {
    if domain != AF_INET {
        crate::log_debug!("[SOCKET] Only AF_INET supported");
        return -errno::EINVAL;
    }
    // Mask off SOCK_NONBLOCK etc.
    let Some(sock_type) = SocketType::from_raw(sock_type & 0xFF) else {
        return -errno::EINVAL;
    };
    call(|s| s.socket(sock_type)).map_or_else(NetError::errno, Descriptor::as_raw)
}

pub fn bind(fd: i32, addr: &SockAddrIn) -> i32 {
    status(call(|s| s.bind(Descriptor::new(fd)?, addr).map(|_| ())))
}

pub fn connect(fd: i32, addr: &SockAddrIn) -> i32 {
    status(call(|s| s.connect(Descriptor::new(fd)?, addr)))
}

pub fn send(fd: i32, data: &[u8]) -> isize {
    length(call(|s| s.send(Descriptor::new(fd)?, data)))
}

pub fn recv(fd: i32, buf: &mut [u8]) -> isize {
    length(call(|s| s.recv(Descriptor::new(fd)?, buf)))
}

pub fn sendto(fd: i32, data: &[u8], addr: &SockAddrIn) -> isize {
    length(call(|s| s.sendto(Descriptor::new(fd)?, data, addr)))
}

pub fn recvfrom(fd: i32, buf: &mut [u8], addr_out: Option<&mut SockAddrIn>) -> isize {
    let r = call(|s| s.recvfrom(Descriptor::new(fd)?, buf));
    length(r.map(|(n, peer)| {
        if let Some(out) = addr_out {
            *out = peer;
        }
        n
    }))
}

pub fn close(fd: i32) -> i32 {
    status(call(|s| s.close(Descriptor::new(fd)?)))
}

/// Resolve `ip` to a hardware address into `mac`
pub fn gethostaddr(ip: [u8; 4], mac: &mut [u8; 6]) -> i32 {
    status(call(|s| s.resolve_hw_addr(ip)).map(|m| *mac = m))
}
