//! Network Socket Layer
//!
//! BSD-style sockets over an external protocol engine:
//! - `socket`: descriptor table, binding, demultiplexing by port
//! - `tcp`: connect / close / send / recv with bounded waits
//! - `udp`: sendto / recvfrom
//! - `arp`: cancellable hardware address resolution
//! - `api`: C-style entry points over the process-wide stack

pub mod api;
pub mod arp;
pub mod buffer;
pub mod engine;
pub mod error;
pub mod socket;
pub mod tcp;
pub mod udp;

#[cfg(test)]
pub(crate) mod mock;

pub use buffer::{enqueue, PacketBuffer, PacketQueue, TCP_HEADROOM, UDP_HEADROOM};
pub use engine::ProtocolEngine;
pub use error::NetError;
pub use socket::{
    AddressFamily, Descriptor, SockAddrIn, Socket, SocketInfo, SocketTable, SocketType, INADDR_ANY,
};
pub use tcp::{TcpFlags, TcpState};

use crate::config::WaitPolicy;
use crate::memory::heap::LockedHeap;
use crate::serial::Console;
use crate::timer::TickSource;

/// The socket layer and its collaborators
pub struct Stack {
    table: SocketTable,
    engine: &'static dyn ProtocolEngine,
    ticks: &'static dyn TickSource,
    console: &'static dyn Console,
    policy: WaitPolicy,
}

impl Stack {
    pub fn new(
        heap: &'static LockedHeap,
        engine: &'static dyn ProtocolEngine,
        ticks: &'static dyn TickSource,
        console: &'static dyn Console,
    ) -> Self {
        Self {
            table: SocketTable::new(heap),
            engine,
            ticks,
            console,
            policy: WaitPolicy::default(),
        }
    }

    /// Override the connect/close wait budget
    pub fn with_wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Socket table, for the engine's inbound path
    pub fn table(&self) -> &SocketTable {
        &self.table
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }
}
