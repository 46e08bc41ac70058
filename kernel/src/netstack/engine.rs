//! Protocol engine interface
//!
//! Frame encoding, checksums, retransmission and the inbound half of the
//! TCP state machine live outside the core. The socket layer drives them
//! through this trait and exposes the socket table back for demultiplexing.

use super::buffer::PacketBuffer;
use super::error::Result;
use super::socket::{Descriptor, Socket, SocketTable};
use super::tcp::TcpFlags;

pub trait ProtocolEngine: Sync {
    /// Encode and transmit a TCP segment for `sock`.
    ///
    /// Called with the socket table locked: implementations must not call
    /// back into the table. They may keep `buf` on `sock.tx_queue` until it
    /// is acknowledged, appending through `buffer::enqueue`.
    fn send_tcp(
        &self,
        sock: &mut Socket,
        buf: PacketBuffer,
        flags: TcpFlags,
        options: Option<&[u8]>,
    ) -> Result<()>;

    /// Next inbound segment for `fd`, if any
    fn receive_tcp(&self, table: &SocketTable, fd: Descriptor) -> Option<PacketBuffer>;

    /// Encode and transmit a datagram to `sock.remote`. Same locking rule
    /// as `send_tcp`.
    fn send_udp(&self, sock: &mut Socket, buf: PacketBuffer) -> Result<()>;

    /// Next inbound datagram for `fd`. The engine records the sender in
    /// the socket's remote address before handing it out.
    fn receive_udp(&self, table: &SocketTable, fd: Descriptor) -> Option<PacketBuffer>;

    /// Broadcast an ARP request for `ip`
    fn send_arp_request(&self, ip: [u8; 4]) -> Result<()>;

    /// Hardware address learnt for `ip`, if resolved
    fn resolved_hw_addr(&self, ip: [u8; 4]) -> Option<[u8; 6]>;

    /// Drain the device receive path. Must be called periodically for
    /// any socket to make progress; runs with the table unlocked.
    fn poll(&self, table: &SocketTable);

    /// Address configured on the network device
    fn device_local_ip(&self) -> Result<[u8; 4]>;
}
