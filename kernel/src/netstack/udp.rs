//! UDP socket calls

use super::buffer::{PacketBuffer, UDP_HEADROOM};
use super::error::{NetError, Result};
use super::socket::{Descriptor, SockAddrIn, SocketType};
use super::Stack;

impl Stack {
    fn require_datagram(&self, fd: Descriptor) -> Result<()> {
        let info = self.table.lookup(fd).ok_or(NetError::InvalidDescriptor)?;
        if info.sock_type != SocketType::Dgram {
            return Err(NetError::InvalidState);
        }
        Ok(())
    }

    /// Send one datagram to `dest`. Unbound sockets get an ephemeral port.
    pub fn sendto(&self, fd: Descriptor, data: &[u8], dest: &SockAddrIn) -> Result<usize> {
        self.require_datagram(fd)?;

        let buf = PacketBuffer::from_slice(self.table.heap(), UDP_HEADROOM, data)?;
        self.table.with_socket(fd, |sock| {
            if sock.local.port == 0 {
                sock.local.port = self.table.alloc_port();
            }
            sock.remote = *dest;
            self.engine.send_udp(sock, buf)
        })?;

        crate::net_trace!("[UDP] fd={} sent {} bytes to {}", fd, data.len(), dest);
        Ok(data.len())
    }

    /// Receive one datagram into `buf`.
    ///
    /// Returns `(0, peer)` when nothing is pending. The peer is the
    /// socket's remote address as last recorded by the engine.
    pub fn recvfrom(&self, fd: Descriptor, buf: &mut [u8]) -> Result<(usize, SockAddrIn)> {
        self.require_datagram(fd)?;

        let Some(pkt) = self.engine.receive_udp(&self.table, fd) else {
            let peer = self.table.lookup(fd).ok_or(NetError::InvalidDescriptor)?.remote;
            return Ok((0, peer));
        };

        let len = pkt.size().min(buf.len());
        buf[..len].copy_from_slice(&pkt.data()[..len]);
        pkt.release();

        let peer = self.table.lookup(fd).ok_or(NetError::InvalidDescriptor)?.remote;
        Ok((len, peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netstack::mock;
    use crate::netstack::tcp::TcpState;

    const DNS: SockAddrIn = SockAddrIn::new([8, 8, 8, 8], 53);

    #[test]
    fn test_sendto_assigns_port_and_sends() {
        let h = mock::harness();
        let fd = h.stack.socket(SocketType::Dgram).unwrap();
        assert_eq!(h.stack.sendto(fd, b"query", &DNS).unwrap(), 5);

        let info = h.stack.table().lookup(fd).unwrap();
        assert!(info.local.port > 0);
        assert_eq!(info.remote, DNS);
        assert_eq!(info.state, TcpState::Closed);

        let sent = h.engine.sent_udp();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload, b"query");
        assert_eq!(sent[0].remote, DNS);
        assert_eq!(sent[0].headroom, UDP_HEADROOM);
    }

    #[test]
    fn test_sendto_rejects_stream_socket() {
        let h = mock::harness();
        let fd = h.stack.socket(SocketType::Stream).unwrap();
        assert_eq!(h.stack.sendto(fd, b"x", &DNS), Err(NetError::InvalidState));
        let mut buf = [0u8; 4];
        assert_eq!(h.stack.recvfrom(fd, &mut buf), Err(NetError::InvalidState));
        assert!(h.engine.sent_udp().is_empty());
    }

    #[test]
    fn test_recvfrom_empty_returns_zero() {
        let h = mock::harness();
        let fd = h.stack.socket(SocketType::Dgram).unwrap();
        let mut buf = [0u8; 32];
        let (n, _) = h.stack.recvfrom(fd, &mut buf).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_recvfrom_reports_sender() {
        let h = mock::harness();
        let fd = h.stack.socket(SocketType::Dgram).unwrap();
        let local = h.stack.bind(fd, &SockAddrIn::new([10, 0, 0, 15], 0)).unwrap();

        let from = SockAddrIn::new([10, 0, 0, 1], 67);
        h.engine.inject_udp(local.port, from, b"offer");

        let mut buf = [0u8; 3];
        let (n, peer) = h.stack.recvfrom(fd, &mut buf).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf, b"off");
        assert_eq!(peer, from);
    }

    #[test]
    fn test_udp_demux_ignores_stream_socket_on_same_port() {
        let h = mock::harness();
        let tcp = h.stack.socket(SocketType::Stream).unwrap();
        let udp = h.stack.socket(SocketType::Dgram).unwrap();
        h.stack.bind(tcp, &SockAddrIn::new([10, 0, 0, 15], 5000)).unwrap();
        h.stack.bind(udp, &SockAddrIn::new([10, 0, 0, 15], 5000)).unwrap();

        h.engine.inject_udp(5000, SockAddrIn::new([10, 0, 0, 9], 9), b"ping");
        h.engine.poll_now(h.stack.table());
        assert_eq!(h.stack.table().lookup(udp).unwrap().rx_pending, 1);
        assert_eq!(h.stack.table().lookup(tcp).unwrap().rx_pending, 0);
    }
}
