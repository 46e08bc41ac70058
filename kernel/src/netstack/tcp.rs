//! TCP connection lifecycle
//!
//! Local half of the state machine: `connect`, `close`, `send` and `recv`.
//! Segment encoding and inbound transitions belong to the protocol engine,
//! which moves the shared `state` field from the receive path. Every local
//! transition happens with the socket table locked, so the engine never
//! sees a send without the matching state write.
//!
//! Waits are bounded busy-polls: `policy.retries` rounds of
//! poll / check / sleep `policy.delay_ticks`.

use core::fmt;

use bitflags::bitflags;

use super::buffer::{PacketBuffer, TCP_HEADROOM};
use super::error::{NetError, Result};
use super::socket::{Descriptor, SockAddrIn, SocketType};
use super::Stack;

bitflags! {
    /// TCP header flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TcpFlags: u8 {
        const FIN = 0x01;
        const SYN = 0x02;
        const RST = 0x04;
        const PSH = 0x08;
        const ACK = 0x10;
        const URG = 0x20;
    }
}

/// TCP connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Closed,
    SynSent,
    SynRcvd,
    Established,
    CloseWait,
    FinWait1,
    LastAck,
    TimeWait,
}

impl TcpState {
    pub fn name(&self) -> &'static str {
        match self {
            TcpState::Closed => "CLOSED",
            TcpState::SynSent => "SYN_SENT",
            TcpState::SynRcvd => "SYN_RCVD",
            TcpState::Established => "ESTABLISHED",
            TcpState::CloseWait => "CLOSE_WAIT",
            TcpState::FinWait1 => "FIN_WAIT1",
            TcpState::LastAck => "LAST_ACK",
            TcpState::TimeWait => "TIME_WAIT",
        }
    }
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Stack {
    /// Poll until the socket reaches `target` or the wait budget runs out
    pub(crate) fn wait_for_state(&self, fd: Descriptor, target: TcpState) -> Result<()> {
        for _ in 0..self.policy.retries {
            self.engine.poll(&self.table);
            let state = self.table.state(fd).ok_or(NetError::InvalidDescriptor)?;
            if state == target {
                return Ok(());
            }
            self.ticks.delay_ticks(self.policy.delay_ticks);
        }
        Err(NetError::Timeout)
    }

    /// Active open. Sends SYN and waits for ESTABLISHED; on timeout the
    /// socket is forced back to CLOSED.
    pub fn connect(&self, fd: Descriptor, remote: &SockAddrIn) -> Result<()> {
        let syn = PacketBuffer::alloc(self.table.heap(), TCP_HEADROOM, 0)?;

        self.table.with_socket(fd, |sock| {
            if sock.sock_type != SocketType::Stream || sock.state != TcpState::Closed {
                return Err(NetError::InvalidState);
            }
            if sock.local.port == 0 {
                sock.local.port = self.table.alloc_port();
            }
            sock.remote = *remote;
            self.engine.send_tcp(sock, syn, TcpFlags::SYN, None)?;
            sock.state = TcpState::SynSent;
            Ok(())
        })?;

        crate::net_trace!("[SOCKET] Connecting fd={} to {}", fd, remote);
        let started = self.ticks.current_tick();

        match self.wait_for_state(fd, TcpState::Established) {
            Ok(()) => {
                crate::net_trace!("[SOCKET] Connected fd={}", fd);
                Ok(())
            }
            Err(e) => {
                let waited = self.ticks.current_tick().wrapping_sub(started);
                crate::log_warn!(
                    "[TCP] connect fd={} to {} failed after {} ticks: {}",
                    fd,
                    remote,
                    waited,
                    e
                );
                // The descriptor may already be gone if the wait failed on it
                let _ = self.table.set_state(fd, TcpState::Closed);
                Err(e)
            }
        }
    }

    /// Close a socket and free its descriptor.
    ///
    /// Connected sockets send FIN|ACK first and wait for the peer. A socket
    /// stuck in TIME_WAIT is forced to CLOSED when the wait runs out. Any
    /// state other than CLOSED at the end leaves the socket in place.
    pub fn close(&self, fd: Descriptor) -> Result<()> {
        let fin = match self.table.state(fd).ok_or(NetError::InvalidDescriptor)? {
            TcpState::Established | TcpState::SynRcvd | TcpState::CloseWait => {
                Some(PacketBuffer::alloc(self.table.heap(), TCP_HEADROOM, 0)?)
            }
            _ => None,
        };

        if let Some(fin) = fin {
            let target = self.table.with_socket(fd, |sock| {
                let (next, target) = match sock.state {
                    TcpState::CloseWait => (TcpState::LastAck, TcpState::Closed),
                    TcpState::Established | TcpState::SynRcvd => (TcpState::FinWait1, TcpState::TimeWait),
                    // Moved by the receive path since we looked
                    _ => return Ok(None),
                };
                self.engine.send_tcp(sock, fin, TcpFlags::FIN | TcpFlags::ACK, None)?;
                crate::net_trace!("[TCP] fd={} {} -> {}", fd, sock.state, next);
                sock.state = next;
                Ok(Some(target))
            })?;

            if let Some(target) = target {
                self.wait_for_state(fd, target)?;
            }
        }

        if self.table.state(fd) == Some(TcpState::TimeWait)
            && self.wait_for_state(fd, TcpState::Closed).is_err()
        {
            crate::log_warn!("[TCP] fd={} stuck in TIME_WAIT, forcing CLOSED", fd);
            self.table.set_state(fd, TcpState::Closed)?;
        }

        match self.table.state(fd) {
            Some(TcpState::Closed) => {
                self.table.destroy(fd)?;
                crate::net_trace!("[SOCKET] Closed fd={}", fd);
                Ok(())
            }
            Some(state) => {
                crate::log_warn!("[SOCKET] close fd={} left in {}", fd, state);
                Err(NetError::InvalidState)
            }
            None => Err(NetError::InvalidDescriptor),
        }
    }

    /// Send `data` on an established connection. No partial sends.
    pub fn send(&self, fd: Descriptor, data: &[u8]) -> Result<usize> {
        let state = self.table.state(fd).ok_or(NetError::InvalidDescriptor)?;
        if state != TcpState::Established {
            return Err(NetError::NotConnected);
        }

        let buf = PacketBuffer::from_slice(self.table.heap(), TCP_HEADROOM, data)?;
        self.table.with_socket(fd, |sock| {
            if sock.state != TcpState::Established {
                return Err(NetError::NotConnected);
            }
            self.engine.send_tcp(sock, buf, TcpFlags::PSH | TcpFlags::ACK, None)
        })?;

        crate::net_trace!("[TCP] fd={} sent {} bytes", fd, data.len());
        Ok(data.len())
    }

    /// Receive one segment's worth of data into `buf`.
    ///
    /// Bytes beyond `buf.len()` are discarded with the segment.
    pub fn recv(&self, fd: Descriptor, buf: &mut [u8]) -> Result<usize> {
        let state = self.table.state(fd).ok_or(NetError::InvalidDescriptor)?;
        if state != TcpState::Established {
            return Err(NetError::NotConnected);
        }

        let pkt = self
            .engine
            .receive_tcp(&self.table, fd)
            .ok_or(NetError::IoError)?;
        let len = pkt.size().min(buf.len());
        buf[..len].copy_from_slice(&pkt.data()[..len]);
        pkt.release();
        Ok(len)
    }
}
