//! Scripted protocol engine, tick source and console for socket tests.
//!
//! The peer answers SYN with ESTABLISHED and FIN with TIME_WAIT (or CLOSED
//! after a passive close) on the next poll. A socket found in TIME_WAIT at
//! the start of a poll expires to CLOSED.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use spin::Mutex;

use super::buffer::{self, PacketBuffer};
use super::engine::ProtocolEngine;
use super::error::{NetError, Result};
use super::socket::{Descriptor, SockAddrIn, Socket, SocketTable};
use super::tcp::{TcpFlags, TcpState};
use super::Stack;
use crate::config::WaitPolicy;
use crate::memory::heap::LockedHeap;
use crate::serial::Console;
use crate::timer::TickSource;

pub const START_TICK: u64 = 1000;

pub struct MockTicks {
    now: AtomicU64,
    micros: AtomicU64,
    reads: AtomicUsize,
}

impl MockTicks {
    fn new() -> Self {
        Self {
            now: AtomicU64::new(START_TICK),
            micros: AtomicU64::new(0),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn now(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }

    /// Total microseconds slept through `delay_us`
    pub fn micros(&self) -> u64 {
        self.micros.load(Ordering::Relaxed)
    }

    /// How often `current_tick` was consulted
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl TickSource for MockTicks {
    fn current_tick(&self) -> u64 {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.now()
    }

    fn delay_ticks(&self, n: u64) {
        self.now.fetch_add(n, Ordering::Relaxed);
    }

    fn delay_us(&self, us: u64) {
        self.micros.fetch_add(us, Ordering::Relaxed);
    }
}

#[derive(Default)]
pub struct MockConsole {
    input: Mutex<VecDeque<u8>>,
}

impl MockConsole {
    pub fn push_input(&self, bytes: &[u8]) {
        self.input.lock().extend(bytes.iter().copied());
    }
}

impl Console for MockConsole {
    fn write_str(&self, _s: &str) {}

    fn read_byte(&self) -> Option<u8> {
        self.input.lock().pop_front()
    }
}

/// How the remote end behaves
#[derive(Debug, Clone, Copy)]
pub struct Peer {
    pub answer_syn: bool,
    pub answer_fin: bool,
    pub expire_time_wait: bool,
    /// Keep sent payloads on the socket's tx queue (unacknowledged)
    pub retain_tx: bool,
}

impl Default for Peer {
    fn default() -> Self {
        Self {
            answer_syn: true,
            answer_fin: true,
            expire_time_wait: true,
            retain_tx: false,
        }
    }
}

impl Peer {
    /// Never answers
    pub fn silent() -> Self {
        Self {
            answer_syn: false,
            answer_fin: false,
            ..Self::default()
        }
    }
}

/// One packet handed to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub flags: TcpFlags,
    pub payload: Vec<u8>,
    pub headroom: usize,
    pub local_port: u16,
    pub remote: SockAddrIn,
}

impl Sent {
    fn record(sock: &Socket, buf: &PacketBuffer, flags: TcpFlags) -> Self {
        Self {
            flags,
            payload: buf.data().to_vec(),
            headroom: buf.headroom(),
            local_port: sock.local.port,
            remote: sock.remote,
        }
    }
}

pub struct MockEngine {
    heap: &'static LockedHeap,
    peer: Mutex<Peer>,
    fail_sends: AtomicBool,
    local_ip: Mutex<Option<[u8; 4]>>,
    sent: Mutex<Vec<Sent>>,
    sent_udp: Mutex<Vec<Sent>>,
    transitions: Mutex<VecDeque<(u16, TcpState)>>,
    inbound_tcp: Mutex<VecDeque<(u16, Vec<u8>)>>,
    inbound_udp: Mutex<VecDeque<(u16, SockAddrIn, Vec<u8>)>>,
    hosts: Mutex<BTreeMap<[u8; 4], [u8; 6]>>,
    arp_requests: Mutex<Vec<[u8; 4]>>,
    resolved: Mutex<BTreeMap<[u8; 4], [u8; 6]>>,
    polls: AtomicUsize,
}

impl MockEngine {
    pub fn new(heap: &'static LockedHeap) -> Self {
        Self {
            heap,
            peer: Mutex::new(Peer::default()),
            fail_sends: AtomicBool::new(false),
            local_ip: Mutex::new(Some([10, 0, 2, 15])),
            sent: Mutex::new(Vec::new()),
            sent_udp: Mutex::new(Vec::new()),
            transitions: Mutex::new(VecDeque::new()),
            inbound_tcp: Mutex::new(VecDeque::new()),
            inbound_udp: Mutex::new(VecDeque::new()),
            hosts: Mutex::new(BTreeMap::new()),
            arp_requests: Mutex::new(Vec::new()),
            resolved: Mutex::new(BTreeMap::new()),
            polls: AtomicUsize::new(0),
        }
    }

    pub fn set_peer(&self, peer: Peer) {
        *self.peer.lock() = peer;
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Relaxed);
    }

    pub fn set_local_ip(&self, ip: Option<[u8; 4]>) {
        *self.local_ip.lock() = ip;
    }

    pub fn local_ip(&self) -> Option<[u8; 4]> {
        *self.local_ip.lock()
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn sent_udp(&self) -> Vec<Sent> {
        self.sent_udp.lock().clone()
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::Relaxed)
    }

    /// Segment arriving for local port `port` on the next poll
    pub fn inject_tcp(&self, port: u16, data: &[u8]) {
        self.inbound_tcp.lock().push_back((port, data.to_vec()));
    }

    /// Datagram from `from` arriving for local port `port` on the next poll
    pub fn inject_udp(&self, port: u16, from: SockAddrIn, data: &[u8]) {
        self.inbound_udp.lock().push_back((port, from, data.to_vec()));
    }

    /// Host that answers ARP requests
    pub fn add_host(&self, ip: [u8; 4], mac: [u8; 6]) {
        self.hosts.lock().insert(ip, mac);
    }

    pub fn arp_requests(&self) -> Vec<[u8; 4]> {
        self.arp_requests.lock().clone()
    }

    pub fn poll_now(&self, table: &SocketTable) {
        self.poll(table);
    }

    fn deliver(&self, table: &SocketTable, fd: Descriptor, data: &[u8]) {
        if let Ok(buf) = PacketBuffer::from_slice(self.heap, 0, data) {
            let _ = table.deliver(fd, buf);
        }
    }
}

impl ProtocolEngine for MockEngine {
    fn send_tcp(
        &self,
        sock: &mut Socket,
        buf: PacketBuffer,
        flags: TcpFlags,
        _options: Option<&[u8]>,
    ) -> Result<()> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(NetError::IoError);
        }

        let peer = *self.peer.lock();
        self.sent.lock().push(Sent::record(sock, &buf, flags));

        let port = sock.local.port;
        if flags.contains(TcpFlags::SYN) && peer.answer_syn {
            self.transitions.lock().push_back((port, TcpState::Established));
        }
        if flags.contains(TcpFlags::FIN) && peer.answer_fin {
            let next = match sock.state {
                TcpState::CloseWait => TcpState::Closed,
                _ => TcpState::TimeWait,
            };
            self.transitions.lock().push_back((port, next));
        }

        if peer.retain_tx && !buf.is_empty() {
            buffer::enqueue(&mut sock.tx_queue, buf)?;
        }
        Ok(())
    }

    fn receive_tcp(&self, table: &SocketTable, fd: Descriptor) -> Option<PacketBuffer> {
        self.poll(table);
        table.take_rx(fd)
    }

    fn send_udp(&self, sock: &mut Socket, buf: PacketBuffer) -> Result<()> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(NetError::IoError);
        }
        self.sent_udp
            .lock()
            .push(Sent::record(sock, &buf, TcpFlags::empty()));
        Ok(())
    }

    fn receive_udp(&self, table: &SocketTable, fd: Descriptor) -> Option<PacketBuffer> {
        self.poll(table);
        table.take_rx(fd)
    }

    fn send_arp_request(&self, ip: [u8; 4]) -> Result<()> {
        self.arp_requests.lock().push(ip);
        Ok(())
    }

    fn resolved_hw_addr(&self, ip: [u8; 4]) -> Option<[u8; 6]> {
        self.resolved.lock().get(&ip).copied()
    }

    fn poll(&self, table: &SocketTable) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        let peer = *self.peer.lock();

        if peer.expire_time_wait {
            for fd in table.live_descriptors() {
                if table.state(fd) == Some(TcpState::TimeWait) {
                    let _ = table.set_state(fd, TcpState::Closed);
                }
            }
        }

        loop {
            let Some((port, state)) = self.transitions.lock().pop_front() else {
                break;
            };
            if let Some(fd) = table.find_stream_socket(port) {
                let _ = table.set_state(fd, state);
            }
        }

        loop {
            let Some((port, data)) = self.inbound_tcp.lock().pop_front() else {
                break;
            };
            if let Some(fd) = table.find_stream_socket(port) {
                self.deliver(table, fd, &data);
            }
        }

        loop {
            let Some((port, from, data)) = self.inbound_udp.lock().pop_front() else {
                break;
            };
            if let Some(fd) = table.find_datagram_socket(port) {
                let _ = table.with_socket(fd, |sock| {
                    sock.remote = from;
                    Ok(())
                });
                self.deliver(table, fd, &data);
            }
        }

        let requests = self.arp_requests();
        let hosts = self.hosts.lock();
        let mut resolved = self.resolved.lock();
        for ip in requests {
            if let Some(mac) = hosts.get(&ip) {
                resolved.insert(ip, *mac);
            }
        }
    }

    fn device_local_ip(&self) -> Result<[u8; 4]> {
        self.local_ip().ok_or(NetError::NoDevice)
    }
}

pub struct Harness {
    pub stack: Stack,
    pub engine: &'static MockEngine,
    pub ticks: &'static MockTicks,
    pub console: &'static MockConsole,
    pub heap: &'static LockedHeap,
}

/// Fresh stack over a private 64 KiB heap
pub fn harness() -> Harness {
    harness_with_policy(WaitPolicy::default())
}

pub fn harness_with_policy(policy: WaitPolicy) -> Harness {
    let heap: &'static LockedHeap = Box::leak(Box::new(LockedHeap::empty()));
    let words = Box::leak(vec![0usize; 8192].into_boxed_slice());
    heap.init_from_words(words).expect("test heap");

    let engine: &'static MockEngine = Box::leak(Box::new(MockEngine::new(heap)));
    let ticks: &'static MockTicks = Box::leak(Box::new(MockTicks::new()));
    let console: &'static MockConsole = Box::leak(Box::default());

    Harness {
        stack: Stack::new(heap, engine, ticks, console).with_wait_policy(policy),
        engine,
        ticks,
        console,
        heap,
    }
}
