//! Build-time configuration
//!
//! Sizes, limits and polling budgets shared by the heap and the socket layer.

/// Socket table slots (slot 0 is reserved as the invalid descriptor)
pub const MAX_SOCK_NUM: usize = 32;

/// First ephemeral port; the allocator wraps back here on overflow
pub const PORT_MIN: u16 = 50000;

/// Smallest arena the heap accepts, in bytes
pub const MIN_HEAP_LEN: usize = 1024;

/// Iterations of a TCP "wait for state" loop
pub const TCP_WAIT_RETRIES: u32 = 100;

/// Ticks slept between two iterations of a TCP wait
pub const TCP_WAIT_TICKS: u64 = 100;

/// Iterations of the ARP resolution loop
pub const ARP_RESOLVE_RETRIES: u32 = 100_000;

/// Microseconds slept between two ARP polls
pub const ARP_POLL_DELAY_US: u64 = 3;

/// Console key that aborts address resolution
pub const CHAR_CTRL_C: u8 = 0x03;

/// Bounded-retry budget for a blocking socket call.
///
/// The total timeout is `retries * delay_ticks`. A wait never blocks longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub retries: u32,
    pub delay_ticks: u64,
}

impl WaitPolicy {
    pub const fn new(retries: u32, delay_ticks: u64) -> Self {
        Self { retries, delay_ticks }
    }

    /// Total budget in ticks
    pub const fn budget(&self) -> u64 {
        self.retries as u64 * self.delay_ticks
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::new(TCP_WAIT_RETRIES, TCP_WAIT_TICKS)
    }
}
