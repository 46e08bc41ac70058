//! Tick service
//!
//! The core only needs a monotonically increasing tick counter and
//! busy-wait delays. Calibration lives in the board code; `SystemTick`
//! is the plain jiffy counter driven by the timer interrupt.

use core::sync::atomic::{AtomicU64, Ordering};

/// Source of time for every bounded wait in the socket layer
pub trait TickSource: Sync {
    /// Current tick count
    fn current_tick(&self) -> u64;

    /// Busy-wait for `n` ticks
    fn delay_ticks(&self, n: u64);

    /// Busy-wait for roughly `us` microseconds
    fn delay_us(&self, us: u64);
}

/// Global tick counter (incremented by the timer interrupt)
static TICK_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Increment tick counter (called by timer interrupt)
pub fn inc_tick() {
    TICK_COUNTER.fetch_add(1, Ordering::Relaxed);
}

/// Get current tick count
pub fn get_tick() -> u64 {
    TICK_COUNTER.load(Ordering::Relaxed)
}

/// Interrupt-driven tick source.
///
/// `loops_per_us` comes from the board's delay calibration.
pub struct SystemTick {
    loops_per_us: u64,
}

impl SystemTick {
    pub const fn new(loops_per_us: u64) -> Self {
        Self { loops_per_us }
    }
}

impl TickSource for SystemTick {
    fn current_tick(&self) -> u64 {
        get_tick()
    }

    fn delay_ticks(&self, n: u64) {
        let start = get_tick();
        while get_tick().wrapping_sub(start) < n {
            core::hint::spin_loop();
        }
    }

    fn delay_us(&self, us: u64) {
        for _ in 0..us.saturating_mul(self.loops_per_us) {
            core::hint::spin_loop();
        }
    }
}
