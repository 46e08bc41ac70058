//! x86_64 Interrupt Control
//!
//! Enable, disable and query the IF flag in RFLAGS.

use x86_64::instructions::interrupts;

/// Enable interrupts (STI)
#[inline(always)]
pub fn enable() {
    interrupts::enable();
}

/// Disable interrupts (CLI)
#[inline(always)]
pub fn disable() {
    interrupts::disable();
}

/// Check if interrupts are enabled (IF flag in RFLAGS)
#[inline(always)]
pub fn are_enabled() -> bool {
    interrupts::are_enabled()
}
