//! Architecture Abstraction Layer
//!
//! The runtime core needs exactly two things from the CPU: masking
//! interrupts around critical sections, and (on x86_64) a polled UART
//! for the console. Everything else belongs to the board support code.
//!
//! Hosted builds (unit tests, simulators) get an emulated interrupt flag.

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
#[path = "x86_64/mod.rs"]
pub mod platform;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
#[path = "aarch64/mod.rs"]
pub mod platform;

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
#[path = "riscv64/mod.rs"]
pub mod platform;

#[cfg(not(any(
    all(target_arch = "x86_64", target_os = "none"),
    all(target_arch = "aarch64", target_os = "none"),
    all(target_arch = "riscv64", target_os = "none"),
)))]
#[path = "host/mod.rs"]
pub mod platform;

pub use platform::interrupts;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub use platform::serial;

/// Enable hardware interrupts
#[inline(always)]
pub fn interrupts_enable() {
    platform::interrupts::enable();
}

/// Disable hardware interrupts
#[inline(always)]
pub fn interrupts_disable() {
    platform::interrupts::disable();
}

/// Check if interrupts are currently enabled
#[inline(always)]
pub fn are_interrupts_enabled() -> bool {
    platform::interrupts::are_enabled()
}

/// Run a closure with interrupts disabled, restoring previous state after
#[inline(always)]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let were_enabled = are_interrupts_enabled();
    if were_enabled {
        interrupts_disable();
    }
    let result = f();
    if were_enabled {
        interrupts_enable();
    }
    result
}
