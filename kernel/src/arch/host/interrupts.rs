//! Emulated interrupt flag
//!
//! Mirrors the IF/DAIF/SIE semantics closely enough for the critical
//! sections to be observable. Under the test harness every thread plays
//! its own CPU, so concurrently running tests do not see each other's
//! critical sections.

#[cfg(not(test))]
mod flag {
    use core::sync::atomic::{AtomicBool, Ordering};

    static ENABLED: AtomicBool = AtomicBool::new(true);

    pub fn set(enabled: bool) {
        ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn get() -> bool {
        ENABLED.load(Ordering::SeqCst)
    }
}


/// Enable interrupts
#[inline(always)]
pub fn enable() {
    flag::set(true);
}

/// Disable interrupts
#[inline(always)]
pub fn disable() {
    flag::set(false);
}

/// Check if interrupts are enabled
#[inline(always)]
pub fn are_enabled() -> bool {
    flag::get()
}
