//! RISC-V 64 Interrupt Control
//!
//! Uses the SIE bit in sstatus CSR to enable/disable supervisor interrupts.

/// sstatus.SIE
const SSTATUS_SIE: u64 = 1 << 1;

/// Enable interrupts (set SIE bit in sstatus)
#[inline(always)]
pub fn enable() {
    unsafe {
        core::arch::asm!("csrsi sstatus, 0x2", options(nomem, nostack, preserves_flags));
    }
}

/// Disable interrupts (clear SIE bit in sstatus)
#[inline(always)]
pub fn disable() {
    unsafe {
        core::arch::asm!("csrci sstatus, 0x2", options(nomem, nostack, preserves_flags));
    }
}

/// Check if interrupts are enabled (SIE bit in sstatus)
#[inline(always)]
pub fn are_enabled() -> bool {
    let sstatus: u64;
    unsafe {
        core::arch::asm!("csrr {}, sstatus", out(reg) sstatus, options(nomem, nostack, preserves_flags));
    }
    sstatus & SSTATUS_SIE != 0
}
