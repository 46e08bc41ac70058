//! Hosted platform
//!
//! Used when the core runs under an OS (unit tests, protocol simulators).
//! There is no real interrupt controller, only the flag.

pub mod interrupts;
