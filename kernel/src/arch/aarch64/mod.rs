//! aarch64 bare-metal platform

pub mod interrupts;
