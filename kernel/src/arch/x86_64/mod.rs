//! x86_64 bare-metal platform

pub mod interrupts;
pub mod serial;
