//! TrustBoot Runtime Core
//!
//! The only "operating system" services the boot firmware has:
//! - `memory::heap`: boundary-tag heap over a single arena, safe against
//!   interrupt-level reentrancy
//! - `netstack`: BSD-style socket layer with a polled TCP lifecycle on top
//!   of an external protocol engine
//!
//! There is no scheduler. Every wait is a bounded busy-poll.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
pub mod logger;
pub mod serial;

pub mod arch;
pub mod config;
pub mod memory;
pub mod netstack;
pub mod sync;
pub mod timer;

pub use memory::heap::{HeapError, LockedHeap, HEAP};
pub use netstack::{NetError, Stack};
