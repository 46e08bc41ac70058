//! riscv64 bare-metal platform (S-mode)

pub mod interrupts;
