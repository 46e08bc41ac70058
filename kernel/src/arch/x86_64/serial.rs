//! x86_64 Serial Console (UART 16550 on COM1)
//!
//! Polled driver, no interrupts. Registered as the boot console so the
//! logger has somewhere to write and address resolution can read ctrl-C.

use x86_64::instructions::port::Port;

use crate::serial::Console;

/// COM1 base I/O port
const COM1: u16 = 0x3F8;

/// Line status register: data ready
const LSR_DATA_READY: u8 = 0x01;
/// Line status register: transmit holding register empty
const LSR_THR_EMPTY: u8 = 0x20;

pub struct Uart {
    base: u16,
}

impl Uart {
    pub const fn com1() -> Self {
        Self { base: COM1 }
    }

    /// Program 115200 8N1 with FIFOs enabled
    pub fn init(&self) {
        unsafe {
            self.outb(1, 0x00); // Disable all interrupts
            self.outb(3, 0x80); // Enable DLAB (set baud rate divisor)
            self.outb(0, 0x01); // Set divisor to 1 (115200 baud)
            self.outb(1, 0x00); //   (hi byte)
            self.outb(3, 0x03); // 8 bits, no parity, one stop bit
            self.outb(2, 0xC7); // Enable FIFO, clear them, 14-byte threshold
            self.outb(4, 0x0B); // RTS/DSR set
        }
    }

    unsafe fn outb(&self, offset: u16, value: u8) {
        Port::<u8>::new(self.base + offset).write(value);
    }

    unsafe fn inb(&self, offset: u16) -> u8 {
        Port::<u8>::new(self.base + offset).read()
    }

    fn write_byte(&self, byte: u8) {
        unsafe {
            while self.inb(5) & LSR_THR_EMPTY == 0 {
                core::hint::spin_loop();
            }
            self.outb(0, byte);
        }
    }
}

impl Console for Uart {
    fn write_str(&self, s: &str) {
        for b in s.bytes() {
            if b == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(b);
        }
    }

    fn read_byte(&self) -> Option<u8> {
        unsafe {
            if self.inb(5) & LSR_DATA_READY != 0 {
                Some(self.inb(0))
            } else {
                None
            }
        }
    }
}
