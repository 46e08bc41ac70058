//! Console output
//!
//! The firmware talks to the outside world over one debug UART. The board
//! code registers it once as a `Console`; until then output is dropped.
//!
//! - x86_64 bare metal: `arch::serial::Uart` (COM1)
//! - elsewhere: whatever the board provides

use core::fmt;
use spin::Once;

/// Byte-oriented debug console
pub trait Console: Sync {
    /// Write a string (blocking)
    fn write_str(&self, s: &str);

    /// Try to read a byte (non-blocking)
    fn read_byte(&self) -> Option<u8>;
}

static CONSOLE: Once<&'static dyn Console> = Once::new();

/// Register the boot console. Only the first registration takes effect.
pub fn init(console: &'static dyn Console) {
    CONSOLE.call_once(|| console);
}

/// Registered console, if any
pub fn console() -> Option<&'static dyn Console> {
    CONSOLE.get().copied()
}

/// Adapter so `core::fmt` can target the console
struct ConsoleWriter(&'static dyn Console);

impl fmt::Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

/// Print to console (internal use)
#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;

    let Some(console) = console() else {
        return;
    };

    // Keep an interrupt handler from interleaving a line
    crate::arch::without_interrupts(|| {
        let _ = ConsoleWriter(console).write_fmt(args);
    });
}

/// Try to read a byte from the console (non-blocking)
pub fn read_byte() -> Option<u8> {
    console().and_then(|c| c.read_byte())
}

/// Print to console
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!($($arg)*))
    };
}

/// Print to console with newline
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($fmt:expr) => ($crate::serial_print!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::serial_print!(
        concat!($fmt, "\n"), $($arg)*
    ));
}
