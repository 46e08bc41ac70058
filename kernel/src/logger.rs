//! Firmware logging
//!
//! Leveled log lines with a tick timestamp, written to the console.
//! The `mem-trace` and `net-trace` features turn on the verbose trace
//! macros; with the features off they expand to nothing.

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO ",
            LogLevel::Warn => "WARN ",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Internal log function
#[doc(hidden)]
pub fn _log(level: LogLevel, args: core::fmt::Arguments) {
    crate::serial::_print(format_args!(
        "[{:>10}][{}] {}\n",
        crate::timer::get_tick(),
        level.as_str(),
        args
    ));
}

/// Log macro with level
#[macro_export]
macro_rules! log_level {
    ($level:expr, $($arg:tt)*) => {
        $crate::logger::_log($level, format_args!($($arg)*))
    };
}

/// Info log (default)
#[macro_export]
macro_rules! log {
    ($($arg:tt)*) => {
        $crate::log_level!($crate::logger::LogLevel::Info, $($arg)*)
    };
}

/// Debug log
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::log_level!($crate::logger::LogLevel::Debug, $($arg)*)
    };
}

/// Warning log
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::log_level!($crate::logger::LogLevel::Warn, $($arg)*)
    };
}

/// Error log
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::log_level!($crate::logger::LogLevel::Error, $($arg)*)
    };
}

/// Heap alloc/free trace (`mem-trace` feature)
#[cfg(feature = "mem-trace")]
#[macro_export]
macro_rules! mem_trace {
    ($($arg:tt)*) => {
        $crate::log_level!($crate::logger::LogLevel::Trace, $($arg)*)
    };
}

#[cfg(not(feature = "mem-trace"))]
#[macro_export]
macro_rules! mem_trace {
    ($($arg:tt)*) => {};
}

/// Socket state / demux trace (`net-trace` feature)
#[cfg(feature = "net-trace")]
#[macro_export]
macro_rules! net_trace {
    ($($arg:tt)*) => {
        $crate::log_level!($crate::logger::LogLevel::Trace, $($arg)*)
    };
}

#[cfg(not(feature = "net-trace"))]
#[macro_export]
macro_rules! net_trace {
    ($($arg:tt)*) => {};
}
