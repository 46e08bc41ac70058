//! Socket layer errors

use core::fmt;

/// POSIX error numbers surfaced by the outward socket API
pub mod errno {
    pub const EINTR: i32 = 4;
    pub const EIO: i32 = 5;
    pub const ENOMEM: i32 = 12;
    pub const ENODEV: i32 = 19;
    pub const EINVAL: i32 = 22;
    pub const ENOTCONN: i32 = 107;
    pub const ETIMEDOUT: i32 = 110;
    pub const EHOSTUNREACH: i32 = 113;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    /// Heap exhausted while allocating a socket or packet buffer
    OutOfMemory,
    /// All descriptors in use
    NoSpace,
    /// Descriptor out of range or not allocated
    InvalidDescriptor,
    /// Operation not legal in the socket's current state
    InvalidState,
    /// Bounded wait ran out
    Timeout,
    NotConnected,
    /// Nothing to receive, or the engine refused the packet
    IoError,
    /// Interrupted from the console
    Cancelled,
    /// Address resolution got no answer
    Unreachable,
    /// No network device, or the stack is not initialized
    NoDevice,
}

impl NetError {
    /// Negative errno for the C-style API
    pub const fn errno(self) -> i32 {
        let code = match self {
            NetError::OutOfMemory => errno::ENOMEM,
            NetError::NoSpace => errno::ENODEV,
            NetError::InvalidDescriptor => errno::EINVAL,
            NetError::InvalidState => errno::EINVAL,
            NetError::Timeout => errno::ETIMEDOUT,
            NetError::NotConnected => errno::ENOTCONN,
            NetError::IoError => errno::EIO,
            NetError::Cancelled => errno::EINTR,
            NetError::Unreachable => errno::EHOSTUNREACH,
            NetError::NoDevice => errno::ENODEV,
        };
        -code
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            NetError::OutOfMemory => "out of memory",
            NetError::NoSpace => "socket table full",
            NetError::InvalidDescriptor => "invalid descriptor",
            NetError::InvalidState => "invalid socket state",
            NetError::Timeout => "timed out",
            NetError::NotConnected => "not connected",
            NetError::IoError => "I/O error",
            NetError::Cancelled => "cancelled",
            NetError::Unreachable => "host unreachable",
            NetError::NoDevice => "no network device",
        };
        f.write_str(msg)
    }
}

pub type Result<T> = core::result::Result<T, NetError>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_errno_is_negative() {
        assert_eq!(NetError::Timeout.errno(), -110);
        assert_eq!(NetError::NoSpace.errno(), -19);
        assert_eq!(NetError::IoError.errno(), -5);
        assert_eq!(NetError::InvalidState.to_string(), "invalid socket state");
    }
}
