//! Error handling module for the OS abstraction layer

use core::fmt;
use alloc::string::{String, ToString};

/// `ENOSYS`: function not implemented
pub const ENOSYS: i32 = 38;
/// `EINVAL`: invalid argument
pub const EINVAL: i32 = 22;
/// `ENOMEM`: out of memory
pub const ENOMEM: i32 = 12;
/// `ETIMEDOUT`: connection timed out
pub const ETIMEDOUT: i32 = 110;
/// `EPERM`: operation not permitted
pub const EPERM: i32 = 1;

/// Common error type used by every OSAL operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The active backend does not implement the operation
    Unsupported(&'static str),
    /// A required input is missing or malformed
    InvalidArgument(String),
    /// Allocation failed for a process, spawn context or thread
    OutOfMemory,
    /// A bounded wait expired; the awaited resource is unchanged
    Timeout,
    /// The handle is in a state that forbids the operation
    InvalidState(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unsupported(op) => write!(f, "Unsupported operation: {}", op),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::OutOfMemory => write!(f, "Out of memory"),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl Error {
    /// Returns the negative errno-style code reported across the C boundary
    pub fn code(&self) -> i32 {
        match self {
            Error::Unsupported(_) => -ENOSYS,
            Error::InvalidArgument(_) => -EINVAL,
            Error::OutOfMemory => -ENOMEM,
            Error::Timeout => -ETIMEDOUT,
            Error::InvalidState(_) => -EPERM,
        }
    }

    /// Maps a negative errno-style code back to an error
    ///
    /// Returns `None` for success (`0`), positive values and unknown codes.
    pub fn from_code(code: i32) -> Option<Error> {
        match code.checked_neg()? {
            ENOSYS => Some(Error::Unsupported("backend")),
            EINVAL => Some(Error::InvalidArgument("reported by backend".to_string())),
            ENOMEM => Some(Error::OutOfMemory),
            ETIMEDOUT => Some(Error::Timeout),
            EPERM => Some(Error::InvalidState("reported by backend".to_string())),
            _ => None,
        }
    }

    /// Returns true for an expired wait
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}

/// Result type for operations that can fail
pub type Result<T> = core::result::Result<T, Error>;

/// Creates a new unsupported error for the named operation
pub fn unsupported(op: &'static str) -> Error {
    Error::Unsupported(op)
}

/// Creates a new invalid argument error
pub fn invalid_argument(msg: &str) -> Error {
    Error::InvalidArgument(msg.to_string())
}

/// Creates a new invalid state error
pub fn invalid_state(msg: &str) -> Error {
    Error::InvalidState(msg.to_string())
}

/// Creates a new out of memory error
pub fn out_of_memory() -> Error {
    Error::OutOfMemory
}

/// Creates a new timeout error
pub fn timeout() -> Error {
    Error::Timeout
}
