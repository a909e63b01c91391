//! Thread backend contract and thread identifiers

use alloc::boxed::Box;
use alloc::string::String;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::core::types::Priority;
use crate::error::Result;

/// Thread entry point; the entry argument is whatever the closure captures
pub type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a schedulable unit
///
/// Ids come from one process-wide counter shared by the registry and the
/// backend, so a thread the backend adopts never collides with one the
/// registry created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl ThreadId {
    /// Allocates a fresh id
    pub fn allocate() -> Self {
        ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the numeric value
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Attributes a backend needs to start a schedulable unit
#[derive(Debug, Clone)]
pub struct ThreadAttributes {
    /// Identity the new thread reports from `thread_current`
    pub id: ThreadId,
    /// Thread name
    pub name: String,
    /// Scheduling priority
    pub priority: Priority,
    /// Requested stack size in bytes
    pub stack_size: usize,
}

/// Backend handle to a started schedulable unit
pub trait RawThread: Send + Sync {
    /// Returns the thread id
    fn id(&self) -> ThreadId;

    /// Blocks until the thread terminates; returns at once if it already has
    fn join(&self) -> Result<()>;

    /// Returns true once the entry point has returned
    fn is_finished(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_ids_are_unique() {
        let a = ThreadId::allocate();
        let b = ThreadId::allocate();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }
}
