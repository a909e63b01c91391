//! Configuration of the process/thread layer

use crate::core::types::{Pid, Priority};
use crate::error::{Result, invalid_argument};

/// Stack size used when a module does not request one
pub const DEFAULT_STACK_SIZE: usize = 1024;

/// Priority used when the caller has none to inherit
pub const DEFAULT_PRIORITY: Priority = 0;

/// Maximum number of live processes
pub const NPROC: usize = 64;

/// Tunables of the process/thread layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsalConfig {
    /// Stack size for spawned modules that request `0`
    pub default_stack_size: usize,
    /// Priority for spawned modules when the caller's is `0` or unknown
    pub default_priority: Priority,
    /// First process id handed out
    pub first_pid: Pid,
    /// Live process limit; creation past it reports `OutOfMemory`
    pub max_processes: usize,
}

impl Default for OsalConfig {
    fn default() -> Self {
        Self {
            default_stack_size: DEFAULT_STACK_SIZE,
            default_priority: DEFAULT_PRIORITY,
            first_pid: 1,
            max_processes: NPROC,
        }
    }
}

impl OsalConfig {
    /// Sets the default stack size
    pub fn with_default_stack_size(mut self, stack_size: usize) -> Self {
        self.default_stack_size = stack_size;
        self
    }

    /// Sets the default priority
    pub fn with_default_priority(mut self, priority: Priority) -> Self {
        self.default_priority = priority;
        self
    }

    /// Sets the first process id
    pub fn with_first_pid(mut self, pid: Pid) -> Self {
        self.first_pid = pid;
        self
    }

    /// Sets the live process limit
    pub fn with_max_processes(mut self, max: usize) -> Self {
        self.max_processes = max;
        self
    }

    /// Checks the configuration for values the layer cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.default_stack_size == 0 {
            return Err(invalid_argument("default_stack_size must be non-zero"));
        }
        if self.first_pid == 0 {
            return Err(invalid_argument("first_pid must be non-zero"));
        }
        if self.max_processes == 0 {
            return Err(invalid_argument("max_processes must be non-zero"));
        }
        Ok(())
    }
}
