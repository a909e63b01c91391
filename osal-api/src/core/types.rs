//! Core types used throughout the OS abstraction layer

use core::fmt;
use core::time::Duration;

/// Process identifier type
pub type Pid = u32;

/// User identifier type
pub type Uid = u32;

/// Thread and process priority type
pub type Priority = i32;

/// Time in milliseconds
pub type Milliseconds = u32;

/// Timeout shared by every blocking operation.
///
/// The raw value follows the platform convention: `0` polls without
/// blocking, a negative value blocks with no time bound and a positive value
/// bounds the wait to that many milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeout(i32);

/// How a [`Timeout`] has to be honoured by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Try once and report `Timeout` if the condition does not hold
    Poll,
    /// Block until the condition holds
    Forever,
    /// Block for at most the given duration
    Bounded(Duration),
}

impl Timeout {
    /// Non-blocking attempt
    pub const NO_WAIT: Timeout = Timeout(0);

    /// Block with no time bound
    pub const FOREVER: Timeout = Timeout(-1);

    /// Creates a timeout from the raw platform value
    pub const fn from_raw(raw: i32) -> Self {
        Timeout(raw)
    }

    /// Creates a bounded timeout, saturating at `i32::MAX` milliseconds
    pub const fn from_millis(ms: u32) -> Self {
        if ms > i32::MAX as u32 {
            Timeout(i32::MAX)
        } else {
            Timeout(ms as i32)
        }
    }

    /// Returns the raw platform value
    pub const fn as_raw(self) -> i32 {
        self.0
    }

    /// Returns true for a non-blocking attempt
    pub const fn is_poll(self) -> bool {
        self.0 == 0
    }

    /// Returns true when the wait has no time bound
    pub const fn is_forever(self) -> bool {
        self.0 < 0
    }

    /// Classifies the timeout
    pub fn mode(self) -> WaitMode {
        match self.0 {
            0 => WaitMode::Poll,
            raw if raw < 0 => WaitMode::Forever,
            raw => WaitMode::Bounded(Duration::from_millis(raw as u64)),
        }
    }
}

impl From<i32> for Timeout {
    fn from(raw: i32) -> Self {
        Timeout(raw)
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        let ms = duration.as_millis();
        if ms == 0 && !duration.is_zero() {
            // Sub-millisecond waits still have to block.
            Timeout(1)
        } else if ms > i32::MAX as u128 {
            Timeout(i32::MAX)
        } else {
            Timeout(ms as i32)
        }
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode() {
            WaitMode::Poll => write!(f, "no-wait"),
            WaitMode::Forever => write!(f, "forever"),
            WaitMode::Bounded(_) => write!(f, "{}ms", self.0),
        }
    }
}

/// Lifecycle state of a process
///
/// `Created` is the initial state and `Zombie` is terminal until the process
/// is reaped or destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    /// Allocated but no thread has been bound yet
    Created,
    /// At least one member thread was started
    Running,
    /// Suspended by request
    Suspended,
    /// Killed; member threads may still be finishing
    Terminated,
    /// Terminated and every member thread has exited
    Zombie,
}

impl ProcessState {
    /// Returns true once the process has been terminated
    pub const fn is_finished(self) -> bool {
        matches!(self, ProcessState::Terminated | ProcessState::Zombie)
    }

    /// Returns true if `kill` may move the process to `Terminated`
    pub const fn is_killable(self) -> bool {
        matches!(
            self,
            ProcessState::Created | ProcessState::Running | ProcessState::Suspended
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Created => "created",
            ProcessState::Running => "running",
            ProcessState::Suspended => "suspended",
            ProcessState::Terminated => "terminated",
            ProcessState::Zombie => "zombie",
        };
        f.write_str(name)
    }
}
