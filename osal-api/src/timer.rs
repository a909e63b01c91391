//! Timer contract
//!
//! The callback runs on a backend-defined timer context (a dedicated thread
//! on hosted platforms, an interrupt-like context on bare metal). It may
//! preempt other work, so it must be short and must not block. It must not
//! call back into its own timer handle: `stop`, `reset` and `destroy` can wait
//! for the timer context.

use alloc::boxed::Box;
use core::fmt;

use crate::core::types::Milliseconds;
use crate::error::Result;

/// Timer callback; the opaque argument is whatever the closure captures
pub type TimerCallback = Box<dyn FnMut() + Send + 'static>;

/// Backend timer contract
pub trait RawTimer: Send + Sync {
    /// Arms the timer; starting a running timer is a no-op
    fn start(&self) -> Result<()>;

    /// Disarms the timer
    fn stop(&self) -> Result<()>;

    /// Restarts the countdown from now, starting a stopped timer
    fn reset(&self) -> Result<()>;

    /// Changes the period; a running timer picks it up on its next cycle
    fn set_period(&self, period_ms: Milliseconds) -> Result<()>;

    /// Returns the configured period
    fn period(&self) -> Milliseconds;

    /// Returns true while the timer is armed
    fn is_running(&self) -> bool;

    /// Returns true for an auto-reload timer
    fn is_auto_reload(&self) -> bool;
}

/// Timer handle
pub struct Timer {
    raw: Box<dyn RawTimer>,
}

impl Timer {
    /// Wraps a backend timer
    pub fn from_raw(raw: Box<dyn RawTimer>) -> Self {
        Self { raw }
    }

    /// Starts the timer
    pub fn start(&self) -> Result<()> {
        self.raw.start()
    }

    /// Stops the timer
    pub fn stop(&self) -> Result<()> {
        self.raw.stop()
    }

    /// Resets the countdown
    pub fn reset(&self) -> Result<()> {
        self.raw.reset()
    }

    /// Sets the timer period in milliseconds
    pub fn set_period(&self, period_ms: Milliseconds) -> Result<()> {
        self.raw.set_period(period_ms)
    }

    /// Returns the timer period in milliseconds
    pub fn period(&self) -> Milliseconds {
        self.raw.period()
    }

    /// Returns true while armed
    pub fn is_running(&self) -> bool {
        self.raw.is_running()
    }

    /// Returns true for an auto-reload timer
    pub fn is_auto_reload(&self) -> bool {
        self.raw.is_auto_reload()
    }

    /// Destroys the timer; the callback never runs afterwards
    pub fn destroy(self) {}
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("period_ms", &self.raw.period())
            .field("auto_reload", &self.raw.is_auto_reload())
            .field("running", &self.raw.is_running())
            .finish()
    }
}

static_assertions::assert_impl_all!(Timer: Send, Sync);
