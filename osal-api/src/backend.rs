//! Backend capability set
//!
//! Each primitive family is a capability trait. A platform implements all of
//! them on one type and that type is handed to the process/thread layer at
//! composition time. [`UnsupportedBackend`] is the explicit null object used
//! when no platform backend is wired in: it fails every operation with
//! `Unsupported` instead of pretending to succeed.

use alloc::boxed::Box;

use crate::core::types::Milliseconds;
use crate::error::{Result, unsupported};
use crate::queue::{Queue, RawQueue};
use crate::sync::{Mutex, RawMutex, RawSemaphore, Semaphore};
use crate::thread::{RawThread, ThreadAttributes, ThreadEntry, ThreadId};
use crate::timer::{RawTimer, Timer, TimerCallback};

/// Mutex capability
pub trait MutexBackend: Send + Sync {
    /// Creates a mutex
    fn mutex_create(&self, recursive: bool) -> Result<Box<dyn RawMutex>>;
}

/// Semaphore capability
pub trait SemaphoreBackend: Send + Sync {
    /// Creates a counting semaphore
    fn semaphore_create(&self, initial_count: u32, max_count: u32) -> Result<Box<dyn RawSemaphore>>;
}

/// Queue capability
pub trait QueueBackend: Send + Sync {
    /// Creates a queue of `capacity` items of `item_size` bytes
    fn queue_create(&self, item_size: usize, capacity: usize) -> Result<Box<dyn RawQueue>>;
}

/// Timer capability
pub trait TimerBackend: Send + Sync {
    /// Creates a stopped timer
    fn timer_create(
        &self,
        callback: TimerCallback,
        period_ms: Milliseconds,
        auto_reload: bool,
    ) -> Result<Box<dyn RawTimer>>;
}

/// Thread capability
pub trait ThreadBackend: Send + Sync {
    /// Starts a schedulable unit running `entry`
    ///
    /// Inside the new unit `thread_current` must report `attrs.id`.
    fn thread_spawn(&self, attrs: ThreadAttributes, entry: ThreadEntry) -> Result<Box<dyn RawThread>>;

    /// Returns the id of the calling context, or `None` if it has none
    fn thread_current(&self) -> Option<ThreadId>;

    /// Voluntarily yields the calling context for `ms` milliseconds
    fn thread_sleep(&self, ms: Milliseconds);
}

/// Complete capability set of one platform
pub trait Backend:
    MutexBackend + SemaphoreBackend + QueueBackend + TimerBackend + ThreadBackend + 'static
{
    /// Returns the backend name, used in diagnostics
    fn name(&self) -> &'static str;

    /// Brings the platform up; returns false if it cannot be used
    fn init(&self) -> bool;

    /// Tears the platform down; returns false on failure
    fn deinit(&self) -> bool;

    /// Creates a mutex handle
    fn create_mutex(&self, recursive: bool) -> Result<Mutex> {
        self.mutex_create(recursive).map(Mutex::from_raw)
    }

    /// Creates a semaphore handle
    fn create_semaphore(&self, initial_count: u32, max_count: u32) -> Result<Semaphore> {
        self.semaphore_create(initial_count, max_count).map(Semaphore::from_raw)
    }

    /// Creates a queue handle
    fn create_queue(&self, item_size: usize, capacity: usize) -> Result<Queue> {
        self.queue_create(item_size, capacity).map(Queue::from_raw)
    }

    /// Creates a timer handle
    fn create_timer(
        &self,
        callback: TimerCallback,
        period_ms: Milliseconds,
        auto_reload: bool,
    ) -> Result<Timer> {
        self.timer_create(callback, period_ms, auto_reload).map(Timer::from_raw)
    }
}

/// Null backend: every operation reports `Unsupported`
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedBackend;

impl MutexBackend for UnsupportedBackend {
    fn mutex_create(&self, _recursive: bool) -> Result<Box<dyn RawMutex>> {
        Err(unsupported("mutex_create"))
    }
}

impl SemaphoreBackend for UnsupportedBackend {
    fn semaphore_create(&self, _initial_count: u32, _max_count: u32) -> Result<Box<dyn RawSemaphore>> {
        Err(unsupported("semaphore_create"))
    }
}

impl QueueBackend for UnsupportedBackend {
    fn queue_create(&self, _item_size: usize, _capacity: usize) -> Result<Box<dyn RawQueue>> {
        Err(unsupported("queue_create"))
    }
}

impl TimerBackend for UnsupportedBackend {
    fn timer_create(
        &self,
        _callback: TimerCallback,
        _period_ms: Milliseconds,
        _auto_reload: bool,
    ) -> Result<Box<dyn RawTimer>> {
        Err(unsupported("timer_create"))
    }
}

impl ThreadBackend for UnsupportedBackend {
    fn thread_spawn(&self, _attrs: ThreadAttributes, _entry: ThreadEntry) -> Result<Box<dyn RawThread>> {
        Err(unsupported("thread_create"))
    }

    fn thread_current(&self) -> Option<ThreadId> {
        None
    }

    fn thread_sleep(&self, _ms: Milliseconds) {}
}

impl Backend for UnsupportedBackend {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn init(&self) -> bool {
        false
    }

    fn deinit(&self) -> bool {
        false
    }
}
