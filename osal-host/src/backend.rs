//! Host backend wiring

use std::time::Duration;

use osal_api::backend::{MutexBackend, QueueBackend, SemaphoreBackend, ThreadBackend, TimerBackend};
use osal_api::{
    Backend, Milliseconds, RawMutex, RawQueue, RawSemaphore, RawThread, RawTimer, Result,
    ThreadAttributes, ThreadEntry, ThreadId, TimerCallback,
};

use crate::queue::HostQueue;
use crate::sync::{HostMutex, HostSemaphore};
use crate::thread::{HostThread, current_thread_id};
use crate::timer::HostTimer;

/// Smallest stack the host hands to a new thread, in bytes
pub const DEFAULT_MIN_STACK_SIZE: usize = 64 * 1024;

/// Host backend tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConfig {
    /// Requested stack sizes below this are raised to it
    pub min_stack_size: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            min_stack_size: DEFAULT_MIN_STACK_SIZE,
        }
    }
}

/// Backend built on `std::thread` and `std::sync`
#[derive(Debug, Clone, Default)]
pub struct HostBackend {
    config: HostConfig,
}

impl HostBackend {
    /// Creates a backend with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend with `config`
    pub fn with_config(config: HostConfig) -> Self {
        Self { config }
    }

    /// Returns the active configuration
    pub fn config(&self) -> &HostConfig {
        &self.config
    }
}

impl MutexBackend for HostBackend {
    fn mutex_create(&self, recursive: bool) -> Result<Box<dyn RawMutex>> {
        Ok(Box::new(HostMutex::new(recursive)))
    }
}

impl SemaphoreBackend for HostBackend {
    fn semaphore_create(&self, initial_count: u32, max_count: u32) -> Result<Box<dyn RawSemaphore>> {
        Ok(Box::new(HostSemaphore::new(initial_count, max_count)?))
    }
}

impl QueueBackend for HostBackend {
    fn queue_create(&self, item_size: usize, capacity: usize) -> Result<Box<dyn RawQueue>> {
        Ok(Box::new(HostQueue::new(item_size, capacity)?))
    }
}

impl TimerBackend for HostBackend {
    fn timer_create(
        &self,
        callback: TimerCallback,
        period_ms: Milliseconds,
        auto_reload: bool,
    ) -> Result<Box<dyn RawTimer>> {
        Ok(Box::new(HostTimer::new(callback, period_ms, auto_reload)?))
    }
}

impl ThreadBackend for HostBackend {
    fn thread_spawn(&self, attrs: ThreadAttributes, entry: ThreadEntry) -> Result<Box<dyn RawThread>> {
        log::debug!("spawning host thread {} ({})", attrs.name, attrs.id);
        Ok(Box::new(HostThread::spawn(attrs, entry, self.config.min_stack_size)?))
    }

    fn thread_current(&self) -> Option<ThreadId> {
        Some(current_thread_id())
    }

    fn thread_sleep(&self, ms: Milliseconds) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

impl Backend for HostBackend {
    fn name(&self) -> &'static str {
        "host"
    }

    fn init(&self) -> bool {
        log::info!("host backend ready (min stack {} bytes)", self.config.min_stack_size);
        true
    }

    fn deinit(&self) -> bool {
        log::info!("host backend stopped");
        true
    }
}
