//! Host mutex and counting semaphore

use std::sync::{Condvar, Mutex};

use osal_api::error::{invalid_argument, invalid_state};
use osal_api::{RawMutex, RawSemaphore, Result, ThreadId, Timeout};

use crate::thread::current_thread_id;
use crate::wait::{lock, wait_while};

// ============================================================================
// Mutex
// ============================================================================

#[derive(Debug, Default)]
struct LockState {
    /// Owning context, `None` when free
    owner: Option<ThreadId>,
    /// Recursion depth of the owner
    depth: u32,
}

/// Mutex with per-thread ownership and optional recursion
#[derive(Debug)]
pub struct HostMutex {
    recursive: bool,
    state: Mutex<LockState>,
    released: Condvar,
}

impl HostMutex {
    /// Creates an unlocked mutex
    pub fn new(recursive: bool) -> Self {
        Self {
            recursive,
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
        }
    }

    /// Returns the recursion depth held by the owner
    pub fn depth(&self) -> u32 {
        lock(&self.state).depth
    }
}

impl RawMutex for HostMutex {
    fn lock(&self) -> Result<()> {
        let me = current_thread_id();
        let mut state = lock(&self.state);

        if state.owner == Some(me) {
            if !self.recursive {
                return Err(invalid_state("non-recursive mutex already held by caller"));
            }
            state.depth = state
                .depth
                .checked_add(1)
                .ok_or_else(|| invalid_state("mutex recursion depth overflow"))?;
            return Ok(());
        }

        let mut state = wait_while(&self.released, state, Timeout::FOREVER, |s| s.owner.is_some())?;
        state.owner = Some(me);
        state.depth = 1;
        Ok(())
    }

    fn unlock(&self) -> Result<()> {
        let me = current_thread_id();
        let mut state = lock(&self.state);

        if state.owner != Some(me) {
            return Err(invalid_state("mutex not held by caller"));
        }

        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.released.notify_one();
        }
        Ok(())
    }

    fn is_locked(&self) -> bool {
        lock(&self.state).owner.is_some()
    }

    fn is_recursive(&self) -> bool {
        self.recursive
    }
}

// ============================================================================
// Semaphore
// ============================================================================

/// Counting semaphore bounded by a maximum count
#[derive(Debug)]
pub struct HostSemaphore {
    max_count: u32,
    count: Mutex<u32>,
    posted: Condvar,
}

impl HostSemaphore {
    /// Creates a semaphore; `initial_count` may not exceed `max_count`
    pub fn new(initial_count: u32, max_count: u32) -> Result<Self> {
        if max_count == 0 {
            return Err(invalid_argument("semaphore max_count must be non-zero"));
        }
        if initial_count > max_count {
            return Err(invalid_argument("semaphore initial_count exceeds max_count"));
        }
        Ok(Self {
            max_count,
            count: Mutex::new(initial_count),
            posted: Condvar::new(),
        })
    }
}

impl RawSemaphore for HostSemaphore {
    fn wait(&self, timeout: Timeout) -> Result<()> {
        let mut count = wait_while(&self.posted, lock(&self.count), timeout, |count| *count == 0)?;
        *count -= 1;
        Ok(())
    }

    fn post(&self) -> Result<()> {
        let mut count = lock(&self.count);
        if *count >= self.max_count {
            return Err(invalid_state("semaphore already at max_count"));
        }
        *count += 1;
        drop(count);
        self.posted.notify_one();
        Ok(())
    }

    fn count(&self) -> u32 {
        *lock(&self.count)
    }

    fn max_count(&self) -> u32 {
        self.max_count
    }
}
