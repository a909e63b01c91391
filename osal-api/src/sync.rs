//! Synchronization primitive contracts
//!
//! A backend provides [`RawMutex`] and [`RawSemaphore`] implementations; the
//! rest of the layer only sees the opaque [`Mutex`] and [`Semaphore`] handles
//! that wrap them.

use alloc::boxed::Box;
use core::fmt;

use crate::core::types::Timeout;
use crate::error::{Error, Result};

pub use spin::Mutex as SpinMutex;
pub use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, AtomicUsize, Ordering};

/// Backend mutex contract
///
/// Ownership is tracked per execution context: `unlock` has to come from the
/// context that locked. Recursive mutexes require one `unlock` per `lock`.
pub trait RawMutex: Send + Sync {
    /// Blocks until the calling context owns the mutex
    fn lock(&self) -> Result<()>;

    /// Releases one level of ownership held by the calling context
    fn unlock(&self) -> Result<()>;

    /// Returns true while any context holds the mutex
    fn is_locked(&self) -> bool;

    /// Returns true for a recursive mutex
    fn is_recursive(&self) -> bool;
}

/// Backend counting semaphore contract
///
/// `0 <= count <= max_count` holds at all times. `post` at `max_count`
/// fails with `InvalidState` and leaves the count untouched.
pub trait RawSemaphore: Send + Sync {
    /// Decrements the count, blocking per `timeout` while it is zero
    fn wait(&self, timeout: Timeout) -> Result<()>;

    /// Increments the count, waking at most one waiter
    fn post(&self) -> Result<()>;

    /// Returns the current count
    fn count(&self) -> u32;

    /// Returns the maximum count
    fn max_count(&self) -> u32;
}

/// Mutex handle
pub struct Mutex {
    raw: Box<dyn RawMutex>,
}

impl Mutex {
    /// Wraps a backend mutex
    pub fn from_raw(raw: Box<dyn RawMutex>) -> Self {
        Self { raw }
    }

    /// Locks the mutex
    pub fn lock(&self) -> Result<()> {
        self.raw.lock()
    }

    /// Unlocks the mutex
    pub fn unlock(&self) -> Result<()> {
        self.raw.unlock()
    }

    /// Returns true while the mutex is held
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Returns true for a recursive mutex
    pub fn is_recursive(&self) -> bool {
        self.raw.is_recursive()
    }

    /// Destroys the mutex
    ///
    /// A held mutex is handed back together with an `InvalidState` error.
    pub fn destroy(self) -> core::result::Result<(), (Mutex, Error)> {
        if self.raw.is_locked() {
            return Err((self, Error::InvalidState("mutex destroyed while held".into())));
        }
        Ok(())
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("recursive", &self.raw.is_recursive())
            .field("locked", &self.raw.is_locked())
            .finish()
    }
}

/// Counting semaphore handle
pub struct Semaphore {
    raw: Box<dyn RawSemaphore>,
}

impl Semaphore {
    /// Wraps a backend semaphore
    pub fn from_raw(raw: Box<dyn RawSemaphore>) -> Self {
        Self { raw }
    }

    /// Waits on the semaphore (decrement)
    pub fn wait(&self, timeout: impl Into<Timeout>) -> Result<()> {
        self.raw.wait(timeout.into())
    }

    /// Posts to the semaphore (increment)
    pub fn post(&self) -> Result<()> {
        self.raw.post()
    }

    /// Returns the current count
    pub fn count(&self) -> u32 {
        self.raw.count()
    }

    /// Returns the maximum count
    pub fn max_count(&self) -> u32 {
        self.raw.max_count()
    }

    /// Destroys the semaphore
    pub fn destroy(self) {}
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("count", &self.raw.count())
            .field("max_count", &self.raw.max_count())
            .finish()
    }
}

static_assertions::assert_impl_all!(Mutex: Send, Sync);
static_assertions::assert_impl_all!(Semaphore: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    struct FlagMutex {
        locked: AtomicBool,
    }

    impl RawMutex for FlagMutex {
        fn lock(&self) -> Result<()> {
            self.locked.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn unlock(&self) -> Result<()> {
            self.locked.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_locked(&self) -> bool {
            self.locked.load(Ordering::SeqCst)
        }

        fn is_recursive(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_destroy_held_mutex_hands_back() {
        let mutex = Mutex::from_raw(Box::new(FlagMutex { locked: AtomicBool::new(false) }));
        mutex.lock().unwrap();

        let (mutex, err) = mutex.destroy().unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        mutex.unlock().unwrap();
        assert!(mutex.destroy().is_ok());
    }
}
