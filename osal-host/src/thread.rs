//! Host threads
//!
//! Each spawned unit is a named `std::thread`. Identity lives in a
//! thread-local so `thread_current` reports the registry id inside the new
//! thread; threads that were not started through the backend are given a
//! fresh id on first use.

use std::cell::Cell;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use osal_api::error::{invalid_argument, invalid_state};
use osal_api::{Error, RawThread, Result, ThreadAttributes, ThreadEntry, ThreadId};

use crate::wait::lock;

thread_local! {
    static CURRENT: Cell<Option<ThreadId>> = const { Cell::new(None) };
}

/// Returns the id of the calling thread, adopting it if it has none
pub fn current_thread_id() -> ThreadId {
    CURRENT.with(|current| match current.get() {
        Some(id) => id,
        None => {
            let id = ThreadId::allocate();
            current.set(Some(id));
            id
        }
    })
}

#[derive(Debug, Default)]
struct Completion {
    done: Mutex<bool>,
    finished: Condvar,
}

impl Completion {
    fn finish(&self) {
        *lock(&self.done) = true;
        self.finished.notify_all();
    }
}

/// Marks completion even if the entry point unwinds
struct FinishGuard(Arc<Completion>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Handle to a thread started by the host backend
#[derive(Debug)]
pub struct HostThread {
    id: ThreadId,
    completion: Arc<Completion>,
}

impl HostThread {
    /// Starts `entry` on a new OS thread
    ///
    /// The stack is raised to at least `min_stack_size` bytes. Priorities are
    /// not applied on hosted platforms.
    pub fn spawn(attrs: ThreadAttributes, entry: ThreadEntry, min_stack_size: usize) -> Result<Self> {
        if attrs.name.contains('\0') {
            return Err(invalid_argument("thread name contains NUL"));
        }
        if attrs.priority != 0 {
            log::trace!("thread {} priority {} not applied on host", attrs.name, attrs.priority);
        }

        let id = attrs.id;
        let completion = Arc::new(Completion::default());
        let guard = FinishGuard(Arc::clone(&completion));

        thread::Builder::new()
            .name(attrs.name.clone())
            .stack_size(attrs.stack_size.max(min_stack_size))
            .spawn(move || {
                let _guard = guard;
                CURRENT.with(|current| current.set(Some(id)));
                entry();
            })
            .map_err(|e| {
                log::error!("failed to spawn thread {}: {}", attrs.name, e);
                Error::OutOfMemory
            })?;

        Ok(Self { id, completion })
    }
}

impl RawThread for HostThread {
    fn id(&self) -> ThreadId {
        self.id
    }

    fn join(&self) -> Result<()> {
        if current_thread_id() == self.id {
            return Err(invalid_state("thread cannot join itself"));
        }

        let done = lock(&self.completion.done);
        let _done = self
            .completion
            .finished
            .wait_while(done, |done| !*done)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(())
    }

    fn is_finished(&self) -> bool {
        *lock(&self.completion.done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn attrs(name: &str) -> ThreadAttributes {
        ThreadAttributes {
            id: ThreadId::allocate(),
            name: name.into(),
            priority: 0,
            stack_size: 1024,
        }
    }

    #[test]
    fn test_spawned_thread_reports_assigned_id() {
        let attrs = attrs("worker");
        let expected = attrs.id;
        let (tx, rx) = mpsc::channel();

        let handle = HostThread::spawn(attrs, Box::new(move || {
            tx.send(current_thread_id()).unwrap();
        }), 64 * 1024)
        .unwrap();

        handle.join().unwrap();
        assert!(handle.is_finished());
        assert_eq!(rx.recv().unwrap(), expected);
    }

    #[test]
    fn test_foreign_thread_gets_stable_id() {
        let first = current_thread_id();
        assert_eq!(current_thread_id(), first);

        let other = thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(other, first);
    }

    #[test]
    fn test_name_with_nul_rejected() {
        let result = HostThread::spawn(attrs("bad\0name"), Box::new(|| {}), 64 * 1024);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_panicking_entry_still_finishes() {
        let handle = HostThread::spawn(attrs("panics"), Box::new(|| panic!("boom")), 64 * 1024).unwrap();
        handle.join().unwrap();
        assert!(handle.is_finished());
    }
}
