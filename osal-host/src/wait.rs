// Blocking helpers shared by every host primitive.
//
// All of them honour the layer-wide timeout convention and treat a poisoned
// lock as still usable: the protected state is plain data that is never left
// half-updated across a panic point.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use osal_api::{Error, Result, Timeout, WaitMode};

/// Locks `mutex`, recovering the guard from a poisoned lock
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Waits on `cv` while `blocked` holds, honouring `timeout`
///
/// Returns the re-acquired guard once `blocked` is false, or `Timeout` if the
/// wait expired first. The protected state is not modified on timeout.
pub(crate) fn wait_while<'a, T>(
    cv: &Condvar,
    mut guard: MutexGuard<'a, T>,
    timeout: Timeout,
    mut blocked: impl FnMut(&mut T) -> bool,
) -> Result<MutexGuard<'a, T>> {
    match timeout.mode() {
        WaitMode::Poll => {
            if blocked(&mut *guard) {
                Err(Error::Timeout)
            } else {
                Ok(guard)
            }
        }
        WaitMode::Forever => Ok(cv
            .wait_while(guard, &mut blocked)
            .unwrap_or_else(PoisonError::into_inner)),
        WaitMode::Bounded(limit) => {
            let (guard, result) = cv
                .wait_timeout_while(guard, limit, &mut blocked)
                .unwrap_or_else(PoisonError::into_inner);
            if result.timed_out() {
                Err(Error::Timeout)
            } else {
                Ok(guard)
            }
        }
    }
}
