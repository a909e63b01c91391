//! Host timers
//!
//! Every timer owns one worker thread that sleeps until the next deadline and
//! runs the callback with the state lock released. Dropping the timer stops
//! the worker and joins it, so the callback never runs after `destroy`.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use osal_api::error::invalid_argument;
use osal_api::{Error, Milliseconds, RawTimer, Result, TimerCallback};

use crate::wait::lock;

#[derive(Debug)]
struct TimerState {
    running: bool,
    period_ms: Milliseconds,
    /// Next expiry while running
    deadline: Option<Instant>,
    shutdown: bool,
}

impl TimerState {
    fn arm(&mut self, now: Instant) {
        self.running = true;
        self.deadline = Some(now + period(self.period_ms));
    }

    fn disarm(&mut self) {
        self.running = false;
        self.deadline = None;
    }
}

#[derive(Debug)]
struct Shared {
    auto_reload: bool,
    state: Mutex<TimerState>,
    changed: Condvar,
}

fn period(ms: Milliseconds) -> Duration {
    Duration::from_millis(u64::from(ms))
}

/// Timer backed by a dedicated worker thread
#[derive(Debug)]
pub struct HostTimer {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl HostTimer {
    /// Creates a stopped timer
    pub fn new(callback: TimerCallback, period_ms: Milliseconds, auto_reload: bool) -> Result<Self> {
        if period_ms == 0 {
            return Err(invalid_argument("timer period must be non-zero"));
        }

        let shared = Arc::new(Shared {
            auto_reload,
            state: Mutex::new(TimerState {
                running: false,
                period_ms,
                deadline: None,
                shutdown: false,
            }),
            changed: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("osal-timer".into())
            .spawn(move || run_worker(&worker_shared, callback))
            .map_err(|e| {
                log::error!("failed to start timer worker: {}", e);
                Error::OutOfMemory
            })?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    fn update(&self, f: impl FnOnce(&mut TimerState)) {
        let mut state = lock(&self.shared.state);
        f(&mut state);
        drop(state);
        self.shared.changed.notify_one();
    }
}

fn run_worker(shared: &Shared, mut callback: TimerCallback) {
    let mut state = lock(&shared.state);
    loop {
        if state.shutdown {
            return;
        }

        // `deadline` is set exactly while the timer is running.
        let Some(deadline) = state.deadline else {
            state = shared
                .changed
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            continue;
        };

        let now = Instant::now();
        if now < deadline {
            state = shared
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .0;
            continue;
        }

        if shared.auto_reload {
            let next = deadline + period(state.period_ms);
            state.deadline = Some(if next > now { next } else { now + period(state.period_ms) });
        } else {
            state.disarm();
        }

        drop(state);
        callback();
        state = lock(&shared.state);
    }
}

impl RawTimer for HostTimer {
    fn start(&self) -> Result<()> {
        self.update(|state| {
            if !state.running {
                state.arm(Instant::now());
            }
        });
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.update(TimerState::disarm);
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        self.update(|state| state.arm(Instant::now()));
        Ok(())
    }

    fn set_period(&self, period_ms: Milliseconds) -> Result<()> {
        if period_ms == 0 {
            return Err(invalid_argument("timer period must be non-zero"));
        }
        // The armed deadline is kept; the new period applies from the next cycle.
        lock(&self.shared.state).period_ms = period_ms;
        Ok(())
    }

    fn period(&self) -> Milliseconds {
        lock(&self.shared.state).period_ms
    }

    fn is_running(&self) -> bool {
        lock(&self.shared.state).running
    }

    fn is_auto_reload(&self) -> bool {
        self.shared.auto_reload
    }
}

impl Drop for HostTimer {
    fn drop(&mut self) {
        self.update(|state| {
            state.disarm();
            state.shutdown = true;
        });

        if let Some(worker) = self.worker.take() {
            // A callback dropping its own timer cannot wait for itself.
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                log::warn!("timer worker panicked");
            }
        }
    }
}
