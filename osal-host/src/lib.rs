//! OSAL Host
//!
//! Backend for hosted platforms, built on the standard library's threads,
//! mutexes and condition variables. It satisfies every primitive contract of
//! `osal-api` and is the backend used when the layer runs on a desktop or
//! server operating system.
//!
//! # Policies
//!
//! - **Mutex**: relocking a non-recursive mutex from its owner and unlocking
//!   from a non-owner both report `InvalidState`.
//! - **Semaphore**: `post` at the maximum count fails with `InvalidState`.
//! - **Timer**: every timer runs its callback on its own worker thread; a new
//!   period applies from the next cycle.
//! - **Thread**: priorities are recorded but not applied; stacks are raised to
//!   [`HostConfig::min_stack_size`].
//!
//! # Usage
//!
//! ```rust
//! use osal_api::Backend;
//! use osal_host::HostBackend;
//!
//! let backend = HostBackend::new();
//! assert!(backend.init());
//!
//! let sem = backend.create_semaphore(0, 1).unwrap();
//! sem.post().unwrap();
//! sem.wait(-1).unwrap();
//! ```

pub mod backend;
pub mod queue;
pub mod sync;
pub mod thread;
pub mod timer;

mod wait;

pub use backend::{HostBackend, HostConfig};
pub use thread::current_thread_id;
