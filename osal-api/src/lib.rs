//! OSAL API - Primitive contracts and handle types for the OS abstraction layer
//!
//! This crate defines the uniform contract every platform backend has to
//! satisfy so that a module runtime can run identical concurrency-dependent
//! code on top of different operating systems or real-time kernels.
//!
//! # Architecture
//!
//! The API is organized into several key modules:
//!
//! - **Core**: Shared types such as the timeout convention and process state
//! - **Error**: The error taxonomy shared by every operation
//! - **Sync**: Mutex and counting semaphore contracts
//! - **Queue**: Bounded fixed-item-size FIFO contract
//! - **Timer**: One-shot and auto-reload timer contract
//! - **Thread**: Schedulable unit contract and thread identifiers
//! - **Module**: External collaborators (module runtime, tracked allocator)
//! - **Backend**: The capability set a platform provides, plus the null backend
//! - **Config**: Tunables for the process/thread layer
//!
//! # Design Principles
//!
//! - **One backend per platform**: each primitive family is a capability trait
//!   and exactly one implementation is selected at composition time
//! - **Explicit null object**: [`backend::UnsupportedBackend`] reports
//!   `Unsupported` for every operation instead of silently succeeding
//! - **Opaque handles**: callers never see how a backend represents a primitive
//!
//! # Usage
//!
//! ```rust
//! use osal_api::backend::{SemaphoreBackend, UnsupportedBackend};
//! use osal_api::Error;
//!
//! let backend = UnsupportedBackend;
//! assert!(matches!(backend.semaphore_create(0, 1), Err(Error::Unsupported(_))));
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![allow(dead_code)]

extern crate alloc;

// Core modules
pub mod core;
pub mod error;
pub mod sync;
pub mod queue;
pub mod timer;
pub mod thread;
pub mod module;
pub mod backend;
pub mod config;

// Re-export commonly used types
pub use crate::core::types::*;
pub use crate::error::{Error, Result};
pub use crate::sync::{Mutex, Semaphore, RawMutex, RawSemaphore};
pub use crate::queue::{Queue, RawQueue};
pub use crate::timer::{Timer, RawTimer, TimerCallback};
pub use crate::thread::{ThreadId, ThreadAttributes, ThreadEntry, RawThread};
pub use crate::module::{ModuleRuntime, TrackedAllocator};
pub use crate::backend::{Backend, UnsupportedBackend};
pub use crate::config::OsalConfig;
