//! OSAL Core
//!
//! Process and thread bookkeeping layered over one `osal-api` backend, and the
//! protocol that turns a loaded module into a running process.
//!
//! # Architecture
//!
//! - **Osal**: the subsystem object; owns the backend, configuration, tracked
//!   allocator and registry, and gates everything on `init`/`deinit`
//! - **Registry**: process records, thread records and their membership
//! - **Thread**: thread creation, join, destroy and attribute queries
//! - **Process**: process lifecycle, attributes, membership and lookup
//! - **Spawn**: module spawn protocol with reverse-order rollback
//! - **Memory**: tagged heap and owning boxes for tracked allocations
//!
//! # Usage
//!
//! ```rust,ignore
//! use osal_api::OsalConfig;
//! use osal_core::Osal;
//! use osal_host::HostBackend;
//!
//! let osal = Osal::new(HostBackend::new(), OsalConfig::default());
//! osal.init()?;
//!
//! let pid = osal.spawn(module, vec!["shell".into()])?;
//! let process = osal.process_find_by_id(pid)?.unwrap();
//! let status = osal.process_wait(process, -1)?;
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod memory;
pub mod osal;
pub mod process;
pub mod registry;
pub mod spawn;
pub mod thread;

pub use memory::{TaggedHeap, TrackedBox};
pub use osal::Osal;
pub use registry::{ProcessHandle, ProcessInfo};
pub use spawn::PANIC_EXIT_STATUS;
pub use thread::ThreadBuilder;
