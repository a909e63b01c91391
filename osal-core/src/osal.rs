//! The subsystem object
//!
//! [`Osal`] composes one backend with the process/thread registry and the
//! tracked allocator. Everything except primitive handles already created is
//! valid only between [`Osal::init`] and [`Osal::deinit`].

use alloc::sync::Arc;
use core::fmt;

use osal_api::error::{invalid_state, unsupported};
use osal_api::{
    Backend, Milliseconds, Mutex, OsalConfig, Queue, Result, Semaphore, Timer, TimerCallback,
    TrackedAllocator,
};
use osal_api::sync::{AtomicBool, Ordering, SpinMutex};

use crate::memory::TaggedHeap;
use crate::registry::Tables;

/// Process/thread layer over one platform backend
pub struct Osal<B: Backend> {
    pub(crate) backend: B,
    pub(crate) config: OsalConfig,
    pub(crate) allocator: Arc<dyn TrackedAllocator>,
    pub(crate) tables: SpinMutex<Tables>,
    ready: AtomicBool,
}

impl<B: Backend> Osal<B> {
    /// Creates an uninitialized subsystem using the global heap for spawn contexts
    pub fn new(backend: B, config: OsalConfig) -> Arc<Self> {
        Self::with_allocator(backend, config, Arc::new(TaggedHeap::new()))
    }

    /// Creates an uninitialized subsystem with an explicit tracked allocator
    pub fn with_allocator(
        backend: B,
        config: OsalConfig,
        allocator: Arc<dyn TrackedAllocator>,
    ) -> Arc<Self> {
        let first_pid = config.first_pid;
        Arc::new(Self {
            backend,
            config,
            allocator,
            tables: SpinMutex::new(Tables::new(first_pid)),
            ready: AtomicBool::new(false),
        })
    }

    /// Brings the backend up and opens the registry
    pub fn init(&self) -> Result<()> {
        self.config.validate()?;
        if self.ready.load(Ordering::Acquire) {
            return Err(invalid_state("osal already initialized"));
        }
        if !self.backend.init() {
            log::error!("backend {} failed to initialize", self.backend.name());
            return Err(unsupported("init"));
        }
        self.ready.store(true, Ordering::Release);
        log::info!(
            "osal initialized on {} backend (max {} processes)",
            self.backend.name(),
            self.config.max_processes
        );
        Ok(())
    }

    /// Closes the registry and tears the backend down
    ///
    /// Records still registered are dropped; waiters on a dropped process are
    /// woken and observe `InvalidState`.
    pub fn deinit(&self) -> Result<()> {
        if !self.ready.swap(false, Ordering::AcqRel) {
            return Err(invalid_state("osal not initialized"));
        }

        let (processes, threads) = self.tables.lock().clear();
        if processes > 0 || threads > 0 {
            log::warn!(
                "osal deinit dropped {} processes and {} threads",
                processes,
                threads
            );
        }
        if !self.backend.deinit() {
            log::warn!("backend {} failed to deinitialize", self.backend.name());
        }
        log::info!("osal deinitialized");
        Ok(())
    }

    /// Returns true between `init` and `deinit`
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(invalid_state("osal not initialized"))
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &OsalConfig {
        &self.config
    }

    pub fn allocator(&self) -> &Arc<dyn TrackedAllocator> {
        &self.allocator
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    pub fn create_mutex(&self, recursive: bool) -> Result<Mutex> {
        self.ensure_ready()?;
        self.backend.create_mutex(recursive)
    }

    pub fn create_semaphore(&self, initial_count: u32, max_count: u32) -> Result<Semaphore> {
        self.ensure_ready()?;
        self.backend.create_semaphore(initial_count, max_count)
    }

    pub fn create_queue(&self, item_size: usize, capacity: usize) -> Result<Queue> {
        self.ensure_ready()?;
        self.backend.create_queue(item_size, capacity)
    }

    pub fn create_timer(
        &self,
        callback: TimerCallback,
        period_ms: Milliseconds,
        auto_reload: bool,
    ) -> Result<Timer> {
        self.ensure_ready()?;
        self.backend.create_timer(callback, period_ms, auto_reload)
    }
}

impl<B: Backend> fmt::Debug for Osal<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Osal")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("ready", &self.is_ready())
            .finish()
    }
}
