//! Thread abstraction
//!
//! Threads are created through the backend but recorded in the registry, which
//! keeps their name, module name, priority, stack size and process membership.
//! Accessors taking `Option<ThreadId>` treat `None` as the calling thread.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::sync::{Arc, Weak};

use osal_api::error::invalid_state;
use osal_api::{Backend, Milliseconds, Priority, ProcessState, Result, ThreadAttributes, ThreadId};

use crate::osal::Osal;
use crate::registry::{ProcessHandle, ThreadRecord};

/// Parameters of a new thread
#[derive(Debug, Clone)]
pub struct ThreadBuilder {
    name: String,
    module_name: Option<String>,
    priority: Option<Priority>,
    stack_size: usize,
    process: Option<ProcessHandle>,
}

impl ThreadBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module_name: None,
            priority: None,
            stack_size: 0,
            process: None,
        }
    }

    /// Module the thread is accounted to; defaults to the thread name
    pub fn module_name(mut self, module_name: impl Into<String>) -> Self {
        self.module_name = Some(module_name.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Stack size in bytes; `0` selects the configured default
    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Owning process; defaults to the creator's current process
    pub fn process(mut self, process: ProcessHandle) -> Self {
        self.process = Some(process);
        self
    }
}

/// Runs exit accounting when a registered thread's entry returns or unwinds
struct ExitGuard<B: Backend> {
    osal: Weak<Osal<B>>,
    id: ThreadId,
}

impl<B: Backend> Drop for ExitGuard<B> {
    fn drop(&mut self) {
        if let Some(osal) = self.osal.upgrade() {
            osal.on_thread_exit(self.id);
        }
    }
}

impl<B: Backend> Osal<B> {
    /// Creates and starts a thread running `entry`
    ///
    /// The thread is registered, and bound to its process, before the backend
    /// starts it, so it observes its own record from its first instruction.
    /// Nothing stays registered if the backend cannot start it.
    pub fn thread_create<F>(self: &Arc<Self>, builder: ThreadBuilder, entry: F) -> Result<ThreadId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ensure_ready()?;

        let ThreadBuilder {
            name,
            module_name,
            priority,
            stack_size,
            process,
        } = builder;
        let priority = priority.unwrap_or(self.config.default_priority);
        let stack_size = if stack_size == 0 {
            self.config.default_stack_size
        } else {
            stack_size
        };
        let process = match process {
            Some(process) => Some(process),
            None => self.current_process()?,
        };

        let id = ThreadId::allocate();
        let promoted = {
            let mut tables = self.tables.lock();
            if let Some(process) = process {
                tables.bind(id, process)?;
            }
            tables.threads.insert(
                id,
                ThreadRecord {
                    module_name: module_name.unwrap_or_else(|| name.clone()),
                    name: name.clone(),
                    priority,
                    stack_size,
                    raw: None,
                    finished: false,
                },
            );
            match process.map(|p| tables.process_mut(p)).transpose()? {
                Some(entry) if entry.state == ProcessState::Created => {
                    entry.state = ProcessState::Running;
                    true
                }
                _ => false,
            }
        };

        let guard = ExitGuard {
            osal: Arc::downgrade(self),
            id,
        };
        let attrs = ThreadAttributes {
            id,
            name,
            priority,
            stack_size,
        };
        let spawned = self.backend.thread_spawn(
            attrs,
            Box::new(move || {
                let _guard = guard;
                entry();
            }),
        );

        let mut tables = self.tables.lock();
        match spawned {
            Ok(raw) => {
                if let Some(record) = tables.threads.get_mut(&id) {
                    record.raw = Some(Arc::from(raw));
                }
                log::debug!("thread {} created (process {:?})", id, process);
                Ok(id)
            }
            Err(e) => {
                tables.threads.remove(&id);
                if let Some(process) = tables.unbind(id) {
                    if promoted {
                        if let Ok(entry) = tables.process_mut(process) {
                            if entry.state == ProcessState::Running {
                                entry.state = ProcessState::Created;
                            }
                        }
                    }
                }
                log::error!("backend could not start thread {}: {}", id, e);
                Err(e)
            }
        }
    }

    /// Exit accounting for a registered thread
    pub(crate) fn on_thread_exit(&self, id: ThreadId) {
        let mut tables = self.tables.lock();
        let Some(record) = tables.threads.get_mut(&id) else {
            return;
        };
        record.finished = true;
        if let Some(&process) = tables.owners.get(&id) {
            tables.settle(process);
        }
        log::trace!("thread {} exited", id);
    }

    /// Blocks until thread `id` has terminated
    pub fn thread_join(&self, id: ThreadId) -> Result<()> {
        self.ensure_ready()?;
        if self.thread_current() == Some(id) {
            return Err(invalid_state("thread cannot join itself"));
        }
        let raw = {
            let tables = self.tables.lock();
            let record = tables.thread(id)?;
            record
                .raw
                .clone()
                .ok_or_else(|| invalid_state(&format!("thread {} not started", id)))?
        };
        raw.join()
    }

    /// Removes the record of a terminated thread and its process membership
    pub fn thread_destroy(&self, id: ThreadId) -> Result<()> {
        self.ensure_ready()?;
        let mut tables = self.tables.lock();
        let record = tables.thread(id)?;
        let finished = record.finished || record.raw.as_ref().is_some_and(|r| r.is_finished());
        if !finished {
            return Err(invalid_state(&format!("thread {} is still running", id)));
        }
        tables.threads.remove(&id);
        tables.unbind(id);
        log::debug!("thread {} destroyed", id);
        Ok(())
    }

    /// Returns the calling thread's id, or `None` outside any thread context
    pub fn thread_current(&self) -> Option<ThreadId> {
        self.backend.thread_current()
    }

    pub fn thread_sleep(&self, ms: Milliseconds) {
        self.backend.thread_sleep(ms);
    }

    fn resolve(&self, id: Option<ThreadId>) -> Result<ThreadId> {
        self.ensure_ready()?;
        id.or_else(|| self.thread_current())
            .ok_or_else(|| invalid_state("no current thread"))
    }

    fn with_record<T>(&self, id: Option<ThreadId>, f: impl FnOnce(&ThreadRecord) -> T) -> Result<T> {
        let id = self.resolve(id)?;
        let tables = self.tables.lock();
        tables.thread(id).map(f)
    }

    pub fn thread_name(&self, id: Option<ThreadId>) -> Result<String> {
        self.with_record(id, |t| t.name.clone())
    }

    pub fn thread_module_name(&self, id: Option<ThreadId>) -> Result<String> {
        self.with_record(id, |t| t.module_name.clone())
    }

    pub fn thread_priority(&self, id: Option<ThreadId>) -> Result<Priority> {
        self.with_record(id, |t| t.priority)
    }

    pub fn thread_stack_size(&self, id: Option<ThreadId>) -> Result<usize> {
        self.with_record(id, |t| t.stack_size)
    }

    /// Process the thread belongs to, `None` if unbound
    pub fn thread_process(&self, id: Option<ThreadId>) -> Result<Option<ProcessHandle>> {
        let id = self.resolve(id)?;
        Ok(self.tables.lock().owners.get(&id).copied())
    }

    /// Calling thread's module name, or `default` for unregistered callers
    ///
    /// Used to pick the accounting tag for allocations.
    pub fn current_module_name_or(&self, default: &str) -> String {
        self.thread_module_name(None)
            .unwrap_or_else(|_| String::from(default))
    }

    /// Returns true once the entry point of thread `id` has returned
    pub fn thread_is_finished(&self, id: ThreadId) -> Result<bool> {
        self.with_record(Some(id), |t| t.finished)
    }
}
