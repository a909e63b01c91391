//! Module spawn protocol
//!
//! Spawning runs a loaded module as a new logical process:
//!
//! 1. the module must carry a name, which names the process and its thread;
//! 2. a process is created (child of the caller, or detached);
//! 3. the spawn context (module, argv, process) is stored in tracked memory
//!    charged to the module;
//! 4. a thread bound to the process runs the trampoline;
//! 5. the process id is returned without waiting for the module.
//!
//! A failing step undoes the earlier ones in reverse order, so nothing stays
//! registered. The trampoline runs the module, frees the context and kills
//! the process with the module's return value, or with [`PANIC_EXIT_STATUS`]
//! when the module unwinds.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use osal_api::error::{invalid_argument, invalid_state};
use osal_api::{Backend, Error, ModuleRuntime, Pid, Result};

use crate::memory::TrackedBox;
use crate::osal::Osal;
use crate::registry::ProcessHandle;
use crate::thread::ThreadBuilder;

/// Exit status of a process whose module panicked
pub const PANIC_EXIT_STATUS: i32 = -1;

/// Everything the trampoline needs, owned by the spawned thread
struct SpawnContext {
    module: Arc<dyn ModuleRuntime>,
    argv: Vec<String>,
    process: ProcessHandle,
}

impl<B: Backend> Osal<B> {
    /// Runs `module` as a child of the calling thread's process
    ///
    /// Returns the new process id as soon as the module thread is started.
    pub fn spawn(self: &Arc<Self>, module: Arc<dyn ModuleRuntime>, argv: Vec<String>) -> Result<Pid> {
        let parent = self.current_process()?;
        self.launch(module, argv, parent).map(|(_, pid)| pid)
    }

    /// Runs `module` as a process without a parent
    pub fn run_detached(self: &Arc<Self>, module: Arc<dyn ModuleRuntime>, argv: Vec<String>) -> Result<Pid> {
        self.launch(module, argv, None).map(|(_, pid)| pid)
    }

    /// Runs `module` as a child process, waits for it and reaps it
    ///
    /// Returns the module's exit code.
    pub fn run_blocking(self: &Arc<Self>, module: Arc<dyn ModuleRuntime>, argv: Vec<String>) -> Result<i32> {
        let parent = self.current_process()?;
        let (process, _) = self.launch(module, argv, parent)?;
        self.process_reap(process)
    }

    fn launch(
        self: &Arc<Self>,
        module: Arc<dyn ModuleRuntime>,
        argv: Vec<String>,
        parent: Option<ProcessHandle>,
    ) -> Result<(ProcessHandle, Pid)> {
        self.ensure_ready()?;
        let name = match module.name() {
            Some(name) if !name.is_empty() => name,
            _ => return Err(invalid_argument("module has no name")),
        };

        let process = self.process_create(&name, parent)?;
        let pid = self.process_get_id(process)?;

        let context = SpawnContext {
            module,
            argv,
            process,
        };
        let context = match TrackedBox::try_new(context, Arc::clone(&self.allocator), &name) {
            Ok(context) => context,
            Err(_) => {
                log::error!("spawn {}: cannot allocate spawn context", name);
                self.discard(process);
                return Err(Error::OutOfMemory);
            }
        };

        let stack_size = match context.module.stack_size() {
            0 => self.config.default_stack_size,
            requested => requested,
        };
        let priority = match self.thread_priority(None) {
            Ok(priority) if priority != 0 => priority,
            _ => self.config.default_priority,
        };

        let builder = ThreadBuilder::new(name.clone())
            .module_name(name.clone())
            .priority(priority)
            .stack_size(stack_size)
            .process(process);
        let osal = Arc::clone(self);
        // On failure the closure, and the context with it, is dropped here.
        let thread = match self.thread_create(builder, move || osal.trampoline(context)) {
            Ok(thread) => thread,
            Err(e) => {
                log::error!("spawn {}: cannot create thread: {}", name, e);
                self.discard(process);
                return Err(Error::OutOfMemory);
            }
        };
        // Already bound by thread_create; a fast module may have left since.
        if let Err(e) = self.process_add_thread(process, thread) {
            log::warn!("spawn {}: thread {} not in process {}: {}", name, thread, process, e);
        }

        log::info!("spawned {} as pid {}", name, pid);
        Ok((process, pid))
    }

    fn discard(&self, process: ProcessHandle) {
        if let Err(e) = self.process_destroy(process) {
            log::warn!("cannot roll back process {}: {}", process, e);
        }
    }

    fn trampoline(&self, context: TrackedBox<SpawnContext>) {
        let unwind = KillOnUnwind {
            osal: self,
            process: context.process,
        };
        let status = context.module.run(&context.argv);
        core::mem::forget(unwind);
        let process = context.process;
        drop(context);

        match self.process_kill(process, status) {
            Ok(()) => {}
            Err(_) if self.process_state(process).is_ok_and(|s| s.is_finished()) => {}
            Err(e) => {
                log::error!("process {} has no exit path ({}), halting", process, e);
                self.halt();
            }
        }
    }

    /// Terminates the calling thread's process with `status`
    pub fn terminate_current(&self, status: i32) -> Result<()> {
        let process = self
            .current_process()?
            .ok_or_else(|| invalid_state("calling thread has no process"))?;
        log::trace!("process {} exiting with status {}", process, status);
        self.process_kill(process, status)
    }

    /// Terminates the calling thread's process and parks the caller forever
    pub fn exit(&self, status: i32) -> ! {
        if let Err(e) = self.terminate_current(status) {
            log::debug!("exit({}) without a process: {}", status, e);
        }
        self.halt()
    }

    fn halt(&self) -> ! {
        loop {
            self.backend.thread_sleep(u32::MAX);
            core::hint::spin_loop();
        }
    }
}

/// Kills the module's process if `run` unwinds instead of returning
struct KillOnUnwind<'a, B: Backend> {
    osal: &'a Osal<B>,
    process: ProcessHandle,
}

impl<B: Backend> Drop for KillOnUnwind<'_, B> {
    fn drop(&mut self) {
        log::error!("module of process {} panicked", self.process);
        if let Err(e) = self.osal.process_kill(self.process, PANIC_EXIT_STATUS) {
            log::warn!("cannot kill process {} after panic: {}", self.process, e);
        }
    }
}
