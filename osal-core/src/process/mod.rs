//! Process abstraction
//!
//! A process is a registry record grouping member threads under one id, name,
//! user id and working directory. Its lifecycle is
//! `Created → Running → (Suspended ⇄ Running) → Terminated → Zombie`:
//! the first member thread makes it `Running`, `kill` makes it `Terminated`,
//! and it becomes a `Zombie` once no member thread is live. Termination is
//! advisory; member threads are not interrupted.

use alloc::collections::VecDeque;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use osal_api::error::{invalid_argument, invalid_state};
use osal_api::{Backend, Error, Pid, ProcessState, RawThread, Result, ThreadId, Timeout, Uid};

use crate::osal::Osal;
use crate::registry::{ProcessEntry, ProcessHandle, ProcessInfo};

impl<B: Backend> Osal<B> {
    /// Creates a process in `Created` state
    ///
    /// `parent` must name a live process. Fails with `OutOfMemory` once the
    /// live process limit is reached.
    pub fn process_create(&self, name: &str, parent: Option<ProcessHandle>) -> Result<ProcessHandle> {
        self.ensure_ready()?;
        if name.is_empty() {
            return Err(invalid_argument("process name must not be empty"));
        }
        let exited = self.backend.create_semaphore(0, 1)?;

        let mut tables = self.tables.lock();
        if let Some(parent) = parent {
            if !tables.processes.contains_key(&parent) {
                return Err(invalid_state(&format!("parent process {} does not exist", parent)));
            }
        }
        if tables.processes.len() >= self.config.max_processes {
            log::warn!("process table full, cannot create {}", name);
            return Err(Error::OutOfMemory);
        }
        let pid = tables.allocate_pid().ok_or(Error::OutOfMemory)?;
        let handle = tables.allocate_handle();
        tables
            .processes
            .insert(handle, ProcessEntry::new(pid, String::from(name), parent, exited));

        log::debug!("process {} ({}) created as pid {}", handle, name, pid);
        Ok(handle)
    }

    /// Removes a process record
    ///
    /// Refused while a member thread is still live. The records of the
    /// finished member threads go with it. Children are detached and anyone
    /// still waiting observes `InvalidState`.
    pub fn process_destroy(&self, process: ProcessHandle) -> Result<()> {
        self.ensure_ready()?;
        let mut tables = self.tables.lock();
        tables.process(process)?;
        if tables.has_live_members(process) {
            return Err(invalid_state(&format!("process {} has live threads", process)));
        }

        let Some(entry) = tables.processes.remove(&process) else {
            return Err(invalid_argument(&format!("unknown process {}", process)));
        };
        for thread in &entry.threads {
            tables.owners.remove(thread);
            if tables.threads.get(thread).is_some_and(|t| t.finished) {
                tables.threads.remove(thread);
            }
        }
        for child in tables.processes.values_mut() {
            if child.parent == Some(process) {
                child.parent = None;
            }
        }
        drop(tables);

        let _ = entry.exited.post();
        log::debug!("process {} (pid {}) destroyed", process, entry.pid);
        Ok(())
    }

    /// Terminates a process with `status`
    ///
    /// Valid from `Created`, `Running` and `Suspended`. Wakes every waiter.
    pub fn process_kill(&self, process: ProcessHandle, status: i32) -> Result<()> {
        self.ensure_ready()?;
        let exited = {
            let mut tables = self.tables.lock();
            let entry = tables.process_mut(process)?;
            if !entry.state.is_killable() {
                return Err(invalid_state(&format!("process {} is already {}", process, entry.state)));
            }
            entry.state = ProcessState::Terminated;
            entry.exit_status = Some(status);
            let exited = Arc::clone(&entry.exited);
            tables.settle(process);
            exited
        };

        let _ = exited.post();
        log::debug!("process {} killed with status {}", process, status);
        Ok(())
    }

    /// Waits for a process to terminate and returns its exit status
    pub fn process_wait(&self, process: ProcessHandle, timeout: impl Into<Timeout>) -> Result<i32> {
        self.ensure_ready()?;
        let exited = {
            let tables = self.tables.lock();
            let entry = tables.process(process)?;
            if let (true, Some(status)) = (entry.state.is_finished(), entry.exit_status) {
                return Ok(status);
            }
            Arc::clone(&entry.exited)
        };

        exited.wait(timeout)?;
        // Hand the wakeup on to the next waiter.
        let _ = exited.post();

        let tables = self.tables.lock();
        match tables.processes.get(&process) {
            Some(ProcessEntry {
                exit_status: Some(status),
                ..
            }) => Ok(*status),
            Some(_) => Err(invalid_state(&format!("process {} woke without exiting", process))),
            None => Err(invalid_state(&format!("process {} was destroyed", process))),
        }
    }

    /// Moves a running process to `Suspended`
    ///
    /// Advisory: member threads keep running until they check their state.
    pub fn process_suspend(&self, process: ProcessHandle) -> Result<()> {
        self.transition(process, ProcessState::Running, ProcessState::Suspended)
    }

    /// Moves a suspended process back to `Running`
    pub fn process_resume(&self, process: ProcessHandle) -> Result<()> {
        self.transition(process, ProcessState::Suspended, ProcessState::Running)
    }

    fn transition(&self, process: ProcessHandle, from: ProcessState, to: ProcessState) -> Result<()> {
        self.ensure_ready()?;
        let mut tables = self.tables.lock();
        let entry = tables.process_mut(process)?;
        if entry.state != from {
            return Err(invalid_state(&format!(
                "process {} is {}, expected {}",
                process, entry.state, from
            )));
        }
        entry.state = to;
        Ok(())
    }

    /// Waits without bound for a process, then destroys its member threads and
    /// the process itself; returns the exit status
    pub fn process_reap(&self, process: ProcessHandle) -> Result<i32> {
        let status = self.process_wait(process, Timeout::FOREVER)?;

        let members: Vec<(ThreadId, Option<Arc<dyn RawThread>>)> = {
            let tables = self.tables.lock();
            tables
                .process(process)?
                .threads
                .iter()
                .map(|&t| (t, tables.threads.get(&t).and_then(|r| r.raw.clone())))
                .collect()
        };
        for (thread, raw) in members {
            if let Some(raw) = raw {
                if self.thread_current() != Some(thread) {
                    raw.join()?;
                }
            }
            match self.thread_destroy(thread) {
                Ok(()) => {}
                // adopted member without a record
                Err(Error::InvalidArgument(_)) => {}
                Err(e) => return Err(e),
            }
        }

        self.process_destroy(process)?;
        Ok(status)
    }

    /// Kills `process` and every descendant that is still killable
    ///
    /// Detached processes have no parent and are never reached. Returns the
    /// number of processes killed.
    pub fn process_kill_tree(&self, process: ProcessHandle, status: i32) -> Result<usize> {
        self.ensure_ready()?;
        let targets = {
            let tables = self.tables.lock();
            tables.process(process)?;
            let mut targets = Vec::new();
            let mut pending = VecDeque::from([process]);
            while let Some(next) = pending.pop_front() {
                targets.push(next);
                pending.extend(tables.children(next));
            }
            targets
        };

        let mut killed = 0;
        for target in targets {
            match self.process_kill(target, status) {
                Ok(()) => killed += 1,
                Err(Error::InvalidState(_)) | Err(Error::InvalidArgument(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(killed)
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    fn read<T>(&self, process: ProcessHandle, f: impl FnOnce(&ProcessEntry) -> T) -> Result<T> {
        self.ensure_ready()?;
        self.tables.lock().process(process).map(f)
    }

    pub fn process_state(&self, process: ProcessHandle) -> Result<ProcessState> {
        self.read(process, |p| p.state)
    }

    /// Exit status, `None` until the process is killed
    pub fn process_exit_status(&self, process: ProcessHandle) -> Result<Option<i32>> {
        self.read(process, |p| p.exit_status)
    }

    pub fn process_get_id(&self, process: ProcessHandle) -> Result<Pid> {
        self.read(process, |p| p.pid)
    }

    /// Renumbers a process; the id must be non-zero and not held by another
    /// live process
    pub fn process_set_id(&self, process: ProcessHandle, pid: Pid) -> Result<()> {
        self.ensure_ready()?;
        if pid == 0 {
            return Err(invalid_argument("process id must be non-zero"));
        }
        let mut tables = self.tables.lock();
        if tables.process(process)?.pid == pid {
            return Ok(());
        }
        if tables.pid_in_use(pid) {
            return Err(invalid_state(&format!("process id {} is in use", pid)));
        }
        tables.process_mut(process)?.pid = pid;
        Ok(())
    }

    pub fn process_name(&self, process: ProcessHandle) -> Result<String> {
        self.read(process, |p| p.name.clone())
    }

    pub fn process_get_uid(&self, process: ProcessHandle) -> Result<Uid> {
        self.read(process, |p| p.uid)
    }

    pub fn process_set_uid(&self, process: ProcessHandle, uid: Uid) -> Result<()> {
        self.ensure_ready()?;
        self.tables.lock().process_mut(process)?.uid = uid;
        Ok(())
    }

    pub fn process_get_pwd(&self, process: ProcessHandle) -> Result<String> {
        self.read(process, |p| p.pwd.clone())
    }

    pub fn process_set_pwd(&self, process: ProcessHandle, pwd: &str) -> Result<()> {
        self.ensure_ready()?;
        if pwd.is_empty() {
            return Err(invalid_argument("working directory must not be empty"));
        }
        self.tables.lock().process_mut(process)?.pwd = String::from(pwd);
        Ok(())
    }

    pub fn process_parent(&self, process: ProcessHandle) -> Result<Option<ProcessHandle>> {
        self.read(process, |p| p.parent)
    }

    /// Direct children, in creation order
    pub fn process_children(&self, process: ProcessHandle) -> Result<Vec<ProcessHandle>> {
        self.ensure_ready()?;
        let tables = self.tables.lock();
        tables.process(process)?;
        Ok(tables.children(process))
    }

    // ========================================================================
    // Membership
    // ========================================================================

    /// Adds a thread to a process
    ///
    /// Adding a current member again is a no-op; a thread owned by another
    /// process is rejected with `InvalidState`.
    pub fn process_add_thread(&self, process: ProcessHandle, thread: ThreadId) -> Result<()> {
        self.ensure_ready()?;
        let mut tables = self.tables.lock();
        tables.bind(thread, process)?;
        let entry = tables.process_mut(process)?;
        if entry.state == ProcessState::Created {
            entry.state = ProcessState::Running;
        }
        Ok(())
    }

    /// Removes a member thread
    pub fn process_remove_thread(&self, process: ProcessHandle, thread: ThreadId) -> Result<()> {
        self.ensure_ready()?;
        let mut tables = self.tables.lock();
        if !tables.process(process)?.threads.contains(&thread) {
            return Err(invalid_argument(&format!("thread {} is not in process {}", thread, process)));
        }
        tables.unbind(thread);
        Ok(())
    }

    pub fn process_has_thread(&self, process: ProcessHandle, thread: ThreadId) -> Result<bool> {
        self.read(process, |p| p.threads.contains(&thread))
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Lowest-numbered live process called `name`
    pub fn process_find_by_name(&self, name: &str) -> Result<Option<ProcessHandle>> {
        self.ensure_ready()?;
        Ok(self.tables.lock().find_by_name(name))
    }

    pub fn process_find_by_id(&self, pid: Pid) -> Result<Option<ProcessHandle>> {
        self.ensure_ready()?;
        Ok(self.tables.lock().find_by_id(pid))
    }

    /// Process of the calling thread, `None` if it belongs to none
    pub fn current_process(&self) -> Result<Option<ProcessHandle>> {
        self.ensure_ready()?;
        let Some(me) = self.thread_current() else {
            return Ok(None);
        };
        Ok(self.tables.lock().owners.get(&me).copied())
    }

    /// Moves the calling thread into `process`, or out of any process for `None`
    pub fn set_current_process(&self, process: Option<ProcessHandle>) -> Result<()> {
        self.ensure_ready()?;
        let me = self
            .thread_current()
            .ok_or_else(|| invalid_state("no current thread"))?;

        let mut tables = self.tables.lock();
        if let Some(process) = process {
            if tables.process(process)?.state.is_finished() {
                return Err(invalid_state(&format!("process {} has terminated", process)));
            }
        }
        tables.unbind(me);
        if let Some(process) = process {
            tables.bind(me, process)?;
            let entry = tables.process_mut(process)?;
            if entry.state == ProcessState::Created {
                entry.state = ProcessState::Running;
            }
        }
        Ok(())
    }

    /// Snapshot of every process, ordered by process id
    pub fn process_list(&self) -> Result<Vec<ProcessInfo>> {
        self.ensure_ready()?;
        let tables = self.tables.lock();
        let mut list: Vec<_> = tables
            .processes
            .iter()
            .map(|(&handle, entry)| entry.info(handle))
            .collect();
        list.sort_unstable_by_key(|info| info.pid);
        Ok(list)
    }
}
