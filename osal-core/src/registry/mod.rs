//! Process and thread registry
//!
//! One table set holds every process record, every registry-created thread
//! record and the thread-to-process membership map. The `Osal` object guards
//! it with a single `SpinMutex`, so the two sides of a membership are
//! always updated together.

use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::{HashMap, HashSet};
use osal_api::error::{invalid_argument, invalid_state};
use osal_api::{Pid, Priority, ProcessState, RawThread, Result, Semaphore, ThreadId, Uid};

/// Registry reference to a process
///
/// Handles are never reused, so a stale handle can only miss; it cannot name
/// a different process. The numeric process id is separate and may be reused
/// once its process is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessHandle(u64);

impl ProcessHandle {
    /// Returns the numeric value
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Snapshot of one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub handle: ProcessHandle,
    pub pid: Pid,
    pub name: String,
    pub uid: Uid,
    pub pwd: String,
    pub parent: Option<ProcessHandle>,
    pub state: ProcessState,
    pub exit_status: Option<i32>,
    /// Number of member threads
    pub threads: usize,
}

pub(crate) struct ProcessEntry {
    pub pid: Pid,
    pub name: String,
    pub uid: Uid,
    pub pwd: String,
    pub parent: Option<ProcessHandle>,
    pub state: ProcessState,
    pub exit_status: Option<i32>,
    pub threads: HashSet<ThreadId>,
    /// Posted when the process terminates or is destroyed
    pub exited: Arc<Semaphore>,
}

impl ProcessEntry {
    pub fn new(pid: Pid, name: String, parent: Option<ProcessHandle>, exited: Semaphore) -> Self {
        Self {
            pid,
            name,
            uid: 0,
            pwd: String::from("/"),
            parent,
            state: ProcessState::Created,
            exit_status: None,
            threads: HashSet::new(),
            exited: Arc::new(exited),
        }
    }

    pub fn info(&self, handle: ProcessHandle) -> ProcessInfo {
        ProcessInfo {
            handle,
            pid: self.pid,
            name: self.name.clone(),
            uid: self.uid,
            pwd: self.pwd.clone(),
            parent: self.parent,
            state: self.state,
            exit_status: self.exit_status,
            threads: self.threads.len(),
        }
    }
}

pub(crate) struct ThreadRecord {
    pub name: String,
    pub module_name: String,
    pub priority: Priority,
    pub stack_size: usize,
    /// Backend handle, present once the backend has started the thread
    pub raw: Option<Arc<dyn RawThread>>,
    pub finished: bool,
}

pub(crate) struct Tables {
    pub processes: HashMap<ProcessHandle, ProcessEntry>,
    pub threads: HashMap<ThreadId, ThreadRecord>,
    /// Thread membership; the inverse of every `ProcessEntry::threads`
    pub owners: HashMap<ThreadId, ProcessHandle>,
    next_handle: u64,
    first_pid: Pid,
    next_pid: Pid,
}

impl Tables {
    pub fn new(first_pid: Pid) -> Self {
        Self {
            processes: HashMap::new(),
            threads: HashMap::new(),
            owners: HashMap::new(),
            next_handle: 1,
            first_pid,
            next_pid: first_pid,
        }
    }

    pub fn allocate_handle(&mut self) -> ProcessHandle {
        let handle = ProcessHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    pub fn pid_in_use(&self, pid: Pid) -> bool {
        self.processes.values().any(|p| p.pid == pid)
    }

    /// Hands out the next id not held by a live process
    pub fn allocate_pid(&mut self) -> Option<Pid> {
        let span = u64::from(Pid::MAX - self.first_pid) + 1;
        for _ in 0..span.min(self.processes.len() as u64 + 1) {
            let pid = self.next_pid;
            self.next_pid = if pid == Pid::MAX { self.first_pid } else { pid + 1 };
            if !self.pid_in_use(pid) {
                return Some(pid);
            }
        }
        None
    }

    pub fn process(&self, handle: ProcessHandle) -> Result<&ProcessEntry> {
        self.processes
            .get(&handle)
            .ok_or_else(|| invalid_argument(&format!("unknown process {}", handle)))
    }

    pub fn process_mut(&mut self, handle: ProcessHandle) -> Result<&mut ProcessEntry> {
        self.processes
            .get_mut(&handle)
            .ok_or_else(|| invalid_argument(&format!("unknown process {}", handle)))
    }

    pub fn thread(&self, id: ThreadId) -> Result<&ThreadRecord> {
        self.threads
            .get(&id)
            .ok_or_else(|| invalid_argument(&format!("unknown thread {}", id)))
    }

    /// A member without a record was adopted from outside and may still run
    pub fn is_live(&self, id: ThreadId) -> bool {
        self.threads.get(&id).is_none_or(|t| !t.finished)
    }

    pub fn has_live_members(&self, handle: ProcessHandle) -> bool {
        self.processes
            .get(&handle)
            .is_some_and(|p| p.threads.iter().any(|&t| self.is_live(t)))
    }

    /// Records `id` as a member of `handle`
    ///
    /// Re-adding a member is a no-op. A thread owned by another process, or a
    /// finished process, is rejected.
    pub fn bind(&mut self, id: ThreadId, handle: ProcessHandle) -> Result<()> {
        if let Some(&owner) = self.owners.get(&id) {
            if owner == handle {
                return Ok(());
            }
            return Err(invalid_state(&format!("thread {} belongs to process {}", id, owner)));
        }

        let process = self.process_mut(handle)?;
        if process.state.is_finished() {
            return Err(invalid_state(&format!("process {} has terminated", handle)));
        }
        process.threads.insert(id);
        self.owners.insert(id, handle);
        Ok(())
    }

    /// Drops the membership of `id`, returning its former process
    pub fn unbind(&mut self, id: ThreadId) -> Option<ProcessHandle> {
        let handle = self.owners.remove(&id)?;
        if let Some(process) = self.processes.get_mut(&handle) {
            process.threads.remove(&id);
        }
        self.settle(handle);
        Some(handle)
    }

    /// Moves a terminated process without live members to `Zombie`
    pub fn settle(&mut self, handle: ProcessHandle) {
        let idle = !self.has_live_members(handle);
        if let Some(process) = self.processes.get_mut(&handle) {
            if process.state == ProcessState::Terminated && idle {
                process.state = ProcessState::Zombie;
            }
        }
    }

    /// Lowest-pid process called `name`
    pub fn find_by_name(&self, name: &str) -> Option<ProcessHandle> {
        self.processes
            .iter()
            .filter(|(_, p)| p.name == name)
            .min_by_key(|(_, p)| p.pid)
            .map(|(&h, _)| h)
    }

    pub fn find_by_id(&self, pid: Pid) -> Option<ProcessHandle> {
        self.processes
            .iter()
            .find(|(_, p)| p.pid == pid)
            .map(|(&h, _)| h)
    }

    pub fn children(&self, handle: ProcessHandle) -> Vec<ProcessHandle> {
        let mut children: Vec<_> = self
            .processes
            .iter()
            .filter(|(_, p)| p.parent == Some(handle))
            .map(|(&h, _)| h)
            .collect();
        children.sort_unstable();
        children
    }

    /// Empties every table, returning the number of processes and threads dropped
    pub fn clear(&mut self) -> (usize, usize) {
        let dropped = (self.processes.len(), self.threads.len());
        for process in self.processes.values() {
            let _ = process.exited.post();
        }
        self.processes.clear();
        self.threads.clear();
        self.owners.clear();
        self.next_pid = self.first_pid;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osal_api::sync::RawSemaphore;
    use osal_api::Timeout;

    struct NullSemaphore;

    impl RawSemaphore for NullSemaphore {
        fn wait(&self, _timeout: Timeout) -> Result<()> {
            Ok(())
        }
        fn post(&self) -> Result<()> {
            Ok(())
        }
        fn count(&self) -> u32 {
            0
        }
        fn max_count(&self) -> u32 {
            1
        }
    }

    fn insert(tables: &mut Tables, name: &str) -> ProcessHandle {
        let handle = tables.allocate_handle();
        let pid = tables.allocate_pid().unwrap();
        let exited = Semaphore::from_raw(alloc::boxed::Box::new(NullSemaphore));
        tables
            .processes
            .insert(handle, ProcessEntry::new(pid, name.into(), None, exited));
        handle
    }

    #[test]
    fn test_pids_skip_live_ids() {
        let mut tables = Tables::new(1);
        let a = insert(&mut tables, "a");
        let b = insert(&mut tables, "b");
        assert_eq!(tables.process(a).unwrap().pid, 1);
        assert_eq!(tables.process(b).unwrap().pid, 2);

        tables.process_mut(b).unwrap().pid = 3;
        tables.next_pid = 3;
        let c = insert(&mut tables, "c");
        assert_eq!(tables.process(c).unwrap().pid, 4);
    }

    #[test]
    fn test_pid_wraps_to_first() {
        let mut tables = Tables::new(10);
        tables.next_pid = Pid::MAX;
        let a = insert(&mut tables, "a");
        let b = insert(&mut tables, "b");
        assert_eq!(tables.process(a).unwrap().pid, Pid::MAX);
        assert_eq!(tables.process(b).unwrap().pid, 10);
    }

    #[test]
    fn test_membership_is_exclusive() {
        let mut tables = Tables::new(1);
        let a = insert(&mut tables, "a");
        let b = insert(&mut tables, "b");
        let t = ThreadId::allocate();

        tables.bind(t, a).unwrap();
        tables.bind(t, a).unwrap();
        assert!(tables.bind(t, b).is_err());
        assert!(tables.process(a).unwrap().threads.contains(&t));
        assert_eq!(tables.owners.get(&t), Some(&a));

        assert_eq!(tables.unbind(t), Some(a));
        assert!(tables.process(a).unwrap().threads.is_empty());
        tables.bind(t, b).unwrap();
    }

    #[test]
    fn test_settle_waits_for_live_members() {
        let mut tables = Tables::new(1);
        let a = insert(&mut tables, "a");
        let t = ThreadId::allocate();
        tables.bind(t, a).unwrap();

        tables.process_mut(a).unwrap().state = ProcessState::Terminated;
        tables.settle(a);
        assert_eq!(tables.process(a).unwrap().state, ProcessState::Terminated);

        tables.unbind(t);
        assert_eq!(tables.process(a).unwrap().state, ProcessState::Zombie);
    }

    #[test]
    fn test_find_by_name_prefers_lowest_pid() {
        let mut tables = Tables::new(1);
        let first = insert(&mut tables, "dup");
        let _second = insert(&mut tables, "dup");
        assert_eq!(tables.find_by_name("dup"), Some(first));
        assert_eq!(tables.find_by_name("missing"), None);
        assert_eq!(tables.find_by_id(2).map(|h| tables.process(h).unwrap().pid), Some(2));
    }
}
