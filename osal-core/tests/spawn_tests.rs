//! Module spawn protocol tests

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use mockall::mock;
use osal_api::backend::{MutexBackend, QueueBackend, SemaphoreBackend, ThreadBackend, TimerBackend};
use osal_api::{
    Backend, Error, Milliseconds, ModuleRuntime, OsalConfig, ProcessState, RawMutex, RawQueue,
    RawSemaphore, RawThread, RawTimer, Result, ThreadAttributes, ThreadEntry, ThreadId,
    TimerCallback, TrackedAllocator,
};
use osal_core::{Osal, PANIC_EXIT_STATUS, TaggedHeap, ThreadBuilder};
use osal_host::HostBackend;

mock! {
    pub Module {}

    impl ModuleRuntime for Module {
        fn run(&self, argv: &[String]) -> i32;
        fn name(&self) -> Option<String>;
        fn stack_size(&self) -> usize;
    }
}

fn module(name: &str, status: i32) -> MockModule {
    let mut module = MockModule::new();
    module.expect_name().return_const(Some(name.to_string()));
    module.expect_stack_size().return_const(0usize);
    module.expect_run().times(1).returning(move |_| status);
    module
}

fn osal() -> Arc<Osal<HostBackend>> {
    let osal = Osal::new(HostBackend::new(), OsalConfig::default());
    osal.init().unwrap();
    osal
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Allocator that refuses every request
struct FailingAllocator;

impl TrackedAllocator for FailingAllocator {
    fn allocate(&self, _layout: Layout, _tag: &str) -> Option<NonNull<u8>> {
        None
    }

    unsafe fn free(&self, _ptr: NonNull<u8>, _layout: Layout) {
        panic!("nothing was allocated");
    }
}

/// Host backend whose thread creation can be made to fail, or to finish the
/// new thread before returning
#[derive(Default)]
struct FlakyBackend {
    inner: HostBackend,
    fail_spawn: AtomicBool,
    run_inline: AtomicBool,
}

impl MutexBackend for FlakyBackend {
    fn mutex_create(&self, recursive: bool) -> Result<Box<dyn RawMutex>> {
        self.inner.mutex_create(recursive)
    }
}

impl SemaphoreBackend for FlakyBackend {
    fn semaphore_create(&self, initial_count: u32, max_count: u32) -> Result<Box<dyn RawSemaphore>> {
        self.inner.semaphore_create(initial_count, max_count)
    }
}

impl QueueBackend for FlakyBackend {
    fn queue_create(&self, item_size: usize, capacity: usize) -> Result<Box<dyn RawQueue>> {
        self.inner.queue_create(item_size, capacity)
    }
}

impl TimerBackend for FlakyBackend {
    fn timer_create(
        &self,
        callback: TimerCallback,
        period_ms: Milliseconds,
        auto_reload: bool,
    ) -> Result<Box<dyn RawTimer>> {
        self.inner.timer_create(callback, period_ms, auto_reload)
    }
}

impl ThreadBackend for FlakyBackend {
    fn thread_spawn(&self, attrs: ThreadAttributes, entry: ThreadEntry) -> Result<Box<dyn RawThread>> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(Error::OutOfMemory);
        }
        let thread = self.inner.thread_spawn(attrs, entry)?;
        if self.run_inline.load(Ordering::SeqCst) {
            thread.join()?;
        }
        Ok(thread)
    }

    fn thread_current(&self) -> Option<ThreadId> {
        self.inner.thread_current()
    }

    fn thread_sleep(&self, ms: Milliseconds) {
        self.inner.thread_sleep(ms)
    }
}

impl Backend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn init(&self) -> bool {
        self.inner.init()
    }

    fn deinit(&self) -> bool {
        self.inner.deinit()
    }
}

#[test]
fn test_spawn_returns_pid_and_records_exit_status() {
    let osal = osal();
    let pid = osal.spawn(Arc::new(module("answer", 42)), Vec::new()).unwrap();

    let process = osal.process_find_by_id(pid).unwrap().unwrap();
    assert_eq!(osal.process_name(process).unwrap(), "answer");
    assert_eq!(osal.process_wait(process, -1).unwrap(), 42);

    let state = osal.process_state(process).unwrap();
    assert!(matches!(state, ProcessState::Terminated | ProcessState::Zombie));
    assert_eq!(osal.process_exit_status(process).unwrap(), Some(42));

    assert_eq!(osal.process_reap(process).unwrap(), 42);
    assert_eq!(osal.process_find_by_id(pid).unwrap(), None);
}

#[test]
fn test_module_receives_argv() {
    let osal = osal();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);

    let mut module = MockModule::new();
    module.expect_name().return_const(Some("echo".to_string()));
    module.expect_stack_size().return_const(0usize);
    module.expect_run().times(1).returning(move |argv| {
        *record.lock().unwrap() = argv.to_vec();
        argv.len() as i32
    });

    let status = osal
        .run_blocking(Arc::new(module), args(&["echo", "hello", "world"]))
        .unwrap();
    assert_eq!(status, 3);
    assert_eq!(*seen.lock().unwrap(), args(&["echo", "hello", "world"]));
    assert!(osal.process_find_by_name("echo").unwrap().is_none());
}

#[test]
fn test_module_without_name_is_rejected() {
    let osal = osal();

    let mut unnamed = MockModule::new();
    unnamed.expect_name().return_const(None::<String>);
    unnamed.expect_stack_size().return_const(0usize);
    unnamed.expect_run().never();
    assert!(matches!(
        osal.spawn(Arc::new(unnamed), Vec::new()),
        Err(Error::InvalidArgument(_))
    ));

    let mut blank = MockModule::new();
    blank.expect_name().return_const(Some(String::new()));
    blank.expect_stack_size().return_const(0usize);
    blank.expect_run().never();
    assert!(matches!(
        osal.run_detached(Arc::new(blank), Vec::new()),
        Err(Error::InvalidArgument(_))
    ));

    assert!(osal.process_list().unwrap().is_empty());
}

#[test]
fn test_context_allocation_failure_rolls_back_process() {
    let osal = Osal::with_allocator(HostBackend::new(), OsalConfig::default(), Arc::new(FailingAllocator));
    osal.init().unwrap();

    let mut module = MockModule::new();
    module.expect_name().return_const(Some("hungry".to_string()));
    module.expect_stack_size().return_const(0usize);
    module.expect_run().never();

    assert!(matches!(
        osal.spawn(Arc::new(module), args(&["hungry"])),
        Err(Error::OutOfMemory)
    ));
    assert_eq!(osal.process_find_by_name("hungry").unwrap(), None);
    assert_eq!(osal.process_find_by_id(1).unwrap(), None);
    assert!(osal.process_list().unwrap().is_empty());
}

#[test]
fn test_thread_failure_rolls_back_context_and_process() {
    let heap = Arc::new(TaggedHeap::new());
    let osal = Osal::with_allocator(FlakyBackend::default(), OsalConfig::default(), heap.clone());
    osal.init().unwrap();
    osal.backend().fail_spawn.store(true, Ordering::SeqCst);

    let mut doomed = MockModule::new();
    doomed.expect_name().return_const(Some("doomed".to_string()));
    doomed.expect_stack_size().return_const(0usize);
    doomed.expect_run().never();

    assert!(matches!(
        osal.spawn(Arc::new(doomed), Vec::new()),
        Err(Error::OutOfMemory)
    ));
    assert_eq!(osal.process_find_by_name("doomed").unwrap(), None);
    assert_eq!(heap.usage("doomed"), 0);
    assert_eq!(heap.live_allocations(), 0);

    osal.backend().fail_spawn.store(false, Ordering::SeqCst);
    let status = osal.run_blocking(Arc::new(module("doomed", 4)), Vec::new()).unwrap();
    assert_eq!(status, 4);
    assert_eq!(heap.live_allocations(), 0);
}

#[test]
fn test_context_is_charged_to_module_while_running() {
    let heap = Arc::new(TaggedHeap::new());
    let osal = Osal::with_allocator(HostBackend::new(), OsalConfig::default(), heap.clone());
    osal.init().unwrap();

    let gate = Arc::new(osal.create_semaphore(0, 1).unwrap());
    let waiter = Arc::clone(&gate);

    let mut module = MockModule::new();
    module.expect_name().return_const(Some("tracked".to_string()));
    module.expect_stack_size().return_const(0usize);
    module.expect_run().times(1).returning(move |_| {
        waiter.wait(-1).unwrap();
        0
    });

    let pid = osal.run_detached(Arc::new(module), args(&["tracked"])).unwrap();
    assert!(heap.usage("tracked") > 0);

    gate.post().unwrap();
    let process = osal.process_find_by_id(pid).unwrap().unwrap();
    assert_eq!(osal.process_reap(process).unwrap(), 0);
    assert_eq!(heap.usage("tracked"), 0);
}

#[test]
fn test_stack_size_and_priority_selection() {
    let osal = Osal::new(
        HostBackend::new(),
        OsalConfig::default().with_default_stack_size(4096).with_default_priority(2),
    );
    osal.init().unwrap();

    let stack = Arc::new(AtomicUsize::new(0));
    let priority = Arc::new(AtomicI32::new(-1));

    let probe = |requested: usize| {
        let inner = Arc::clone(&osal);
        let stack = Arc::clone(&stack);
        let priority = Arc::clone(&priority);
        let mut module = MockModule::new();
        module.expect_name().return_const(Some("probe".to_string()));
        module.expect_stack_size().return_const(requested);
        module.expect_run().times(1).returning(move |_| {
            stack.store(inner.thread_stack_size(None).unwrap(), Ordering::SeqCst);
            priority.store(inner.thread_priority(None).unwrap(), Ordering::SeqCst);
            0
        });
        Arc::new(module)
    };

    osal.run_blocking(probe(0), Vec::new()).unwrap();
    assert_eq!(stack.load(Ordering::SeqCst), 4096);
    assert_eq!(priority.load(Ordering::SeqCst), 2);

    osal.run_blocking(probe(128 * 1024), Vec::new()).unwrap();
    assert_eq!(stack.load(Ordering::SeqCst), 128 * 1024);

    // a registered caller passes its own priority on
    let (tx, rx) = std::sync::mpsc::channel();
    let inner = Arc::clone(&osal);
    let child = probe(0);
    let parent = osal
        .thread_create(ThreadBuilder::new("parent").priority(9), move || {
            tx.send(inner.run_blocking(child, Vec::new())).unwrap();
        })
        .unwrap();
    assert_eq!(rx.recv().unwrap().unwrap(), 0);
    osal.thread_join(parent).unwrap();
    assert_eq!(priority.load(Ordering::SeqCst), 9);
}

#[test]
fn test_spawn_links_parent_but_detached_has_none() {
    let osal = osal();
    let shell = osal.process_create("shell", None).unwrap();
    osal.set_current_process(Some(shell)).unwrap();

    let gate = Arc::new(osal.create_semaphore(0, 1).unwrap());
    let blocked = |name: &str| {
        let waiter = Arc::clone(&gate);
        let mut module = MockModule::new();
        module.expect_name().return_const(Some(name.to_string()));
        module.expect_stack_size().return_const(0usize);
        module.expect_run().times(1).returning(move |_| {
            waiter.wait(-1).unwrap();
            let _ = waiter.post();
            0
        });
        Arc::new(module)
    };

    let child = osal.spawn(blocked("child"), Vec::new()).unwrap();
    let daemon = osal.run_detached(blocked("daemon"), Vec::new()).unwrap();
    let child = osal.process_find_by_id(child).unwrap().unwrap();
    let daemon = osal.process_find_by_id(daemon).unwrap().unwrap();

    assert_eq!(osal.process_parent(child).unwrap(), Some(shell));
    assert_eq!(osal.process_parent(daemon).unwrap(), None);
    assert_eq!(osal.process_children(shell).unwrap(), vec![child]);

    // killing the shell's tree leaves the daemon alone
    osal.set_current_process(None).unwrap();
    assert_eq!(osal.process_kill_tree(shell, -1).unwrap(), 2);
    assert!(!osal.process_state(daemon).unwrap().is_finished());

    gate.post().unwrap();
    assert_eq!(osal.process_wait(child, -1).unwrap(), -1);
    assert_eq!(osal.process_reap(daemon).unwrap(), 0);
}

#[test]
fn test_terminate_current_wins_over_return_value() {
    let osal = osal();
    let inner = Arc::clone(&osal);

    let mut module = MockModule::new();
    module.expect_name().return_const(Some("quitter".to_string()));
    module.expect_stack_size().return_const(0usize);
    module.expect_run().times(1).returning(move |_| {
        inner.terminate_current(5).unwrap();
        9
    });

    assert_eq!(osal.run_blocking(Arc::new(module), Vec::new()).unwrap(), 5);
}

#[test]
fn test_terminate_current_without_process() {
    let osal = osal();
    assert!(matches!(osal.terminate_current(1), Err(Error::InvalidState(_))));
}

#[test]
fn test_concurrent_spawns_get_unique_pids() {
    const SPAWNERS: usize = 8;

    let osal = osal();
    let handles: Vec<_> = (0..SPAWNERS)
        .map(|i| {
            let osal = Arc::clone(&osal);
            thread::spawn(move || {
                osal.run_detached(Arc::new(module(&format!("m{i}"), i as i32)), Vec::new())
                    .unwrap()
            })
        })
        .collect();

    let mut pids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    pids.sort_unstable();
    pids.dedup();
    assert_eq!(pids.len(), SPAWNERS);

    for pid in pids {
        let process = osal.process_find_by_id(pid).unwrap().unwrap();
        let name = osal.process_name(process).unwrap();
        let status = osal.process_reap(process).unwrap();
        assert_eq!(name, format!("m{status}"));
    }
    assert!(osal.process_list().unwrap().is_empty());
}

#[test]
fn test_spawn_after_deinit_fails() {
    let osal = osal();
    osal.deinit().unwrap();

    let mut module = MockModule::new();
    module.expect_name().return_const(Some("late".to_string()));
    module.expect_stack_size().return_const(0usize);
    module.expect_run().never();
    assert!(matches!(
        osal.run_detached(Arc::new(module), Vec::new()),
        Err(Error::InvalidState(_))
    ));
}

/// Module whose entry point panics
struct Crasher;

impl ModuleRuntime for Crasher {
    fn run(&self, _argv: &[String]) -> i32 {
        panic!("module crashed");
    }

    fn name(&self) -> Option<String> {
        Some("crasher".to_string())
    }

    fn stack_size(&self) -> usize {
        0
    }
}

#[test]
fn test_panicking_module_still_terminates_process() {
    let heap = Arc::new(TaggedHeap::new());
    let osal = Osal::with_allocator(HostBackend::new(), OsalConfig::default(), heap.clone());
    osal.init().unwrap();

    let pid = osal.run_detached(Arc::new(Crasher), Vec::new()).unwrap();
    let process = osal.process_find_by_id(pid).unwrap().unwrap();

    assert_eq!(osal.process_wait(process, 2_000).unwrap(), PANIC_EXIT_STATUS);
    assert_eq!(osal.process_reap(process).unwrap(), PANIC_EXIT_STATUS);
    assert_eq!(osal.process_find_by_id(pid).unwrap(), None);
    assert_eq!(heap.usage("crasher"), 0);
}

#[test]
fn test_destroy_after_wait_drops_finished_thread_records() {
    let osal = osal();
    let (tx, rx) = std::sync::mpsc::channel();
    let inner = Arc::clone(&osal);

    let mut module = MockModule::new();
    module.expect_name().return_const(Some("brief".to_string()));
    module.expect_stack_size().return_const(0usize);
    module.expect_run().times(1).returning(move |_| {
        tx.send(inner.thread_current().unwrap()).unwrap();
        0
    });

    let pid = osal.run_detached(Arc::new(module), Vec::new()).unwrap();
    let thread = rx.recv().unwrap();
    let process = osal.process_find_by_id(pid).unwrap().unwrap();

    assert_eq!(osal.process_wait(process, -1).unwrap(), 0);
    osal.thread_join(thread).unwrap();
    assert_eq!(osal.process_state(process).unwrap(), ProcessState::Zombie);
    osal.process_destroy(process).unwrap();

    assert!(matches!(osal.thread_name(Some(thread)), Err(Error::InvalidArgument(_))));
    assert!(matches!(osal.thread_join(thread), Err(Error::InvalidArgument(_))));
}

#[test]
fn test_spawn_succeeds_when_module_left_its_process_early() {
    let osal = Osal::new(FlakyBackend::default(), OsalConfig::default());
    osal.init().unwrap();
    osal.backend().run_inline.store(true, Ordering::SeqCst);
    let inner = Arc::clone(&osal);

    let mut module = MockModule::new();
    module.expect_name().return_const(Some("fleeting".to_string()));
    module.expect_stack_size().return_const(0usize);
    module.expect_run().times(1).returning(move |_| {
        let me = inner.thread_current().unwrap();
        let process = inner.current_process().unwrap().unwrap();
        inner.process_remove_thread(process, me).unwrap();
        3
    });

    let pid = osal.run_detached(Arc::new(module), Vec::new()).unwrap();
    let process = osal.process_find_by_id(pid).unwrap().unwrap();

    assert_eq!(osal.process_state(process).unwrap(), ProcessState::Zombie);
    assert_eq!(osal.process_list().unwrap()[0].threads, 0);
    assert_eq!(osal.process_reap(process).unwrap(), 3);
}
