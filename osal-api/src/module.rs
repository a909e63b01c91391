//! External collaborators consumed by the spawn protocol
//!
//! The module loader and the tracked allocator live outside this layer; they
//! are reached only through these traits.

use alloc::string::String;
use core::alloc::Layout;
use core::ptr::NonNull;

/// A loaded module that can be executed as a new logical process
pub trait ModuleRuntime: Send + Sync {
    /// Runs the module entry point and returns its exit code
    ///
    /// `argv.len()` is the argument count.
    fn run(&self, argv: &[String]) -> i32;

    /// Returns the module name, or `None` if the image carries none
    fn name(&self) -> Option<String>;

    /// Returns the requested stack size in bytes; `0` means "use the default"
    fn stack_size(&self) -> usize;
}

/// Allocator that accounts every allocation against a module name
pub trait TrackedAllocator: Send + Sync {
    /// Allocates memory for `layout`, charged to `tag`
    ///
    /// Returns `None` when the allocation cannot be satisfied.
    fn allocate(&self, layout: Layout, tag: &str) -> Option<NonNull<u8>>;

    /// Releases memory returned by [`TrackedAllocator::allocate`]
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this allocator with the
    /// same `layout` and must not be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout);
}
