//! Tagged heap and owning boxes over a tracked allocator

use alloc::alloc::{alloc, dealloc};
use alloc::string::String;
use alloc::sync::Arc;
use core::alloc::Layout;
use core::fmt;
use core::ops::Deref;
use core::ptr::{self, NonNull};

use hashbrown::HashMap;
use osal_api::TrackedAllocator;
use osal_api::sync::SpinMutex as Mutex;

#[derive(Default)]
struct Accounts {
    /// Live allocation address to owning tag
    live: HashMap<usize, String>,
    /// Bytes currently charged to each tag
    usage: HashMap<String, usize>,
}

/// Global-heap allocator that charges every allocation to a tag
#[derive(Default)]
pub struct TaggedHeap {
    accounts: Mutex<Accounts>,
}

impl TaggedHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently charged to `tag`
    pub fn usage(&self, tag: &str) -> usize {
        self.accounts.lock().usage.get(tag).copied().unwrap_or(0)
    }

    /// Number of live allocations
    pub fn live_allocations(&self) -> usize {
        self.accounts.lock().live.len()
    }
}

impl TrackedAllocator for TaggedHeap {
    fn allocate(&self, layout: Layout, tag: &str) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }
        // SAFETY: `layout` has a non-zero size.
        let ptr = NonNull::new(unsafe { alloc(layout) })?;

        let mut accounts = self.accounts.lock();
        accounts.live.insert(ptr.as_ptr() as usize, String::from(tag));
        *accounts.usage.entry_ref(tag).or_insert(0) += layout.size();
        Some(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        {
            let mut accounts = self.accounts.lock();
            if let Some(tag) = accounts.live.remove(&(ptr.as_ptr() as usize)) {
                if let Some(used) = accounts.usage.get_mut(&tag) {
                    *used = used.saturating_sub(layout.size());
                }
            } else {
                log::warn!("freeing untracked allocation {:p}", ptr);
            }
        }
        // SAFETY: the caller guarantees `ptr` came from `allocate` with `layout`.
        unsafe { dealloc(ptr.as_ptr(), layout) };
    }
}

impl fmt::Debug for TaggedHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedHeap")
            .field("live_allocations", &self.live_allocations())
            .finish()
    }
}

/// Owning pointer to a `T` stored in tracked memory
///
/// The value is dropped and its memory returned to the allocator when the box
/// is dropped.
pub struct TrackedBox<T> {
    ptr: NonNull<T>,
    allocator: Arc<dyn TrackedAllocator>,
}

// SAFETY: `TrackedBox` owns its `T` exclusively, like `Box<T>`; the
// allocator is `Send + Sync`.
unsafe impl<T: Send> Send for TrackedBox<T> {}
// SAFETY: shared access only hands out `&T`.
unsafe impl<T: Sync> Sync for TrackedBox<T> {}

impl<T> TrackedBox<T> {
    /// Moves `value` into memory from `allocator` charged to `tag`
    ///
    /// The value is handed back if the allocator cannot satisfy the request.
    /// Zero-sized types are not supported and are always handed back.
    pub fn try_new(value: T, allocator: Arc<dyn TrackedAllocator>, tag: &str) -> Result<Self, T> {
        let layout = Layout::new::<T>();
        let Some(raw) = allocator.allocate(layout, tag) else {
            return Err(value);
        };
        let ptr = raw.cast::<T>();
        // SAFETY: `raw` is a fresh allocation sized and aligned for `T`.
        unsafe { ptr::write(ptr.as_ptr(), value) };
        Ok(Self { ptr, allocator })
    }
}

impl<T> Deref for TrackedBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: `ptr` holds an initialized `T` for the life of the box.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> Drop for TrackedBox<T> {
    fn drop(&mut self) {
        // SAFETY: `ptr` holds an initialized `T` allocated with `Layout::new::<T>()`
        // and is not used after this point.
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
            self.allocator.free(self.ptr.cast(), Layout::new::<T>());
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for TrackedBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
