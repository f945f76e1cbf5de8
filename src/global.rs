//! A [`GlobalAlloc`] wrapper over the engine, in the idiom of a crate meant
//! to replace a platform's default allocator via `#[global_allocator]`.
//!
//! The engine's own payload addresses are only guaranteed 8-byte aligned
//! (the allocator's fixed alignment unit). For a `Layout` asking for a
//! stricter alignment, this module requests extra slack from the engine and
//! places the returned address at the next multiple of that alignment,
//! stashing the engine's real pointer just before it so `dealloc`/`realloc`
//! can recover it — the same "pointer just before the content" trick the
//! bump allocator this crate started from uses for its own over-alignment.

use crate::config::{Config, ALIGNMENT};
use crate::heap::Heap;
use crate::platform::SystemPlatform;
use std::alloc::{GlobalAlloc, Layout};
use std::mem;
use std::ptr;
use std::sync::{Mutex, OnceLock};

const BACKPTR_SIZE: usize = mem::size_of::<usize>();

/// `GlobalAlloc`-compatible wrapper over [`Heap<SystemPlatform>`], suitable
/// for installation via `#[global_allocator]`.
pub struct SystemHeap {
    state: OnceLock<Mutex<Heap<SystemPlatform>>>,
}

impl SystemHeap {
    /// Creates an uninitialized wrapper; the underlying [`Heap`] is built
    /// lazily on first use so this can be a `const` `static`.
    pub const fn new() -> Self {
        SystemHeap {
            state: OnceLock::new(),
        }
    }

    fn with_heap<R>(&self, f: impl FnOnce(&mut Heap<SystemPlatform>) -> R) -> R {
        let mutex = self
            .state
            .get_or_init(|| Mutex::new(Heap::new(SystemPlatform, Config::default())));
        let mut guard = mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl Default for SystemHeap {
    fn default() -> Self {
        Self::new()
    }
}

fn needs_overalign(layout: Layout) -> bool {
    layout.align() > ALIGNMENT
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Aligns `raw` up to `align`, leaving room for a back-pointer to `raw`
/// immediately before the returned address, and stashes it there.
///
/// # Safety
/// `raw` must point at a writable span of at least `align + BACKPTR_SIZE`
/// bytes.
unsafe fn align_and_stash(raw: *mut u8, align: usize) -> *mut u8 {
    unsafe {
        let min_addr = (raw as usize) + BACKPTR_SIZE;
        let aligned_addr = align_up(min_addr, align);
        let user_ptr = aligned_addr as *mut u8;
        (user_ptr.sub(BACKPTR_SIZE) as *mut usize).write(raw as usize);
        user_ptr
    }
}

/// Recovers the engine pointer stashed by [`align_and_stash`].
///
/// # Safety
/// `user_ptr` must have been returned by a prior call to [`align_and_stash`].
unsafe fn unstash(user_ptr: *mut u8) -> *mut u8 {
    unsafe { (*(user_ptr.sub(BACKPTR_SIZE) as *mut usize)) as *mut u8 }
}

unsafe impl GlobalAlloc for SystemHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.with_heap(|heap| {
            if !needs_overalign(layout) {
                return heap.allocate(layout.size());
            }
            let request = layout.size() + layout.align() + BACKPTR_SIZE;
            let raw = heap.allocate(request);
            if raw.is_null() {
                return ptr::null_mut();
            }
            unsafe { align_and_stash(raw, layout.align()) }
        })
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.with_heap(|heap| {
            let raw = if needs_overalign(layout) {
                unsafe { unstash(ptr) }
            } else {
                ptr
            };
            heap.free(raw);
        })
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        self.with_heap(|heap| {
            if !needs_overalign(layout) {
                return heap.resize(ptr, new_size);
            }
            // Over-aligned blocks carry their true engine pointer behind
            // them, so growing or shrinking in place would risk losing the
            // alignment guarantee; always relocate through a fresh alloc.
            let raw = unsafe { unstash(ptr) };
            let request = new_size + layout.align() + BACKPTR_SIZE;
            let new_raw = heap.allocate(request);
            if new_raw.is_null() {
                return ptr::null_mut();
            }
            let new_ptr = unsafe { align_and_stash(new_raw, layout.align()) };
            unsafe {
                ptr::copy_nonoverlapping(ptr, new_ptr, layout.size().min(new_size));
            }
            heap.free(raw);
            new_ptr
        })
    }
}
