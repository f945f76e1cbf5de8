//! An in-memory fake [`Platform`](crate::platform::Platform), so the policy
//! engine in [`crate::heap`] can be driven by tests without a real process
//! break or real mappings.
//!
//! Not behind `#[cfg(test)]` so integration tests under `tests/` (a separate
//! compilation unit from the crate) can use it too.

use crate::error::PlatformError;
use crate::platform::Platform;
use std::cell::RefCell;

/// A fake contiguous region plus a set of fake anonymous mappings, each
/// backed by ordinary heap memory allocated through `std`.
///
/// The contiguous region is a fixed-capacity buffer reserved up front and
/// never reallocated, so pointers handed out by `extend_break` stay valid
/// for the fake's lifetime — unlike a `Vec` that might move on growth.
pub struct FakePlatform {
    arena: Box<[u8]>,
    brk: RefCell<usize>,
    page_size: usize,
    mappings: RefCell<Vec<(usize, usize)>>,
}

impl FakePlatform {
    /// Creates a fake platform with a contiguous-region arena of
    /// `arena_capacity` bytes and the given fake page size.
    pub fn new(arena_capacity: usize, page_size: usize) -> Self {
        FakePlatform {
            arena: vec![0u8; arena_capacity].into_boxed_slice(),
            brk: RefCell::new(0),
            page_size,
            mappings: RefCell::new(Vec::new()),
        }
    }

    /// How many bytes of the fake contiguous region are currently in use.
    pub fn break_offset(&self) -> usize {
        *self.brk.borrow()
    }

    /// How many fake anonymous mappings are currently outstanding.
    pub fn live_mappings(&self) -> usize {
        self.mappings.borrow().len()
    }
}

impl Default for FakePlatform {
    fn default() -> Self {
        // 16 MiB is comfortably larger than any single test's allocation
        // traffic while staying cheap to zero-initialize.
        FakePlatform::new(16 * 1024 * 1024, 4096)
    }
}

impl Platform for FakePlatform {
    fn extend_break(&self, delta: usize) -> Result<*mut u8, PlatformError> {
        let mut brk = self.brk.borrow_mut();
        let old = *brk;
        assert!(
            old + delta <= self.arena.len(),
            "FakePlatform arena exhausted: requested {delta} bytes at offset {old}, capacity {}",
            self.arena.len()
        );
        *brk += delta;
        Ok(unsafe { self.arena.as_ptr().add(old) as *mut u8 })
    }

    fn map_anonymous(&self, bytes: usize) -> Result<*mut u8, PlatformError> {
        let mut buf = vec![0u8; bytes].into_boxed_slice();
        let ptr = buf.as_mut_ptr();
        std::mem::forget(buf);
        self.mappings.borrow_mut().push((ptr as usize, bytes));
        Ok(ptr)
    }

    fn unmap(&self, base: *mut u8, bytes: usize) -> Result<(), PlatformError> {
        let mut mappings = self.mappings.borrow_mut();
        let pos = mappings
            .iter()
            .position(|&(p, _)| p == base as usize)
            .expect("unmap of an address FakePlatform never mapped");
        mappings.remove(pos);
        unsafe {
            drop(Box::from_raw(std::slice::from_raw_parts_mut(base, bytes)));
        }
        Ok(())
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}
