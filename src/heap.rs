//! The four public entry points, orchestrating the registry, free-block
//! index and block mutators into `allocate`, `free`, `allocate_zeroed` and
//! `resize`.

use crate::align::aligned;
use crate::block::{header_padding, BlockHeader, BlockState};
use crate::config::{Config, ALIGNMENT};
use crate::index;
use crate::mutators;
use crate::platform::Platform;
use crate::registry::Registry;
use std::ptr;

/// The allocator engine: the block registry, the pre-allocation flag, and
/// the platform gateway and tunables it was built with.
///
/// Generic over [`Platform`] so tests can drive the exact same policy code
/// against [`crate::testutil::FakePlatform`] instead of real `sbrk`/`mmap`
/// calls, and so many independent heaps can coexist in one test process.
pub struct Heap<P: Platform> {
    registry: Registry,
    preallocated: bool,
    platform: P,
    config: Config,
}

impl<P: Platform> Heap<P> {
    /// Creates an empty heap over `platform` with the given tunables. No
    /// syscalls are made until the first allocation.
    pub fn new(platform: P, config: Config) -> Self {
        Heap {
            registry: Registry::new(),
            preallocated: false,
            platform,
            config,
        }
    }

    /// Allocates `size` bytes, or returns `nil` if `size == 0`.
    pub fn allocate(&mut self, size: usize) -> *mut u8 {
        self.allocate_with_threshold(size, self.config.mmap_threshold, false)
    }

    /// Allocates `count * size` zeroed bytes, or returns `nil` if `count`,
    /// `size`, or their product (on overflow) is zero.
    ///
    /// Uses the runtime page size as its mmap threshold rather than the
    /// fixed 128 KiB threshold `allocate` uses — preserved from the system
    /// this allocator generalizes, though it means this path can produce
    /// many more small mapped blocks than `allocate` would for the same
    /// size.
    pub fn allocate_zeroed(&mut self, count: usize, size: usize) -> *mut u8 {
        if count == 0 || size == 0 {
            return ptr::null_mut();
        }
        let Some(total) = count.checked_mul(size) else {
            tracing::debug!(count, size, "allocate_zeroed: size overflow, returning nil");
            return ptr::null_mut();
        };
        let page_size = self.platform.page_size();
        self.allocate_with_threshold(total, page_size, true)
    }

    fn allocate_with_threshold(&mut self, size: usize, threshold: usize, zeroed: bool) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }
        tracing::trace!(size, threshold, zeroed, "allocate");

        if header_padding() + aligned(size) > threshold {
            let block = match unsafe {
                mutators::new_block(&self.platform, &mut self.registry, size, threshold, zeroed)
            } {
                Ok(b) => b,
                Err(e) => e.abort(),
            };
            let payload = unsafe { (*block).payload() };
            tracing::trace!(?payload, "allocate: served from a fresh mapping");
            return payload;
        }

        if !self.preallocated {
            if let Err(e) =
                unsafe { mutators::prime(&self.platform, &mut self.registry, self.config.prealloc_size) }
            {
                e.abort();
            }
            self.preallocated = true;
        }

        unsafe { index::coalesce(&mut self.registry) };

        let reused = unsafe {
            let best = index::find_best_fit(&self.registry, size);
            if !best.is_null() {
                if (*best).payload_size - aligned(size) >= header_padding() + ALIGNMENT {
                    mutators::split(&mut self.registry, best, size);
                } else {
                    (*best).state = BlockState::Allocated;
                }
                Some((*best).payload())
            } else {
                let last = self.registry.last_contiguous();
                if !last.is_null() && (*last).state == BlockState::Free {
                    match mutators::expand_last(&self.platform, last, size) {
                        Ok(()) => Some((*last).payload()),
                        Err(e) => e.abort(),
                    }
                } else {
                    None
                }
            }
        };

        let payload = match reused {
            Some(p) => p,
            None => {
                let block = match unsafe {
                    mutators::new_block(&self.platform, &mut self.registry, size, threshold, false)
                } {
                    Ok(b) => b,
                    Err(e) => e.abort(),
                };
                unsafe { (*block).payload() }
            }
        };

        if zeroed {
            unsafe { ptr::write_bytes(payload, 0, aligned(size)) };
        }
        tracing::trace!(?payload, "allocate: returning");
        payload
    }

    /// Releases the block at `ptr`. A no-op for `nil` or for a pointer this
    /// heap never handed out.
    pub fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        tracing::trace!(?ptr, "free");
        let Some(block) = (unsafe { self.find_block(ptr) }) else {
            return;
        };
        unsafe {
            match (*block).state {
                BlockState::Allocated => {
                    (*block).state = BlockState::Free;
                }
                BlockState::Mapped => {
                    let span = (*block).span();
                    self.registry.remove(block);
                    if let Err(e) = self.platform.unmap(block as *mut u8, span) {
                        e.abort();
                    }
                }
                BlockState::Free => {}
            }
        }
    }

    /// Resizes the block at `ptr` to `new_size` bytes, preserving
    /// `min(old_size, new_size)` bytes of content. `ptr == nil` behaves like
    /// `allocate`; `new_size == 0` behaves like `free`, returning `nil`.
    pub fn resize(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        if ptr.is_null() {
            return self.allocate(new_size);
        }
        if new_size == 0 {
            self.free(ptr);
            return ptr::null_mut();
        }
        tracing::trace!(?ptr, new_size, "resize");

        unsafe { index::coalesce(&mut self.registry) };

        let block = match unsafe { self.find_block(ptr) } {
            Some(b) => b,
            None => return ptr::null_mut(),
        };

        unsafe {
            if (*block).state == BlockState::Free {
                return ptr::null_mut();
            }

            let threshold = self.config.mmap_threshold;
            if (*block).state == BlockState::Mapped || header_padding() + aligned(new_size) > threshold {
                tracing::debug!("resize: relocating (mapped or over threshold)");
                return self.relocate(block, ptr, new_size);
            }

            let want = aligned(new_size);
            let have = (*block).payload_size;

            if want == have {
                return ptr;
            }

            if want < have {
                if have - want >= header_padding() + ALIGNMENT {
                    mutators::split(&mut self.registry, block, new_size);
                }
                return ptr;
            }

            if block == self.registry.last_contiguous() {
                match mutators::expand_last(&self.platform, block, new_size) {
                    Ok(()) => return ptr,
                    Err(e) => e.abort(),
                }
            }

            let next = (*block).next;
            let anchor = self.registry.anchor();
            if next != anchor
                && (*next).state == BlockState::Free
                && have + header_padding() + (*next).payload_size >= want
            {
                tracing::debug!("resize: absorbing adjacent free block");
                (*block).payload_size = have + header_padding() + (*next).payload_size;
                self.registry.remove(next);
                if (*block).payload_size - want >= header_padding() + ALIGNMENT {
                    mutators::split(&mut self.registry, block, new_size);
                } else {
                    (*block).state = BlockState::Allocated;
                }
                return ptr;
            }

            tracing::debug!("resize: relocating (no in-place room)");
            self.relocate(block, ptr, new_size)
        }
    }

    /// `allocate`s a new block, copies the overlapping prefix, and `free`s
    /// the old one.
    ///
    /// # Safety
    /// `block` must be the header for `ptr`, currently live in this
    /// registry.
    unsafe fn relocate(&mut self, block: *mut BlockHeader, ptr: *mut u8, new_size: usize) -> *mut u8 {
        unsafe {
            let copy_len = aligned(new_size).min((*block).payload_size);
            let new_ptr = self.allocate(new_size);
            if !new_ptr.is_null() {
                ptr::copy(ptr, new_ptr, copy_len);
            }
            self.free(ptr);
            new_ptr
        }
    }

    /// Walks the registry checking that every block's links agree with its
    /// neighbors' (`next.prev == self` and vice versa). Holds unconditionally,
    /// after any operation. Returns a description of the first violation
    /// found.
    ///
    /// Exposed unconditionally, not behind `#[cfg(test)]`, so integration
    /// tests under `tests/` can assert it after arbitrary operation
    /// sequences.
    pub fn check_link_consistency(&self) -> Result<(), String> {
        unsafe {
            if self.registry.is_empty() {
                return Ok(());
            }
            let anchor = self.registry.anchor();
            let mut cur = anchor;
            loop {
                let next = (*cur).next;
                if (*next).prev != cur {
                    return Err(format!("{:?}.next ({:?}).prev != {:?}", cur, next, cur));
                }
                cur = next;
                if cur == anchor {
                    break;
                }
            }
            Ok(())
        }
    }

    /// Walks the registry checking that no two list-adjacent blocks are
    /// both `Free` (coalescing should always have merged them already).
    /// Only guaranteed to hold once at least one `allocate`/`resize` has run
    /// since the last `free`, since coalescing is lazy — a block just
    /// handed to `free` may sit next to another `Free` block until then.
    /// Returns a description of the first violation found.
    ///
    /// Exposed unconditionally, not behind `#[cfg(test)]`, so integration
    /// tests under `tests/` can assert it after arbitrary operation
    /// sequences.
    pub fn check_no_adjacent_free(&self) -> Result<(), String> {
        unsafe {
            if self.registry.is_empty() {
                return Ok(());
            }
            let anchor = self.registry.anchor();
            let mut cur = anchor;
            loop {
                let next = (*cur).next;
                if next != cur
                    && (*cur).state == BlockState::Free
                    && (*next).state == BlockState::Free
                {
                    return Err(format!("adjacent free blocks at {:?} and {:?}", cur, next));
                }
                cur = next;
                if cur == anchor {
                    break;
                }
            }
            Ok(())
        }
    }

    /// Runs both [`Self::check_link_consistency`] and
    /// [`Self::check_no_adjacent_free`].
    pub fn check_invariants(&self) -> Result<(), String> {
        self.check_link_consistency()?;
        self.check_no_adjacent_free()
    }

    /// Walks the registry looking for the block whose payload address is
    /// `ptr`. Returns `None` for foreign pointers rather than detecting
    /// misuse; per the allocator's contract this is undefined behavior the
    /// caller is responsible for avoiding.
    unsafe fn find_block(&self, ptr: *mut u8) -> Option<*mut BlockHeader> {
        unsafe {
            if self.registry.is_empty() {
                return None;
            }
            let anchor = self.registry.anchor();
            let mut cur = anchor;
            loop {
                if (*cur).payload() == ptr {
                    return Some(cur);
                }
                cur = (*cur).next;
                if cur == anchor {
                    break;
                }
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakePlatform;

    fn heap() -> Heap<FakePlatform> {
        Heap::new(FakePlatform::default(), Config::default())
    }

    fn heap_with_threshold(threshold: usize) -> Heap<FakePlatform> {
        Heap::new(
            FakePlatform::default(),
            Config {
                mmap_threshold: threshold,
                prealloc_size: threshold,
            },
        )
    }

    #[test]
    fn allocate_zero_returns_nil_and_touches_nothing() {
        let mut h = heap();
        assert!(h.allocate(0).is_null());
        assert_eq!(h.platform.break_offset(), 0);
        assert_eq!(h.platform.live_mappings(), 0);
    }

    #[test]
    fn allocate_returns_aligned_pointers() {
        let mut h = heap();
        for size in [1usize, 3, 7, 8, 9, 100, 4096] {
            let p = h.allocate(size);
            assert!(!p.is_null());
            assert_eq!(p as usize % ALIGNMENT, 0);
        }
    }

    #[test]
    fn free_then_allocate_same_size_reuses_storage() {
        let mut h = heap();
        let p = h.allocate(100);
        h.free(p);
        let q = h.allocate(100);
        assert_eq!(p, q);
    }

    #[test]
    fn first_small_allocation_primes_region_once() {
        let mut h = heap();
        assert!(!h.preallocated);
        let _ = h.allocate(16);
        assert!(h.preallocated);
        let offset_after_first = h.platform.break_offset();
        assert_eq!(offset_after_first, h.config.prealloc_size);
        let _ = h.allocate(16);
        assert_eq!(h.platform.break_offset(), offset_after_first);
    }

    #[test]
    fn large_allocation_is_mapped_not_broken() {
        let mut h = heap();
        let p = h.allocate(200_000);
        assert!(!p.is_null());
        assert_eq!(h.platform.break_offset(), 0);
        assert_eq!(h.platform.live_mappings(), 1);
        h.free(p);
        assert_eq!(h.platform.live_mappings(), 0);
    }

    #[test]
    fn coalesce_then_expand_satisfies_larger_request() {
        let mut h = heap();
        let a = h.allocate(100);
        let b = h.allocate(100);
        h.free(a);
        h.free(b);
        let c = h.allocate(250);
        assert!(!c.is_null());
    }

    #[test]
    fn coalesce_collapses_a_run_of_three_free_blocks_in_one_sweep() {
        // Size a tightly-fitted contiguous region so priming's single Free
        // block splits into exactly three equal pieces: two carved out by
        // the allocate() calls below, one left as the final remainder.
        // Freeing the first two leaves three adjacent Free blocks wrapping
        // around the anchor itself (the anchor is the first of the three).
        let piece = aligned(100);
        let prealloc = header_padding() * 3 + piece * 3;
        let mut h = heap_with_threshold(prealloc);

        let a = h.allocate(100);
        let b = h.allocate(100);
        h.free(a);
        h.free(b);
        // Coalescing is lazy: the three adjacent Free blocks are expected
        // here, before the next allocate/resize runs it.

        // Only a full three-way merge provides this much contiguous space;
        // merging just two of the three pieces falls one alignment unit
        // short, which would force a break extension instead.
        let want = 2 * piece + header_padding() + ALIGNMENT;
        let break_before = h.platform.break_offset();
        let d = h.allocate(want);
        assert!(!d.is_null());
        assert_eq!(
            h.platform.break_offset(),
            break_before,
            "a full three-way coalesce should have satisfied this without growing the break"
        );
        h.check_invariants().unwrap();
    }

    #[test]
    fn resize_shrink_returns_same_pointer_and_splits() {
        let mut h = heap();
        let p = h.allocate(100);
        let q = h.resize(p, 50);
        assert_eq!(p, q);
    }

    #[test]
    fn resize_same_aligned_size_is_a_no_op() {
        let mut h = heap();
        let p = h.allocate(100);
        let q = h.resize(p, 103); // aligned(100) == aligned(103) == 104
        assert_eq!(p, q);
    }

    #[test]
    fn resize_preserves_content_across_relocation() {
        let mut h = heap();
        let p = h.allocate(100);
        unsafe {
            for i in 0..100u8 {
                *p.add(i as usize) = i;
            }
        }
        let q = h.resize(p, 200_000);
        assert_ne!(p, q);
        unsafe {
            for i in 0..100u8 {
                assert_eq!(*q.add(i as usize), i);
            }
        }
        assert_eq!(h.platform.live_mappings(), 1);
    }

    #[test]
    fn resize_nil_pointer_behaves_like_allocate() {
        let mut h = heap();
        let p = h.resize(ptr::null_mut(), 64);
        assert!(!p.is_null());
    }

    #[test]
    fn resize_to_zero_frees_and_returns_nil() {
        let mut h = heap();
        let p = h.allocate(64);
        let q = h.resize(p, 0);
        assert!(q.is_null());
        let r = h.allocate(64);
        assert_eq!(p, r);
    }

    #[test]
    fn resize_on_freed_block_returns_nil() {
        let mut h = heap();
        let p = h.allocate(64);
        h.free(p);
        let q = h.resize(p, 32);
        assert!(q.is_null());
    }

    #[test]
    fn free_nil_is_a_noop() {
        let mut h = heap();
        h.free(ptr::null_mut());
    }

    #[test]
    fn free_of_unknown_pointer_is_ignored() {
        let mut h = heap();
        let bogus = 0x1234usize as *mut u8;
        h.free(bogus);
    }

    #[test]
    fn allocate_zeroed_is_all_zero() {
        let mut h = heap();
        let p = h.allocate_zeroed(10, 10);
        assert!(!p.is_null());
        unsafe {
            for i in 0..aligned(100) {
                assert_eq!(*p.add(i), 0);
            }
        }
    }

    #[test]
    fn allocate_zeroed_rejects_zero_count_or_size() {
        let mut h = heap();
        assert!(h.allocate_zeroed(0, 10).is_null());
        assert!(h.allocate_zeroed(10, 0).is_null());
    }

    #[test]
    fn allocate_zeroed_rejects_overflowing_product() {
        let mut h = heap();
        assert!(h.allocate_zeroed(usize::MAX, 2).is_null());
    }

    #[test]
    fn allocate_zeroed_uses_page_size_threshold() {
        let mut h = heap();
        let page = h.platform.page_size();
        // Bigger than the fake page size but well under the 128 KiB
        // allocate() threshold: must still be mapped, not broken.
        let size = page + 1;
        assert!(header_padding() + aligned(size) <= Config::DEFAULT_MMAP_THRESHOLD);
        let p = h.allocate_zeroed(1, size);
        assert!(!p.is_null());
        assert_eq!(h.platform.live_mappings(), 1);
    }

    #[test]
    fn exact_fit_allocation_does_not_split() {
        let mut h = heap();
        let prealloc_payload = h.config.prealloc_size - header_padding();
        let p = h.allocate(prealloc_payload);
        assert!(!p.is_null());
        h.free(p);
        // Re-requesting the exact same size must reuse without creating a
        // trailing free fragment.
        let q = h.allocate(prealloc_payload);
        assert_eq!(p, q);
        unsafe {
            let block = h.find_block(q).unwrap();
            assert_eq!((*block).next, block);
        }
    }

    #[test]
    fn split_remainder_boundary() {
        // A slack of exactly header_padding() + ALIGNMENT splits; one
        // alignment unit smaller does not (requested sizes are already
        // alignment-unit multiples, so that's the smallest meaningful step).
        let threshold = 4096;
        let total_payload = threshold - header_padding();

        // Case 1: slack == header_padding() + ALIGNMENT -> splits.
        let mut h = heap_with_threshold(threshold);
        let want = total_payload - (header_padding() + ALIGNMENT);
        let p = h.allocate(want);
        h.free(p);
        let p = h.allocate(want);
        unsafe {
            let block = h.find_block(p).unwrap();
            assert_ne!((*block).next, block, "expected a trailing free block");
        }
        h.free(p);

        // Case 2: slack == header_padding() -> no split.
        let mut h2 = heap_with_threshold(threshold);
        let want2 = total_payload - header_padding();
        let p2 = h2.allocate(want2);
        unsafe {
            let block = h2.find_block(p2).unwrap();
            assert_eq!((*block).next, block, "expected no split to occur");
        }
    }
}
