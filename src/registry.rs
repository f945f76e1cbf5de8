//! The single intrusive circular doubly-linked list of all known blocks.
//!
//! Ordering is insertion order; new blocks are appended immediately before
//! the anchor. The list is empty (anchor = nil) until the first block is
//! appended.

use crate::block::{BlockHeader, BlockState};
use std::ptr;

/// The registry of every live block, contiguous or mapped.
pub(crate) struct Registry {
    anchor: *mut BlockHeader,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            anchor: ptr::null_mut(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.anchor.is_null()
    }

    pub fn anchor(&self) -> *mut BlockHeader {
        self.anchor
    }

    /// Splices `block` in just before the anchor (i.e. appends it as the
    /// newest block). `block`'s `payload_size`/`state` must already be set;
    /// this only wires up `next`/`prev`.
    ///
    /// # Safety
    /// `block` must point at a valid, otherwise-unlinked header.
    pub unsafe fn append(&mut self, block: *mut BlockHeader) {
        unsafe {
            if self.anchor.is_null() {
                (*block).next = block;
                (*block).prev = block;
                self.anchor = block;
                return;
            }
            let last = (*self.anchor).prev;
            (*block).next = self.anchor;
            (*block).prev = last;
            (*last).next = block;
            (*self.anchor).prev = block;
        }
    }

    /// Splices `block` into the list immediately after `after`.
    ///
    /// # Safety
    /// `after` must be a live member of this registry and `block` must
    /// point at a valid, otherwise-unlinked header.
    pub unsafe fn insert_after(&mut self, after: *mut BlockHeader, block: *mut BlockHeader) {
        unsafe {
            let next = (*after).next;
            (*block).prev = after;
            (*block).next = next;
            (*after).next = block;
            (*next).prev = block;
        }
    }

    /// Unlinks `block` from the registry.
    ///
    /// # Safety
    /// `block` must be a live member of this registry.
    pub unsafe fn remove(&mut self, block: *mut BlockHeader) {
        unsafe {
            if (*block).next == block {
                self.anchor = ptr::null_mut();
                return;
            }
            (*(*block).prev).next = (*block).next;
            (*(*block).next).prev = (*block).prev;
            if self.anchor == block {
                self.anchor = (*block).next;
            }
        }
    }

    /// The rearmost block with state `Allocated` or `Free`, scanning
    /// backward from the anchor's predecessor and wrapping through every
    /// member exactly once. `nil` if no such block exists.
    ///
    /// The original C implementation this is modeled on stops the backward
    /// walk one step early (at the starting block rather than after the
    /// full cycle), which can miss the rearmost contiguous block when the
    /// tail of the registry is all `Mapped`. This walk instead terminates
    /// only after it has examined the anchor itself, so every member is
    /// checked once.
    ///
    /// # Safety
    /// The registry must be well-formed (every `next`/`prev` link
    /// consistent).
    pub unsafe fn last_contiguous(&self) -> *mut BlockHeader {
        unsafe {
            if self.anchor.is_null() {
                return ptr::null_mut();
            }
            let mut cur = (*self.anchor).prev;
            loop {
                if matches!((*cur).state, BlockState::Allocated | BlockState::Free) {
                    return cur;
                }
                if cur == self.anchor {
                    break;
                }
                cur = (*cur).prev;
            }
            ptr::null_mut()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::header_padding;

    unsafe fn make_block(state: BlockState, payload_size: usize) -> *mut BlockHeader {
        unsafe {
            let span = header_padding() + payload_size;
            let mut buf = vec![0u8; span].into_boxed_slice();
            let ptr = buf.as_mut_ptr() as *mut BlockHeader;
            std::mem::forget(buf);
            (*ptr).payload_size = payload_size;
            (*ptr).state = state;
            ptr
        }
    }

    unsafe fn free_block(block: *mut BlockHeader) {
        unsafe {
            let span = header_padding() + (*block).payload_size;
            drop(Box::from_raw(std::slice::from_raw_parts_mut(
                block as *mut u8,
                span,
            )));
        }
    }

    #[test]
    fn append_single_block_self_loops() {
        unsafe {
            let mut registry = Registry::new();
            let block = make_block(BlockState::Free, 32);
            registry.append(block);
            assert_eq!((*block).next, block);
            assert_eq!((*block).prev, block);
            assert_eq!(registry.anchor(), block);
            free_block(block);
        }
    }

    #[test]
    fn append_preserves_insertion_order_and_links() {
        unsafe {
            let mut registry = Registry::new();
            let a = make_block(BlockState::Allocated, 8);
            let b = make_block(BlockState::Allocated, 16);
            let c = make_block(BlockState::Allocated, 24);
            registry.append(a);
            registry.append(b);
            registry.append(c);

            assert_eq!(registry.anchor(), a);
            assert_eq!((*a).next, b);
            assert_eq!((*b).next, c);
            assert_eq!((*c).next, a);
            assert_eq!((*a).prev, c);
            assert_eq!((*b).prev, a);
            assert_eq!((*c).prev, b);

            free_block(a);
            free_block(b);
            free_block(c);
        }
    }

    #[test]
    fn remove_middle_block_relinks_neighbors() {
        unsafe {
            let mut registry = Registry::new();
            let a = make_block(BlockState::Allocated, 8);
            let b = make_block(BlockState::Allocated, 16);
            let c = make_block(BlockState::Allocated, 24);
            registry.append(a);
            registry.append(b);
            registry.append(c);

            registry.remove(b);
            assert_eq!((*a).next, c);
            assert_eq!((*c).prev, a);

            free_block(a);
            free_block(c);
            free_block(b);
        }
    }

    #[test]
    fn remove_sole_block_empties_registry() {
        unsafe {
            let mut registry = Registry::new();
            let a = make_block(BlockState::Allocated, 8);
            registry.append(a);
            registry.remove(a);
            assert!(registry.is_empty());
            free_block(a);
        }
    }

    #[test]
    fn remove_anchor_advances_anchor() {
        unsafe {
            let mut registry = Registry::new();
            let a = make_block(BlockState::Allocated, 8);
            let b = make_block(BlockState::Allocated, 16);
            registry.append(a);
            registry.append(b);

            registry.remove(a);
            assert_eq!(registry.anchor(), b);
            assert_eq!((*b).next, b);
            assert_eq!((*b).prev, b);

            free_block(a);
            free_block(b);
        }
    }

    #[test]
    fn last_contiguous_skips_trailing_mapped_blocks() {
        unsafe {
            let mut registry = Registry::new();
            let a = make_block(BlockState::Free, 8);
            let b = make_block(BlockState::Mapped, 16);
            let c = make_block(BlockState::Mapped, 24);
            registry.append(a);
            registry.append(b);
            registry.append(c);

            assert_eq!(registry.last_contiguous(), a);

            free_block(a);
            free_block(b);
            free_block(c);
        }
    }

    #[test]
    fn last_contiguous_is_nil_when_all_mapped() {
        unsafe {
            let mut registry = Registry::new();
            let a = make_block(BlockState::Mapped, 8);
            registry.append(a);
            assert!(registry.last_contiguous().is_null());
            free_block(a);
        }
    }

    #[test]
    fn insert_after_splices_between_neighbors() {
        unsafe {
            let mut registry = Registry::new();
            let a = make_block(BlockState::Allocated, 8);
            let c = make_block(BlockState::Allocated, 24);
            registry.append(a);
            registry.append(c);

            let b = make_block(BlockState::Free, 16);
            registry.insert_after(a, b);

            assert_eq!((*a).next, b);
            assert_eq!((*b).next, c);
            assert_eq!((*c).prev, b);
            assert_eq!((*b).prev, a);

            free_block(a);
            free_block(b);
            free_block(c);
        }
    }
}
