//! Best-fit search and lazy coalescing over the block registry.

use crate::align::aligned;
use crate::block::{header_padding, BlockHeader, BlockState};
use crate::registry::Registry;
use std::ptr;

/// Returns the `Free` block minimizing `payload_size - aligned(requested)`
/// among those with `payload_size >= aligned(requested)`; ties go to the
/// one encountered first. `nil` if none qualifies. O(n) over the registry.
///
/// # Safety
/// The registry must be well-formed.
pub(crate) unsafe fn find_best_fit(registry: &Registry, requested: usize) -> *mut BlockHeader {
    unsafe {
        if registry.is_empty() {
            return ptr::null_mut();
        }
        let want = aligned(requested);
        let anchor = registry.anchor();
        let mut cur = anchor;
        let mut best: *mut BlockHeader = ptr::null_mut();
        let mut best_slack = usize::MAX;
        loop {
            if (*cur).state == BlockState::Free && (*cur).payload_size >= want {
                let slack = (*cur).payload_size - want;
                if slack < best_slack {
                    best_slack = slack;
                    best = cur;
                }
            }
            cur = (*cur).next;
            if cur == anchor {
                break;
            }
        }
        best
    }
}

/// Merges every run of adjacent `Free` contiguous blocks into one, in a
/// single pass from the anchor. Never crosses a `Mapped` block, since mapped
/// blocks are not contiguous with their registry neighbors in address space.
///
/// The cursor always advances to the next block at the bottom of the loop;
/// a merge first steps it back one position so that advance lands back on
/// the merged block itself, re-examining it against its new successor. This
/// is what lets a run of three or more `Free` blocks collapse in one sweep:
/// stepping to the block *after* a freshly merged one (as a plain
/// conditional advance would) skips checking the merged block against its
/// new neighbor and leaves that pair un-coalesced.
///
/// The end of the contiguous region (`anchor`'s predecessor) is recomputed
/// on every iteration rather than cached, since a merge can shrink it; this
/// matches the shape of the original's `LAST_BLOCK` macro, which
/// re-dereferences `anchor->prev` on each loop check rather than freezing
/// it at the start of the pass.
///
/// # Safety
/// The registry must be well-formed.
pub(crate) unsafe fn coalesce(registry: &mut Registry) {
    unsafe {
        if registry.is_empty() {
            return;
        }
        let anchor = registry.anchor();
        let mut cur = anchor;
        loop {
            if cur == (*anchor).prev {
                break;
            }
            let next = (*cur).next;
            if (*cur).state == BlockState::Free && (*next).state == BlockState::Free {
                (*cur).payload_size += header_padding() + (*next).payload_size;
                (*cur).next = (*next).next;
                (*(*cur).next).prev = cur;
                tracing::debug!(
                    merged_into = ?cur,
                    new_payload_size = (*cur).payload_size,
                    "coalesced adjacent free blocks"
                );
                cur = (*cur).prev;
            }
            cur = (*cur).next;
        }
    }
}
