//! Block construction and in-place resizing primitives: `split`,
//! `expand_last`, `prime` and `new_block`.

use crate::align::aligned;
use crate::block::{header_padding, BlockHeader, BlockState};
use crate::error::PlatformError;
use crate::platform::Platform;
use crate::registry::Registry;

/// Carves the tail of `block` into a new `Free` block once `requested`
/// bytes are served from its front.
///
/// # Safety
/// `block` must be a live member of `registry` with
/// `block.payload_size - aligned(requested) >= header_padding() + ALIGNMENT`,
/// i.e. the remainder must be large enough to host another header plus at
/// least one alignment unit of payload.
pub(crate) unsafe fn split(registry: &mut Registry, block: *mut BlockHeader, requested: usize) {
    unsafe {
        let want = aligned(requested);
        let remainder = (*block).payload_size - want - header_padding();
        tracing::debug!(want, remainder, "splitting block");

        let tail = (block as *mut u8).add(header_padding()).add(want) as *mut BlockHeader;
        (*tail).payload_size = remainder;
        (*tail).state = BlockState::Free;

        (*block).payload_size = want;
        (*block).state = BlockState::Allocated;

        registry.insert_after(block, tail);
    }
}

/// Grows the tail contiguous block (which must be `Free`) to `requested`
/// bytes by extending the break.
///
/// # Safety
/// `block` must be the registry's rearmost contiguous block and its state
/// must be `Allocated` or `Free` (`resize`'s in-place-grow path calls this
/// on an `Allocated` block; the fresh-growth path in `Heap::allocate` on a
/// `Free` one). Either way the state is overwritten to `Allocated`.
pub(crate) unsafe fn expand_last<P: Platform>(
    platform: &P,
    block: *mut BlockHeader,
    requested: usize,
) -> Result<(), PlatformError> {
    unsafe {
        let want = aligned(requested);
        let delta = want - (*block).payload_size;
        tracing::debug!(delta, "expanding tail block");
        platform.extend_break(delta)?;
        (*block).payload_size = want;
        (*block).state = BlockState::Allocated;
        Ok(())
    }
}

/// One-time initial growth of the contiguous region by `prealloc_size`
/// bytes, producing a single `Free` block of payload
/// `prealloc_size - header_padding()`.
///
/// # Safety
/// Must only be called once per registry, before any other contiguous block
/// exists.
pub(crate) unsafe fn prime<P: Platform>(
    platform: &P,
    registry: &mut Registry,
    prealloc_size: usize,
) -> Result<(), PlatformError> {
    unsafe {
        tracing::debug!(prealloc_size, "priming contiguous region");
        let base = platform.extend_break(prealloc_size)?;
        let block = base as *mut BlockHeader;
        (*block).payload_size = prealloc_size - header_padding();
        (*block).state = BlockState::Free;
        registry.append(block);
        Ok(())
    }
}

/// Creates a brand new block for `requested` bytes, choosing the contiguous
/// region or a fresh anonymous mapping depending on whether the span fits
/// under `threshold`, zeroing the payload if `zeroed` is set. Appends the
/// new block to `registry`.
///
/// # Safety
/// `registry` must be well-formed.
pub(crate) unsafe fn new_block<P: Platform>(
    platform: &P,
    registry: &mut Registry,
    requested: usize,
    threshold: usize,
    zeroed: bool,
) -> Result<*mut BlockHeader, PlatformError> {
    unsafe {
        let want = aligned(requested);
        let span = header_padding() + want;

        let (base, state) = if span <= threshold {
            tracing::debug!(span, "new block via break extension");
            (platform.extend_break(span)?, BlockState::Allocated)
        } else {
            tracing::debug!(span, "new block via anonymous mapping");
            (platform.map_anonymous(span)?, BlockState::Mapped)
        };

        let block = base as *mut BlockHeader;
        (*block).payload_size = want;
        (*block).state = state;

        if zeroed && state == BlockState::Allocated {
            std::ptr::write_bytes((*block).payload(), 0, want);
        }

        registry.append(block);
        Ok(block)
    }
}
