//! The block header embedded at the front of every contiguous or mapped
//! span.
//!
//! A block's header and payload always live in a single span of memory
//! obtained from the platform gateway; `BlockHeader` is placed at the base
//! of that span and the payload begins `header_padding()` bytes after it.

use crate::align::aligned;
use std::mem;

/// What kind of storage a block's span occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// Lives in the contiguous region, currently handed out to a caller.
    Allocated,
    /// Lives in the contiguous region, available to the best-fit search.
    Free,
    /// Lives in its own anonymous mapping. Never becomes `Free`.
    Mapped,
}

/// The header placed immediately before every block's payload.
///
/// `next`/`prev` are only dangling between construction and the `append`/
/// `insert_after` call that splices the block into the registry.
#[repr(C)]
pub(crate) struct BlockHeader {
    pub payload_size: usize,
    pub state: BlockState,
    pub next: *mut BlockHeader,
    pub prev: *mut BlockHeader,
}

/// Header size rounded up to the alignment unit; also the offset from a
/// block's base address to its payload.
pub(crate) fn header_padding() -> usize {
    aligned(mem::size_of::<BlockHeader>())
}

impl BlockHeader {
    /// The address of this block's payload.
    ///
    /// # Safety
    /// `self` must point at a header that has already been initialized
    /// (`payload_size`/`state` set) by its creator.
    pub unsafe fn payload(&self) -> *mut u8 {
        unsafe { (self as *const Self as *mut u8).add(header_padding()) }
    }

    /// Total span size in bytes (header + payload) — what was requested
    /// from the platform gateway when this block was created.
    pub fn span(&self) -> usize {
        header_padding() + self.payload_size
    }
}
