//! The four syscall-like primitives the allocator treats as its only
//! dependency on the operating system: break extension, anonymous mapping,
//! unmapping, and page size. Every other module in the crate consumes this
//! interface only, never `libc` directly.

use crate::error::{os_errno, PlatformError};

/// Abstraction over `sbrk`/`mmap`/`munmap`/page-size.
///
/// Implemented once for real ([`SystemPlatform`], backed by `libc`) and
/// again in `segheap::testutil` by an in-memory fake, so the policy engine
/// in [`crate::heap`] can be exercised without a real process break or real
/// mappings.
pub trait Platform {
    /// Grows the contiguous region by exactly `delta` bytes, returning the
    /// address of the old end (the base of the newly available span).
    fn extend_break(&self, delta: usize) -> Result<*mut u8, PlatformError>;

    /// Creates a fresh read/write private anonymous mapping of `bytes`
    /// bytes.
    fn map_anonymous(&self, bytes: usize) -> Result<*mut u8, PlatformError>;

    /// Releases a mapping previously returned by [`Self::map_anonymous`].
    fn unmap(&self, base: *mut u8, bytes: usize) -> Result<(), PlatformError>;

    /// The operating system's page size, in bytes.
    fn page_size(&self) -> usize;
}

/// The production gateway: `sbrk`, `mmap`, `munmap` and `sysconf` from
/// `libc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPlatform;

impl Platform for SystemPlatform {
    fn extend_break(&self, delta: usize) -> Result<*mut u8, PlatformError> {
        tracing::trace!(delta, "extend_break");
        let old_break = unsafe { libc::sbrk(delta as libc::intptr_t) };
        if old_break == usize::MAX as *mut libc::c_void {
            return Err(PlatformError::ExtendBreak {
                delta,
                errno: os_errno(),
            });
        }
        Ok(old_break as *mut u8)
    }

    fn map_anonymous(&self, bytes: usize) -> Result<*mut u8, PlatformError> {
        tracing::trace!(bytes, "map_anonymous");
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                bytes,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(PlatformError::MapAnonymous {
                bytes,
                errno: os_errno(),
            });
        }
        Ok(addr as *mut u8)
    }

    fn unmap(&self, base: *mut u8, bytes: usize) -> Result<(), PlatformError> {
        tracing::trace!(base = ?base, bytes, "unmap");
        let ret = unsafe { libc::munmap(base as *mut libc::c_void, bytes) };
        if ret < 0 {
            return Err(PlatformError::Unmap {
                base: base as usize,
                bytes,
                errno: os_errno(),
            });
        }
        Ok(())
    }

    fn page_size(&self) -> usize {
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    }
}
