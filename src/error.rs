//! The fatal-failure path for the four platform primitives.
//!
//! The contract with [`crate::platform::Platform`] is that break extension
//! and mapping creation/destruction never fail in practice; when the
//! operating system disagrees there is nothing sensible left to do, so the
//! allocator logs the failure and aborts. [`PlatformError`] exists so that
//! path has a typed, testable shape rather than being an inline `abort()`
//! scattered across every call site.

use thiserror::Error;

/// A platform primitive reported failure.
///
/// Never returned across the crate's public pointer-level API: every
/// internal call site turns this into a logged [`std::process::abort`] via
/// [`PlatformError::abort`]. The type is public so a test harness driving a
/// fake [`crate::platform::Platform`] can assert on which primitive a
/// simulated failure would have produced.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("failed to extend the program break by {delta} bytes (errno {errno})")]
    ExtendBreak { delta: usize, errno: i32 },

    #[error("failed to create an anonymous mapping of {bytes} bytes (errno {errno})")]
    MapAnonymous { bytes: usize, errno: i32 },

    #[error("failed to unmap {bytes} bytes at {base:#x} (errno {errno})")]
    Unmap { base: usize, bytes: usize, errno: i32 },
}

impl PlatformError {
    /// Logs the failure at `error` level and aborts the process.
    ///
    /// This is the only place in the crate that turns a `Result` into a
    /// process abort; every other module propagates `PlatformError` with
    /// `?` up to a call site that invokes this.
    pub fn abort(self) -> ! {
        tracing::error!(error = %self, "fatal platform failure, aborting");
        std::process::abort();
    }
}

/// Reads the last OS error as reported by `errno`, for use by
/// [`crate::platform::Platform`] implementations after a failing syscall.
pub(crate) fn os_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(-1)
}
