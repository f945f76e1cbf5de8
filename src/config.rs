//! Tunable constants: the alignment unit and the two mmap thresholds.

/// The common multiple all sizes and payload offsets are rounded to.
pub const ALIGNMENT: usize = 8;

/// The allocator's tunable knobs, grouped so tests can shrink the mmap
/// threshold without requesting 128 KiB just to exercise the mapped-block
/// path.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Above this many bytes (header + payload), `allocate`/`resize` serve
    /// the request from a fresh anonymous mapping instead of the contiguous
    /// region.
    pub mmap_threshold: usize,
    /// How much the contiguous region is grown by on first use.
    pub prealloc_size: usize,
}

impl Config {
    /// `allocate`/`resize`'s default mmap threshold: 128 KiB.
    pub const DEFAULT_MMAP_THRESHOLD: usize = 128 * 1024;
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mmap_threshold: Self::DEFAULT_MMAP_THRESHOLD,
            prealloc_size: Self::DEFAULT_MMAP_THRESHOLD,
        }
    }
}
