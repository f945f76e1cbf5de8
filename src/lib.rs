//! # segheap - A Segregated-Fit Heap Allocator
//!
//! This crate provides a general-purpose heap allocator meant to replace a
//! platform's default allocator for a single-threaded program. It layers
//! the classic `malloc`/`free`/`calloc`/`realloc` contract over two
//! low-level primitives: a contiguous program-break region, extended via a
//! `sbrk`-style call, and anonymous page-granular mappings, created via
//! `mmap`/`munmap`.
//!
//! ## Overview
//!
//! Small requests are served from a single contiguous region that is primed
//! once (by extending the break) and then managed with a best-fit free-list
//! search, lazy coalescing, in-place splitting, and in-place expansion of
//! the region's tail block:
//!
//! ```text
//!   Contiguous region (primed once, grown only at the tail):
//!
//!   ┌──────────┬──────────┬──────────┬───────────────────────────────────┐
//!   │ ALLOCATED│   FREE   │ ALLOCATED│         FREE (tail, expandable)    │
//!   └──────────┴──────────┴──────────┴───────────────────────────────────┘
//!                                                                    ▲
//!                                                           program break
//! ```
//!
//! Requests too large for the contiguous region (more than 128 KiB of
//! header-plus-payload for `allocate`/`resize`; more than one page for
//! `allocate_zeroed`) are instead served from their own anonymous mapping,
//! which is unmapped directly on `free` rather than ever touching the
//! contiguous region:
//!
//! ```text
//!   Large allocation:
//!
//!   ┌───────────────────────────────────────────────────┐
//!   │  anonymous mapping (header + payload, own span)    │
//!   └───────────────────────────────────────────────────┘
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segheap
//!   ├── platform   - the four syscall-like primitives (sbrk/mmap/munmap/page size)
//!   ├── align      - alignment arithmetic
//!   ├── config     - tunables (alignment unit, mmap thresholds)
//!   ├── error      - the fatal-platform-failure type
//!   ├── block      - the block header embedded at the front of every span (internal)
//!   ├── registry   - the intrusive circular doubly-linked list of all blocks (internal)
//!   ├── index      - best-fit search and lazy coalescing (internal)
//!   ├── mutators   - split / expand-last / new-block construction (internal)
//!   ├── heap       - the Heap engine and its four public operations
//!   ├── global     - a GlobalAlloc wrapper for #[global_allocator] use
//!   └── testutil   - an in-memory fake Platform for tests
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segheap::{Config, Heap};
//! use segheap::platform::SystemPlatform;
//!
//! let mut heap = Heap::new(SystemPlatform, Config::default());
//!
//! unsafe {
//!     let ptr = heap.allocate(64) as *mut u64;
//!     assert!(!ptr.is_null());
//!
//!     *ptr = 42;
//!     assert_eq!(*ptr, 42);
//!
//!     heap.free(ptr as *mut u8);
//! }
//! ```
//!
//! Installing it as the process's global allocator:
//!
//! ```rust,ignore
//! use segheap::SystemHeap;
//!
//! #[global_allocator]
//! static ALLOCATOR: SystemHeap = SystemHeap::new();
//! ```
//!
//! ## Policy
//!
//! - **Segregation:** requests are routed to the contiguous region or to a
//!   fresh mapping based on a size threshold (128 KiB, or the page size for
//!   `allocate_zeroed`).
//! - **Best-fit:** the smallest `Free` contiguous block large enough to
//!   satisfy a request is chosen, breaking ties by list position.
//! - **Lazy coalescing:** adjacent `Free` blocks are merged at the start of
//!   the next `allocate`/`resize`, not eagerly at `free`.
//! - **Splitting / tail expansion:** a block with enough surplus is split
//!   rather than handed out whole; if no `Free` block fits, the tail of the
//!   contiguous region is grown in place before a brand new block is
//!   requested from the platform.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization around the registry or
//!   pre-allocation flag; embedding in a multi-threaded program is the
//!   caller's responsibility.
//! - **No release of the contiguous region**: once extended, the break is
//!   never retracted; only mapped blocks are ever returned to the OS.
//! - **Unix-only**: requires `libc`'s `sbrk`/`mmap`/`munmap`/`sysconf`.
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management
//! and foreign pointers. Freeing a pointer this allocator never returned,
//! double-freeing, or using a payload after it is freed are all undefined
//! behavior the allocator does not attempt to detect.

pub mod align;
mod block;
pub mod config;
pub mod error;
mod global;
pub mod heap;
mod index;
mod mutators;
pub mod platform;
mod registry;
pub mod testutil;

pub use block::BlockState;
pub use config::Config;
pub use error::PlatformError;
pub use global::SystemHeap;
pub use heap::Heap;
pub use platform::Platform;
