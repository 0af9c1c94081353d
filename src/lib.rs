//! # nextfit - A Fixed-Pool Heap Allocator
//!
//! This crate provides a **next-fit** heap allocator that manages one
//! contiguous byte range handed to it by its caller. It never asks the system
//! for more memory and never gives the range back.
//!
//! ## Overview
//!
//! The pool is split into blocks. Every block starts with a one-word header
//! that links to the next header; the free flag rides in the low bit of that
//! link. A zero-size sentinel header closes the list at the end of the range
//! and links back to the first header:
//!
//! ```text
//!   Pool Layout:
//!
//!   ┌──────┬────────────┬──────┬────────┬──────┬──────────────────┬──────┐
//!   │ hdr  │  used      │ hdr  │  free  │ hdr  │      used        │ hdr  │
//!   │ next─┼────────────┼─►    │        │      │                  │ sent │
//!   └──────┴────────────┴──────┴────────┴──────┴──────────────────┴──┬───┘
//!      ▲                                                             │
//!      └─────────────────────────────────────────────────────────────┘
//!                          sentinel wraps to the first header
//! ```
//!
//! A block's size is never stored. It is the distance to the next header
//! minus the header itself.
//!
//! ## Crate Structure
//!
//! ```text
//!   nextfit
//!   ├── align      - Alignment macros (align!, align_down!)
//!   ├── block      - Header encoding (link + free bit)
//!   ├── pool       - Pool: initialization, allocate, release
//!   ├── walk       - Read-only traversal: blocks, dump, stats, verify
//!   ├── locked     - LockedPool: spin-locked pool, GlobalAlloc
//!   └── region     - Reserving a range from the program break (unix)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use nextfit::Pool;
//!
//! let mut memory = [0u8; 4096];
//! let mut pool = Pool::new(&mut memory);
//!
//! let address = pool.allocate(100).unwrap();
//! unsafe { address.as_ptr().write_bytes(0xAB, 100) };
//!
//! pool.release(address.as_ptr()).unwrap();
//! assert_eq!(pool.stats().blocks, 1);
//! ```
//!
//! ## How It Works
//!
//! **Allocation** scans from the cursor, the header after the last block
//! handed out, and takes the first free block that is large enough. When the
//! leftover can hold a header plus [`MIN_SIZE`] bytes the block is split:
//!
//! ```text
//!   Before:   ┌─────┬──────────────────────────────────────┐
//!             │ hdr │             free (N)                 │
//!             └─────┴──────────────────────────────────────┘
//!
//!   After:    ┌─────┬──────────────┬─────┬─────────────────┐
//!             │ hdr │  used (S)    │ hdr │ free (N - S - H)│
//!             └─────┴──────────────┴─────┴─────────────────┘
//!                   ▲                 ▲
//!                   │                 └── cursor
//!                   └── pointer returned to user
//! ```
//!
//! **Release** flips the free bit and merges the block with a free successor
//! and a free predecessor, so no two free blocks ever touch. The sentinel is
//! never merged.
//!
//! ## Limitations
//!
//! - **Single-threaded core**: [`Pool`] has no locking; use [`LockedPool`]
//!   to share one.
//! - **Word alignment only**: requests needing more than [`ALIGN`] bytes of
//!   alignment are not supported.
//! - **Linear predecessor lookup**: release walks the list from the start.

pub mod align;
mod block;
mod constants;
mod error;
mod locked;
mod pool;
#[cfg(unix)]
pub mod region;
mod walk;

pub use block::BlockHeader;
pub use constants::{ALIGN, HEADER_SIZE, MIN_SIZE};
pub use error::{Corruption, PoolError};
pub use locked::LockedPool;
pub use pool::Pool;
pub use walk::{BlockInfo, Blocks, PoolStats};
