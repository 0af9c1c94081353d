//! Carving a pool range out of the process heap.
//!
//! The range is taken once from the program break and never handed back, so
//! it lives for the rest of the process.

use std::slice;

use libc::{c_void, intptr_t, sbrk};
use log::debug;

/// Moves the program break up by `len` bytes and returns the new range.
///
/// Returns `None` when the kernel refuses to grow the break.
///
/// # Safety
///
/// Nothing else may lower the program break below the returned range while
/// it is in use.
pub unsafe fn sbrk_region(len: usize) -> Option<&'static mut [u8]> {
  let increment = intptr_t::try_from(len).ok()?;
  let address = unsafe { sbrk(increment) };

  if address == usize::MAX as *mut c_void {
    return None;
  }

  debug!("reserved {} bytes at {:?} from the program break", len, address);

  Some(unsafe { slice::from_raw_parts_mut(address as *mut u8, len) })
}

/// Current program break, as reported by `sbrk(0)`.
pub fn program_break() -> *mut u8 {
  unsafe { sbrk(0) as *mut u8 }
}
