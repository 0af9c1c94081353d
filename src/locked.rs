use std::{
  alloc::{GlobalAlloc, Layout},
  ptr::{self, NonNull},
};

use spin::{Mutex, MutexGuard};

use crate::{constants::ALIGN, error::PoolError, pool::Pool};

/// A [`Pool`] behind a spin lock.
///
/// Every call holds the lock for the whole allocate or release, so the pool
/// can be shared between threads or installed as the global allocator when
/// built over a `'static` range.
pub struct LockedPool<'a> {
  inner: Mutex<Pool<'a>>,
}

impl<'a> LockedPool<'a> {
  pub fn new(memory: &'a mut [u8]) -> Self {
    Self {
      inner: Mutex::new(Pool::new(memory)),
    }
  }

  /// Exclusive access to the pool, e.g. for `dump` or `verify`.
  pub fn lock(&self) -> MutexGuard<'_, Pool<'a>> {
    self.inner.lock()
  }

  pub fn allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, PoolError> {
    self.inner.lock().allocate(size)
  }

  pub fn release(
    &self,
    address: *mut u8,
  ) -> Result<(), PoolError> {
    self.inner.lock().release(address)
  }
}

unsafe impl GlobalAlloc for LockedPool<'_> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > ALIGN {
      return ptr::null_mut();
    }

    self
      .allocate(layout.size())
      .map_or(ptr::null_mut(), NonNull::as_ptr)
  }

  unsafe fn dealloc(
    &self,
    address: *mut u8,
    _layout: Layout,
  ) {
    // failures are already logged by the pool
    let _ = self.release(address);
  }
}
