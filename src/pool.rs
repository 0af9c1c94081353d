use std::{marker::PhantomData, ptr::NonNull};

use log::{debug, trace, warn};

use crate::{
  align, align_down,
  block::BlockHeader,
  constants::{ALIGN, ALIGN_MASK, HEADER_SIZE, MIN_POOL_SIZE, MIN_SIZE},
  error::PoolError,
};

/// A next-fit allocator over one fixed, caller-supplied byte range.
///
/// Headers live inside the range itself and are addressed by their index,
/// the byte offset from the aligned start of the range. The first header sits
/// at index 0 and the sentinel at the last word; the sentinel links back to
/// index 0 to close the circle.
pub struct Pool<'a> {
  base: NonNull<u8>,
  len: usize,
  initialized: bool,
  // Offset of the aligned start within the range.
  pub(crate) start: usize,
  pub(crate) sentinel: usize,
  pub(crate) cursor: usize,
  _memory: PhantomData<&'a mut [u8]>,
}

// The pool behaves like the `&mut [u8]` it was built from.
unsafe impl Send for Pool<'_> {}

impl<'a> Pool<'a> {
  /// Takes ownership of `memory` for the lifetime of the pool.
  ///
  /// Nothing is written until the first allocation (or an explicit
  /// [`initialize`](Pool::initialize)).
  pub fn new(memory: &'a mut [u8]) -> Self {
    Self {
      base: NonNull::from(&mut *memory).cast::<u8>(),
      len: memory.len(),
      initialized: false,
      start: 0,
      sentinel: 0,
      cursor: 0,
      _memory: PhantomData,
    }
  }

  pub fn is_initialized(&self) -> bool {
    self.initialized
  }

  /// Bytes covered by the block list, headers included. Zero until initialized.
  pub fn capacity(&self) -> usize {
    if self.initialized { self.sentinel + HEADER_SIZE } else { 0 }
  }

  /// Seeds the block list: one free block spanning the range and the sentinel.
  ///
  /// Calling it again once it succeeded does nothing.
  pub fn initialize(&mut self) -> Result<(), PoolError> {
    if self.initialized {
      return Ok(());
    }

    let address = self.base.as_ptr() as usize;
    let end = align_down!(address.saturating_add(self.len));
    let start = align!(address);

    if end < start || end - start < MIN_POOL_SIZE {
      warn!(
        "pool at {:#x} too small: {} bytes, need {}",
        address, self.len, MIN_POOL_SIZE
      );
      return Err(PoolError::PoolTooSmall);
    }

    self.start = start - address;
    self.sentinel = end - start - HEADER_SIZE;
    self.cursor = 0;
    self.initialized = true;

    self.write_header(0, BlockHeader::new(self.sentinel, true));
    self.write_header(self.sentinel, BlockHeader::new(0, false));

    debug!(
      "pool initialized at {:#x}: {} bytes, {} free",
      start,
      self.capacity(),
      self.sentinel - HEADER_SIZE
    );

    Ok(())
  }

  /// Hands out a block of at least `size` bytes, word aligned.
  ///
  /// The scan starts at the cursor and takes the first free block that fits,
  /// splitting off the tail when it can hold a header and a minimal payload.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, PoolError> {
    self.initialize()?;

    let size = request_size(size).ok_or(PoolError::PoolExhausted)?;
    let start = self.cursor;
    let mut current = start;

    loop {
      let mut header = self.header_at(current);

      if header.is_free() && header.size(current) >= size {
        if header.size(current) - size >= HEADER_SIZE + MIN_SIZE {
          let tail = current + HEADER_SIZE + size;
          self.write_header(tail, BlockHeader::new(header.next(), true));
          header.set_next(tail);
        }

        header.set_free(false);
        self.write_header(current, header);
        self.cursor = header.next();

        trace!(
          "allocated block {:#x}: {} bytes (asked {})",
          current,
          header.size(current),
          size
        );

        return Ok(self.payload(current));
      }

      current = header.next();
      if current == start {
        break;
      }
    }

    debug!("pool exhausted: no free block of {} bytes", size);
    Err(PoolError::PoolExhausted)
  }

  /// Gives a block back and merges it with free neighbours on both sides.
  /// The cursor moves to the merged block, so the next allocation looks
  /// there first.
  ///
  /// A null pointer is ignored. A block that is already free is left alone
  /// and reported as [`PoolError::DoubleRelease`].
  pub fn release(
    &mut self,
    address: *mut u8,
  ) -> Result<(), PoolError> {
    if address.is_null() {
      return Ok(());
    }

    let block = self
      .header_of(address)
      .inspect_err(|_| warn!("release of {:?}: outside this pool", address))?;
    let Some(previous) = self.predecessor(block) else {
      warn!("release of {:?}: not a block of this pool", address);
      return Err(PoolError::ForeignPointer);
    };

    let mut header = self.header_at(block);
    if header.is_free() {
      warn!("release of {:?}: block {:#x} already free", address, block);
      return Err(PoolError::DoubleRelease);
    }

    header.set_free(true);

    let next = header.next();
    if next != self.sentinel {
      let successor = self.header_at(next);
      if successor.is_free() {
        header.set_next(successor.next());
        self.absorbed(next, block);
      }
    }
    self.write_header(block, header);

    let mut survivor = block;
    if previous != self.sentinel {
      let mut predecessor = self.header_at(previous);
      if predecessor.is_free() {
        predecessor.set_next(header.next());
        self.write_header(previous, predecessor);
        self.absorbed(block, previous);
        survivor = previous;
      }
    }

    // the next scan starts at the freshly freed space
    self.cursor = survivor;

    trace!("released block {:#x}", block);

    Ok(())
  }

  /// Payload size of the block behind `address`.
  pub fn block_size(
    &self,
    address: *const u8,
  ) -> Result<usize, PoolError> {
    let block = self.header_of(address)?;
    Ok(self.header_at(block).size(block))
  }

  fn absorbed(
    &self,
    victim: usize,
    survivor: usize,
  ) {
    debug!("coalesced block {:#x} into {:#x}", victim, survivor);
  }

  /// Header whose link points at `block`, or `None` if `block` is not a
  /// header of the list.
  fn predecessor(
    &self,
    block: usize,
  ) -> Option<usize> {
    let mut current = 0;

    loop {
      let next = self.header_at(current).next();
      if next == block {
        return Some(current);
      }
      if current == self.sentinel || next <= current {
        return None;
      }
      current = next;
    }
  }

  /// Maps a payload address back to its header index.
  pub(crate) fn header_of(
    &self,
    address: *const u8,
  ) -> Result<usize, PoolError> {
    let address = address as usize;
    let first_payload = self.base.as_ptr() as usize + self.start + HEADER_SIZE;

    if !self.initialized || address < first_payload || address & !ALIGN_MASK != 0 {
      return Err(PoolError::ForeignPointer);
    }

    let block = address - first_payload;
    if block >= self.sentinel {
      return Err(PoolError::ForeignPointer);
    }

    Ok(block)
  }

  pub(crate) fn address_of(
    &self,
    index: usize,
  ) -> usize {
    self.base.as_ptr() as usize + self.start + index
  }

  pub(crate) fn header_at(
    &self,
    index: usize,
  ) -> BlockHeader {
    BlockHeader::decode(unsafe { self.word(index).read() })
  }

  fn write_header(
    &mut self,
    index: usize,
    header: BlockHeader,
  ) {
    unsafe { self.word(index).write(header.encode()) }
  }

  fn word(
    &self,
    index: usize,
  ) -> *mut usize {
    debug_assert!(self.initialized);
    debug_assert!(index <= self.sentinel && index % ALIGN == 0, "bad header index {index:#x}");
    // `start + index` is word aligned and at least one word before the end.
    unsafe { self.base.as_ptr().add(self.start + index).cast::<usize>() }
  }

  fn payload(
    &self,
    index: usize,
  ) -> NonNull<u8> {
    unsafe { self.base.add(self.start + index + HEADER_SIZE) }
  }
}

/// Rounds a request up to the alignment unit, never below `MIN_SIZE`.
fn request_size(size: usize) -> Option<usize> {
  let size = size.checked_add(ALIGN - 1)? & ALIGN_MASK;
  Some(size.max(MIN_SIZE))
}

#[cfg(test)]
mod tests {
  use std::slice;

  use super::*;

  fn with_pool<R>(
    len: usize,
    f: impl FnOnce(&mut Pool<'_>) -> R,
  ) -> R {
    let mut words = vec![0usize; len.div_ceil(ALIGN)];
    let memory = unsafe { slice::from_raw_parts_mut(words.as_mut_ptr().cast::<u8>(), len) };
    let mut pool = Pool::new(memory);
    f(&mut pool)
  }

  fn span(
    pool: &Pool<'_>,
    address: NonNull<u8>,
  ) -> (usize, usize) {
    let start = address.as_ptr() as usize;
    (start, start + pool.block_size(address.as_ptr()).unwrap())
  }

  fn overlaps(
    a: (usize, usize),
    b: (usize, usize),
  ) -> bool {
    a.0 < b.1 && b.0 < a.1
  }

  #[test]
  fn test_lazy_initialization() {
    with_pool(4096, |pool| {
      assert!(!pool.is_initialized());
      assert_eq!(pool.capacity(), 0);

      pool.allocate(16).unwrap();
      assert!(pool.is_initialized());
      assert_eq!(pool.capacity(), 4096);

      let cursor = pool.cursor;
      pool.initialize().unwrap();
      assert_eq!(pool.cursor, cursor);
      assert!(!pool.header_at(0).is_free());
    });
  }

  #[test]
  fn test_too_small_pool_never_allocates() {
    with_pool(MIN_POOL_SIZE - ALIGN, |pool| {
      assert_eq!(pool.allocate(1), Err(PoolError::PoolTooSmall));
      assert_eq!(pool.allocate(0), Err(PoolError::PoolTooSmall));
      assert!(!pool.is_initialized());
      assert_eq!(pool.release(std::ptr::null_mut()), Ok(()));
    });
  }

  #[test]
  fn test_smallest_pool_holds_one_block() {
    with_pool(MIN_POOL_SIZE, |pool| {
      let address = pool.allocate(MIN_SIZE).unwrap();
      assert_eq!(pool.allocate(1), Err(PoolError::PoolExhausted));

      pool.release(address.as_ptr()).unwrap();
      assert_eq!(pool.allocate(3), Ok(address));
    });
  }

  #[test]
  fn test_unaligned_range_is_trimmed() {
    let mut words = vec![0usize; 64];
    let len = words.len() * ALIGN;
    let memory = unsafe { slice::from_raw_parts_mut(words.as_mut_ptr().cast::<u8>(), len) };
    let mut pool = Pool::new(&mut memory[3..len - 1]);

    let address = pool.allocate(10).unwrap();
    assert_eq!(address.as_ptr() as usize % ALIGN, 0);
    assert_eq!(pool.start, ALIGN - 3);
    assert_eq!(pool.capacity(), len - 2 * ALIGN);
  }

  #[test]
  fn test_requests_round_to_alignment() {
    assert_eq!(request_size(0), Some(MIN_SIZE));
    assert_eq!(request_size(1), Some(MIN_SIZE.max(ALIGN)));
    assert_eq!(request_size(ALIGN + 1), Some(2 * ALIGN));
    assert_eq!(request_size(usize::MAX), None);

    with_pool(4096, |pool| {
      assert_eq!(pool.allocate(usize::MAX), Err(PoolError::PoolExhausted));
      assert_eq!(pool.allocate(4096), Err(PoolError::PoolExhausted));
    });
  }

  #[test]
  fn test_zero_sized_blocks_are_distinct() {
    with_pool(4096, |pool| {
      let a = pool.allocate(0).unwrap();
      let b = pool.allocate(0).unwrap();

      assert_ne!(a, b);
      assert_eq!(pool.block_size(a.as_ptr()), Ok(MIN_SIZE));
      assert_eq!(pool.block_size(b.as_ptr()), Ok(MIN_SIZE));
      assert!(!overlaps(span(pool, a), span(pool, b)));
    });
  }

  #[test]
  fn test_split_only_when_tail_fits_a_block() {
    with_pool(4096, |pool| {
      let whole = 4096 - 2 * HEADER_SIZE;

      // tail of one word cannot hold a header plus a payload
      let address = pool.allocate(whole - ALIGN).unwrap();
      assert_eq!(pool.block_size(address.as_ptr()), Ok(whole));
      pool.release(address.as_ptr()).unwrap();

      let address = pool.allocate(whole - HEADER_SIZE - MIN_SIZE).unwrap();
      assert_eq!(pool.block_size(address.as_ptr()), Ok(whole - HEADER_SIZE - MIN_SIZE));
      let tail = pool.allocate(MIN_SIZE).unwrap();
      assert_eq!(tail.as_ptr() as usize, address.as_ptr() as usize + whole - MIN_SIZE);
    });
  }

  #[test]
  fn test_scenario_reuses_freed_holes() {
    with_pool(4096, |pool| {
      let a = pool.allocate(200).unwrap();
      let b = pool.allocate(100).unwrap();
      let c = pool.allocate(300).unwrap();
      let d = pool.allocate(400).unwrap();

      let live = [a, b, c, d];
      for (i, x) in live.iter().enumerate() {
        assert_eq!(x.as_ptr() as usize % 8, 0);
        for y in &live[i + 1..] {
          assert!(!overlaps(span(pool, *x), span(pool, *y)));
        }
      }

      let hole_a = span(pool, a);
      let hole_c = span(pool, c);
      pool.release(a.as_ptr()).unwrap();
      pool.release(c.as_ptr()).unwrap();

      let e = pool.allocate(250).unwrap();
      let e_span = span(pool, e);
      assert!(!overlaps(e_span, span(pool, b)));
      assert!(!overlaps(e_span, span(pool, d)));
      assert!(
        (e_span.0 >= hole_a.0 && e_span.1 <= hole_a.1) || (e_span.0 >= hole_c.0 && e_span.1 <= hole_c.1)
      );
    });
  }

  #[test]
  fn test_next_fit_resumes_from_cursor() {
    with_pool(4096, |pool| {
      let a = pool.allocate(400).unwrap();
      let b = pool.allocate(100).unwrap();
      let c = pool.allocate(200).unwrap();

      pool.release(a.as_ptr()).unwrap();
      pool.release(c.as_ptr()).unwrap();

      // first-fit would hand back `a`; next-fit starts where `c` was freed
      let d = pool.allocate(150).unwrap();
      assert_eq!(d, c);

      let e = pool.allocate(64).unwrap();
      assert_ne!(e, a);
      assert!(e.as_ptr() as usize > d.as_ptr() as usize);

      pool.release(b.as_ptr()).unwrap();
      pool.verify().unwrap();
    });
  }

  #[test]
  fn test_wrapped_scan_reaches_low_holes() {
    with_pool(4096, |pool| {
      let a = pool.allocate(64).unwrap();
      let b = pool.allocate(64).unwrap();
      let tail = 4096 - 2 * (HEADER_SIZE + 64) - 3 * HEADER_SIZE - 64;
      let c = pool.allocate(tail).unwrap();
      let d = pool.allocate(64).unwrap();
      assert_eq!(pool.cursor, pool.sentinel);

      pool.release(a.as_ptr()).unwrap();
      pool.release(d.as_ptr()).unwrap();
      pool.allocate(64).unwrap();

      // the cursor now sits on the sentinel: the scan wraps to `a`
      assert_eq!(pool.cursor, pool.sentinel);
      assert_eq!(pool.allocate(64), Ok(a));
      assert_eq!(pool.allocate(1), Err(PoolError::PoolExhausted));

      pool.release(b.as_ptr()).unwrap();
      pool.release(c.as_ptr()).unwrap();
      pool.verify().unwrap();
    });
  }

  #[test]
  fn test_failed_allocation_changes_nothing() {
    with_pool(1024, |pool| {
      let a = pool.allocate(100).unwrap();
      pool.allocate(200).unwrap();
      pool.release(a.as_ptr()).unwrap();

      let before: Vec<_> = pool.blocks().collect();
      let cursor = pool.cursor;

      assert_eq!(pool.allocate(900), Err(PoolError::PoolExhausted));
      assert_eq!(pool.blocks().collect::<Vec<_>>(), before);
      assert_eq!(pool.cursor, cursor);
    });
  }

  #[test]
  fn test_coalescing_in_either_order() {
    for reversed in [false, true] {
      with_pool(4096, |pool| {
        let a = pool.allocate(64).unwrap();
        let b = pool.allocate(128).unwrap();
        let _fence = pool.allocate(32).unwrap();

        let free_before = pool.stats().free_bytes;
        let (first, second) = if reversed { (b, a) } else { (a, b) };
        pool.release(first.as_ptr()).unwrap();
        pool.release(second.as_ptr()).unwrap();

        let merged = pool.header_of(a.as_ptr()).unwrap();
        let header = pool.header_at(merged);
        assert!(header.is_free());
        assert_eq!(header.size(merged), 64 + 128 + HEADER_SIZE);
        assert_eq!(pool.stats().free_bytes, free_before + 64 + 128 + HEADER_SIZE);
        pool.verify().unwrap();
      });
    }
  }

  #[test]
  fn test_release_merges_both_neighbours() {
    with_pool(4096, |pool| {
      let a = pool.allocate(40).unwrap();
      let b = pool.allocate(48).unwrap();
      let c = pool.allocate(56).unwrap();
      let _fence = pool.allocate(8).unwrap();

      pool.release(a.as_ptr()).unwrap();
      pool.release(c.as_ptr()).unwrap();
      pool.release(b.as_ptr()).unwrap();

      let merged = pool.header_of(a.as_ptr()).unwrap();
      assert_eq!(pool.header_at(merged).size(merged), 40 + 48 + 56 + 2 * HEADER_SIZE);
      assert_eq!(pool.stats().free_blocks, 2);
      pool.verify().unwrap();
    });
  }

  #[test]
  fn test_cursor_follows_absorbed_block() {
    with_pool(4096, |pool| {
      pool.allocate(64).unwrap();
      let b = pool.allocate(64).unwrap();
      let tail = pool.cursor;

      pool.release(b.as_ptr()).unwrap();
      assert_eq!(pool.cursor, pool.header_of(b.as_ptr()).unwrap());
      assert_ne!(pool.cursor, tail);
      pool.verify().unwrap();
    });
  }

  #[test]
  fn test_cursor_follows_backward_merge() {
    with_pool(4096, |pool| {
      let a = pool.allocate(64).unwrap();
      let b = pool.allocate(64).unwrap();
      let rest = 4096 - 2 * (HEADER_SIZE + 64) - 2 * HEADER_SIZE;
      let c = pool.allocate(rest).unwrap();
      assert_eq!(pool.cursor, pool.sentinel);
      assert_eq!(pool.block_size(c.as_ptr()), Ok(rest));

      pool.release(a.as_ptr()).unwrap();
      let a_header = pool.header_of(a.as_ptr()).unwrap();
      assert_eq!(pool.cursor, a_header);

      // leave the cursor on `b`, which the release folds into `a`
      pool.cursor = pool.header_of(b.as_ptr()).unwrap();
      pool.release(b.as_ptr()).unwrap();

      assert_eq!(pool.cursor, a_header);
      assert_eq!(pool.header_at(a_header).size(a_header), 64 + 64 + HEADER_SIZE);
      pool.verify().unwrap();
    });
  }

  #[test]
  fn test_release_everything_restores_single_block() {
    with_pool(4096, |pool| {
      let blocks: Vec<_> = (1..20).map(|i| pool.allocate(i * 12).unwrap()).collect();

      for address in blocks.iter().step_by(2).chain(blocks.iter().skip(1).step_by(2)) {
        pool.release(address.as_ptr()).unwrap();
        pool.verify().unwrap();
      }

      let stats = pool.stats();
      assert_eq!(stats.blocks, 1);
      assert_eq!(stats.free_bytes, 4096 - 2 * HEADER_SIZE);
    });
  }

  #[test]
  fn test_double_release_is_rejected() {
    with_pool(4096, |pool| {
      let a = pool.allocate(64).unwrap();
      pool.allocate(64).unwrap();
      pool.release(a.as_ptr()).unwrap();

      let before: Vec<_> = pool.blocks().collect();
      assert_eq!(pool.release(a.as_ptr()), Err(PoolError::DoubleRelease));
      assert_eq!(pool.blocks().collect::<Vec<_>>(), before);
    });
  }

  #[test]
  fn test_foreign_pointers_are_rejected() {
    with_pool(4096, |pool| {
      let a = pool.allocate(64).unwrap();

      let mut outside = 0u64;
      let outside = &mut outside as *mut u64 as *mut u8;
      assert_eq!(pool.release(outside), Err(PoolError::ForeignPointer));

      let inside = unsafe { a.as_ptr().add(ALIGN) };
      assert_eq!(pool.release(inside), Err(PoolError::ForeignPointer));

      let unaligned = unsafe { a.as_ptr().add(1) };
      assert_eq!(pool.release(unaligned), Err(PoolError::ForeignPointer));

      assert!(!pool.header_at(0).is_free());
      pool.verify().unwrap();
    });
  }

  #[test]
  fn test_payloads_survive_neighbour_traffic() {
    with_pool(4096, |pool| {
      let a = pool.allocate(32).unwrap();
      let b = pool.allocate(32).unwrap();
      let c = pool.allocate(32).unwrap();

      unsafe {
        a.as_ptr().write_bytes(0xAA, 32);
        c.as_ptr().write_bytes(0xCC, 32);
      }

      pool.release(b.as_ptr()).unwrap();
      let d = pool.allocate(16).unwrap();
      unsafe { d.as_ptr().write_bytes(0xDD, 16) };
      pool.release(d.as_ptr()).unwrap();

      unsafe {
        assert!(slice::from_raw_parts(a.as_ptr(), 32).iter().all(|&x| x == 0xAA));
        assert!(slice::from_raw_parts(c.as_ptr(), 32).iter().all(|&x| x == 0xCC));
      }
    });
  }
}
