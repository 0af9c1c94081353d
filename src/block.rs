use crate::constants::{FREE_BIT, HEADER_SIZE};

/// Decoded view of a block header.
///
/// In the pool a header is stored as one word, `next | free`, where `next` is
/// the arena index (byte offset from the aligned pool start) of the following
/// header. Indices are always word aligned, so bit 0 is free to carry the flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockHeader {
  next: usize,
  free: bool,
}

impl BlockHeader {
  pub fn new(
    next: usize,
    free: bool,
  ) -> Self {
    debug_assert_eq!(next & FREE_BIT, 0, "misaligned header link {next:#x}");
    Self { next, free }
  }

  pub fn decode(word: usize) -> Self {
    Self {
      next: word & !FREE_BIT,
      free: word & FREE_BIT != 0,
    }
  }

  pub fn encode(self) -> usize {
    self.next | self.free as usize
  }

  pub fn next(&self) -> usize {
    self.next
  }

  /// Relinks the header, keeping its free flag.
  pub fn set_next(
    &mut self,
    next: usize,
  ) {
    debug_assert_eq!(next & FREE_BIT, 0, "misaligned header link {next:#x}");
    self.next = next;
  }

  pub fn is_free(&self) -> bool {
    self.free
  }

  /// Flips the free flag, keeping the link.
  pub fn set_free(
    &mut self,
    free: bool,
  ) {
    self.free = free;
  }

  /// Payload bytes of the block whose header lives at index `at`.
  ///
  /// The sentinel links back to the start of the pool and has no payload.
  pub fn size(
    &self,
    at: usize,
  ) -> usize {
    if self.next <= at {
      return 0;
    }
    self.next - at - HEADER_SIZE
  }
}
