use std::{error, fmt};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PoolError {
  /// No block in the whole circular scan can hold the request.
  PoolExhausted,
  /// The aligned range cannot hold one minimal block plus the sentinel.
  PoolTooSmall,
  /// The block behind the pointer is already free.
  DoubleRelease,
  /// The pointer cannot be a payload address of this pool.
  ForeignPointer,
}

impl fmt::Display for PoolError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      PoolError::PoolExhausted => write!(f, "no free block large enough"),
      PoolError::PoolTooSmall => write!(f, "memory range too small for a pool"),
      PoolError::DoubleRelease => write!(f, "block released twice"),
      PoolError::ForeignPointer => write!(f, "pointer does not belong to this pool"),
    }
  }
}

impl error::Error for PoolError {}

/// Structural damage found by [`Pool::verify`](crate::Pool::verify).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Corruption {
  Uninitialized,
  /// A link leaves the span or is not word aligned.
  LinkOutOfRange { at: usize, next: usize },
  /// Headers are not strictly increasing before the sentinel.
  LinkNotIncreasing { at: usize, next: usize },
  /// Two neighbouring blocks are both free.
  Uncoalesced { at: usize },
  /// The sentinel is free or does not link back to the first header.
  BadSentinel,
  /// The cursor does not point at a live header.
  StrayCursor { cursor: usize },
}

impl fmt::Display for Corruption {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Corruption::Uninitialized => write!(f, "pool is not initialized"),
      Corruption::LinkOutOfRange { at, next } => {
        write!(f, "header {at:#x} links outside the pool ({next:#x})")
      }
      Corruption::LinkNotIncreasing { at, next } => {
        write!(f, "header {at:#x} links backwards to {next:#x}")
      }
      Corruption::Uncoalesced { at } => write!(f, "free block {at:#x} follows a free block"),
      Corruption::BadSentinel => write!(f, "sentinel header is damaged"),
      Corruption::StrayCursor { cursor } => write!(f, "cursor {cursor:#x} is not a live header"),
    }
  }
}

impl error::Error for Corruption {}
