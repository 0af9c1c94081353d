use crate::{
  constants::{ALIGN, HEADER_SIZE},
  error::Corruption,
  pool::Pool,
};

/// One header as seen by the walker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  /// Index of the header from the aligned pool start.
  pub offset: usize,
  /// Address of the header.
  pub address: usize,
  /// Index of the next header.
  pub next: usize,
  pub free: bool,
  /// Payload bytes; always 0 for the sentinel.
  pub size: usize,
  pub sentinel: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
  /// Blocks, sentinel excluded.
  pub blocks: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub used_bytes: usize,
  pub largest_free: usize,
  /// Bytes spent on headers, sentinel included.
  pub overhead: usize,
}

/// Iterator over the headers of a pool, first header to sentinel.
pub struct Blocks<'p, 'a> {
  pool: &'p Pool<'a>,
  next: Option<usize>,
}

impl Iterator for Blocks<'_, '_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    let offset = self.next?;
    let header = self.pool.header_at(offset);
    let sentinel = offset == self.pool.sentinel;

    // links only ever point forward until the sentinel wraps around
    self.next = (!sentinel && header.next() > offset).then(|| header.next());

    Some(BlockInfo {
      offset,
      address: self.pool.address_of(offset),
      next: header.next(),
      free: header.is_free(),
      size: header.size(offset),
      sentinel,
    })
  }
}

impl<'a> Pool<'a> {
  /// Walks the block list without touching it. Empty until initialized.
  pub fn blocks(&self) -> Blocks<'_, 'a> {
    Blocks {
      pool: self,
      next: self.is_initialized().then_some(0),
    }
  }

  /// Text listing of every header: address, link target, free flag and size.
  pub fn dump(&self) -> String {
    let mut out = String::new();

    for block in self.blocks() {
      out.push_str(&format!(
        "{:#014x} -> {:#014x} {} {:>10}{}\n",
        block.address,
        self.address_of(block.next),
        if block.free { "free" } else { "used" },
        block.size,
        if block.sentinel { " (sentinel)" } else { "" },
      ));
    }

    out
  }

  pub fn stats(&self) -> PoolStats {
    let mut stats = PoolStats::default();

    for block in self.blocks() {
      stats.overhead += HEADER_SIZE;
      if block.sentinel {
        continue;
      }

      stats.blocks += 1;
      if block.free {
        stats.free_blocks += 1;
        stats.free_bytes += block.size;
        stats.largest_free = stats.largest_free.max(block.size);
      } else {
        stats.used_bytes += block.size;
      }
    }

    stats
  }

  /// Checks the block list: links strictly increase up to the sentinel,
  /// the sentinel closes the circle, no two free blocks touch and the
  /// cursor sits on a live header.
  pub fn verify(&self) -> Result<(), Corruption> {
    if !self.is_initialized() {
      return Err(Corruption::Uninitialized);
    }

    let mut at = 0;
    let mut cursor_seen = false;
    let mut previous_free = false;

    loop {
      cursor_seen |= at == self.cursor;
      let header = self.header_at(at);

      if at == self.sentinel {
        if header.is_free() || header.next() != 0 {
          return Err(Corruption::BadSentinel);
        }
        break;
      }

      let next = header.next();
      if next > self.sentinel || next % ALIGN != 0 {
        return Err(Corruption::LinkOutOfRange { at, next });
      }
      if next <= at {
        return Err(Corruption::LinkNotIncreasing { at, next });
      }
      if previous_free && header.is_free() {
        return Err(Corruption::Uncoalesced { at });
      }

      previous_free = header.is_free();
      at = next;
    }

    if !cursor_seen {
      return Err(Corruption::StrayCursor {
        cursor: self.cursor,
      });
    }

    Ok(())
  }
}
