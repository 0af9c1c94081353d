use std::mem;

// Alignment unit for headers, payloads and request sizes.
pub const ALIGN: usize = mem::size_of::<usize>();
pub const ALIGN_MASK: usize = !(ALIGN - 1);

// A header is a single word: the next link with the free flag in bit 0.
pub const HEADER_SIZE: usize = mem::size_of::<usize>();
pub const FREE_BIT: usize = 1;

// Smallest payload a block may carry.
pub const MIN_SIZE: usize = 8;

// One header + one minimal free block + the sentinel header.
pub const MIN_POOL_SIZE: usize = 2 * HEADER_SIZE + MIN_SIZE;
