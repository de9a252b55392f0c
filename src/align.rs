//! Alignment helpers shared by the block layout and the public allocation API.
//!
//! The allocator works in two alignment regimes:
//!
//! - *Word* alignment (4 bytes): the granularity of header/footer words and of
//!   free-list offsets.
//! - *Doubleword* alignment (8 bytes): the granularity every block size and
//!   every payload address returned to callers must respect.
//!
//! `align!` rounds a byte count up to the next machine word, matching the
//! teacher crate's macro of the same name. `block_size_for` implements the
//! `align(n) = (n + 15) & ~7` formula used to turn a caller's requested
//! payload size into a total block size.

/// Rounds `$value` up to the next multiple of `mem::size_of::<usize>()`.
///
/// # Examples
///
/// ```rust
/// use std::mem;
/// use dwalloc::align;
///
/// match mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + mem::size_of::<usize>() - 1) & !(mem::size_of::<usize>() - 1)
  };
}

/// Doubleword size in bytes: the allocator's payload/block granularity.
pub const DSIZE: usize = 8;

/// Word size in bytes: the granularity of header/footer/link words.
pub const WSIZE: usize = 4;

/// Minimum total block size: header (4) + two link words (4+4) + footer (4).
pub const MIN_BLOCK_SIZE: usize = 16;

/// Computes the total block size required to satisfy a payload request of
/// `n` bytes: `max(MIN_BLOCK_SIZE, align(n))` where `align(n) = (n + 15) & !7`
/// adds room for header + footer and rounds up to a doubleword.
///
/// A request of zero is not special-cased here; callers reject `n == 0`
/// before reaching this function (see [`crate::Heap::allocate`]).
#[inline]
pub const fn block_size_for(n: usize) -> usize {
  let aligned = (n + 2 * WSIZE + (DSIZE - 1)) & !(DSIZE - 1);
  if aligned < MIN_BLOCK_SIZE { MIN_BLOCK_SIZE } else { aligned }
}
