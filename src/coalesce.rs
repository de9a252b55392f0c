//! The coalescer: immediate boundary-tag merging of a freshly-freed block
//! with its free physical neighbours.
//!
//! Called with a block whose header/footer already mark it free but which
//! is *not yet* linked into the free list. Four cases, keyed on whether the
//! physical predecessor and successor are allocated (`A`) or free (`F`):
//!
//! ```text
//!   A A:  no merge, bp unchanged
//!   A F:  unlink(next);          bp grows to the right
//!   F A:  unlink(prev); bp=prev; bp grows to the left
//!   F F:  unlink(prev); unlink(next); bp=prev; bp grows both ways
//! ```
//!
//! The caller is responsible for inserting the (possibly moved) returned
//! block into the free list; this function never touches list membership of
//! `bp` itself, only of its absorbed neighbours.

use crate::block::{block_alloc, block_size, next_physical, prev_physical, set_header_footer};
use crate::freelist::FreeList;

/// Merges `bp` with any free physical neighbours, returning the address of
/// the (possibly relocated) merged block. `bp` must already carry a free
/// header/footer and must not be linked into `list`.
///
/// # Safety
/// `bp` must be a valid free block that is not the prologue or epilogue, and
/// is not currently linked into `list`. Its physical neighbours' headers
/// must be valid and the prologue/epilogue sentinels must be in place so
/// this never walks past the heap bounds.
pub unsafe fn coalesce(base: usize, list: &mut FreeList, bp: usize) -> usize {
  unsafe {
    let prev = prev_physical(bp);
    let next = next_physical(bp);
    let prev_alloc = block_alloc(prev);
    let next_alloc = block_alloc(next);
    let mut size = block_size(bp);

    match (prev_alloc, next_alloc) {
      (true, true) => bp,
      (true, false) => {
        list.unlink(base, next);
        size += block_size(next);
        set_header_footer(bp, size, false);
        bp
      }
      (false, true) => {
        list.unlink(base, prev);
        size += block_size(prev);
        set_header_footer(prev, size, false);
        prev
      }
      (false, false) => {
        list.unlink(base, prev);
        list.unlink(base, next);
        size += block_size(prev) + block_size(next);
        set_header_footer(prev, size, false);
        prev
      }
    }
  }
}
