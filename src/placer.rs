//! Fit search and placement: choosing a free block for a request and either
//! consuming it whole or splitting off an unused tail.

use crate::align::MIN_BLOCK_SIZE;
use crate::block::{block_size, next_physical, set_header_footer};
use crate::freelist::FreeList;

/// First-fit linear scan over the free list: returns the payload address of
/// the first free block whose total size is at least `asize`, or `None` if
/// no block fits. No rover/next-fit state is kept (see §9 of the design).
pub fn find_fit(base: usize, list: &FreeList, asize: usize) -> Option<usize> {
  list.iter(base).find(|&bp| unsafe { block_size(bp) } >= asize)
}

/// Places a request of `asize` bytes into free block `bp` of total size
/// `block_size(bp)`, first removing `bp` from the free list. If the
/// remainder after carving out `asize` is at least [`MIN_BLOCK_SIZE`], the
/// block is split and the remainder is reinserted as a new free block;
/// otherwise the whole block is handed to the caller as allocated.
///
/// Precondition: `asize <= block_size(bp)`, `asize` is a multiple of 8 and
/// at least `MIN_BLOCK_SIZE`.
///
/// # Safety
/// `bp` must be a valid, free, currently-linked block with total size at
/// least `asize`, and its right physical neighbour (consulted only when
/// splitting, to confirm the split never needs to coalesce) must be a
/// valid header.
pub unsafe fn place(base: usize, list: &mut FreeList, bp: usize, asize: usize) {
  unsafe {
    list.unlink(base, bp);

    let csize = block_size(bp);
    let remainder = csize - asize;

    if remainder >= MIN_BLOCK_SIZE {
      set_header_footer(bp, asize, true);
      let tail = next_physical(bp);
      set_header_footer(tail, remainder, false);
      list.insert(base, tail);
    } else {
      set_header_footer(bp, csize, true);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::{block_alloc, set_header_footer};

  fn scratch(total: usize) -> (usize, Vec<u8>) {
    let mut buf = vec![0u8; total + 4];
    let base = buf.as_mut_ptr() as usize + 4;
    (base, buf)
  }

  #[test]
  fn find_fit_returns_first_large_enough_block() {
    let (base, _buf) = scratch(64);
    unsafe { set_header_footer(base, 16, false) };
    unsafe { set_header_footer(base + 16, 32, false) };

    let mut list = FreeList::new();
    unsafe {
      list.insert(base, base); // size 16, inserted first (ends up at tail)
      list.insert(base, base + 16); // size 32, head of list
    }

    // List order is LIFO: [base+16 (32), base (16)].
    assert_eq!(find_fit(base, &list, 20), Some(base + 16));
    assert_eq!(find_fit(base, &list, 8), Some(base + 16));
    assert_eq!(find_fit(base, &list, 100), None);
  }

  #[test]
  fn place_splits_when_remainder_is_large_enough() {
    let (base, _buf) = scratch(64);
    unsafe { set_header_footer(base, 48, false) };
    let mut list = FreeList::new();
    unsafe { list.insert(base, base) };

    unsafe { place(base, &mut list, base, 24) };

    assert!(unsafe { block_alloc(base) });
    assert_eq!(unsafe { block_size(base) }, 24);

    let tail = unsafe { next_physical(base) };
    assert!(!unsafe { block_alloc(tail) });
    assert_eq!(unsafe { block_size(tail) }, 24);
    assert_eq!(list.iter(base).collect::<Vec<_>>(), vec![tail]);
  }

  #[test]
  fn place_consumes_whole_block_when_remainder_too_small() {
    let (base, _buf) = scratch(64);
    unsafe { set_header_footer(base, 32, false) };
    let mut list = FreeList::new();
    unsafe { list.insert(base, base) };

    // Remainder would be 32 - 24 = 8, below MIN_BLOCK_SIZE (16).
    unsafe { place(base, &mut list, base, 24) };

    assert!(unsafe { block_alloc(base) });
    assert_eq!(unsafe { block_size(base) }, 32);
    assert_eq!(list.iter(base).count(), 0);
  }
}
