//! The invariant checker: the allocator's primary test oracle (§9). Walks
//! the physical heap and the free list independently and reports every
//! structural inconsistency it finds, rather than stopping at the first.

use std::collections::HashSet;

use log::warn;
use thiserror::Error;

use crate::align::MIN_BLOCK_SIZE;
use crate::block::{block_alloc, next_physical, offset_of};
use crate::freelist::FreeList;

/// A single structural violation of one of the invariants in §3.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CheckViolation {
  /// A block's header and footer disagree.
  #[error("block at {addr:#x}: header ({header:#x}) != footer ({footer:#x})")]
  HeaderFooterMismatch { addr: usize, header: u32, footer: u32 },

  /// Two physically adjacent blocks are both free (coalescing should have
  /// merged them).
  #[error("adjacent free blocks at {first:#x} and {second:#x} were not coalesced")]
  AdjacentFreeBlocks { first: usize, second: usize },

  /// A block's total size is below [`MIN_BLOCK_SIZE`].
  #[error("block at {addr:#x} has size {size}, below the minimum of {MIN_BLOCK_SIZE}")]
  SizeTooSmall { addr: usize, size: usize },

  /// A block's total size is not a multiple of 8.
  #[error("block at {addr:#x} has size {size}, which is not a multiple of 8")]
  SizeNotDoublewordAligned { addr: usize, size: usize },

  /// A payload address is not 8-byte aligned.
  #[error("payload at {addr:#x} is not 8-byte aligned")]
  PayloadMisaligned { addr: usize },

  /// The physical walk did not stop exactly at the cached epilogue address.
  #[error("physical walk terminated at {stopped_at:#x} instead of the epilogue at {epilogue:#x}")]
  WalkMissedEpilogue { stopped_at: usize, epilogue: usize },

  /// A block reachable from the free list is marked allocated.
  #[error("free-list member at {addr:#x} is marked allocated")]
  FreeListMemberNotFree { addr: usize },

  /// A free block (found by physical walk) is not reachable from the free
  /// list.
  #[error("free block at {addr:#x} is not reachable from the free list")]
  FreeBlockNotInList { addr: usize },

  /// A free-list link's address falls outside `[lo, hi)`.
  #[error("free-list link at offset {offset:#x} resolves to {addr:#x}, outside the heap")]
  LinkOutOfBounds { offset: u32, addr: usize },

  /// `pred(succ(x)) != x` for some linked pair.
  #[error("broken back-link: successor of {addr:#x} does not point back to it")]
  BrokenBackLink { addr: usize },

  /// The free-block count from the physical walk disagrees with the count
  /// reached by walking the free list.
  #[error("free block count mismatch: {physical} by physical walk, {list} by free-list walk")]
  FreeCountMismatch { physical: usize, list: usize },
}

/// Runs the invariant checker over the heap `[base, epilogue]` and the free
/// list anchored at `list`, returning every violation found. Each violation
/// is also emitted on the `log` diagnostic channel via [`log::warn!`].
///
/// `lo`/`hi` are the arena's reported bounds, used to validate free-list
/// links (invariant 4 in §3); `base` is the prologue's payload address and
/// `epilogue` is the current epilogue header address.
///
/// # Safety
/// `base` must be the payload address of a valid prologue block and
/// `epilogue` must be the address of the current epilogue header; the
/// physical chain from one to the other must consist of valid block
/// headers/footers (or this function may read out of bounds while trying to
/// detect that it doesn't).
pub unsafe fn check(
  lo: usize,
  hi: usize,
  base: usize,
  epilogue: usize,
  list: &FreeList,
  verbose: bool,
) -> Vec<CheckViolation> {
  let mut violations = Vec::new();
  let mut free_by_walk: HashSet<usize> = HashSet::new();
  let mut prev_was_free = false;
  // `base` is the prologue, a sentinel whose size (DSIZE) is deliberately
  // below MIN_BLOCK_SIZE; the walk starts at the first real block instead.
  let mut bp = unsafe { next_physical(base) };

  loop {
    let header = unsafe { crate::block::get_word(crate::block::header_addr(bp)) };
    let size = crate::block::size_of_word(header);

    if bp == epilogue {
      if size != 0 || !crate::block::alloc_of_word(header) {
        violations.push(CheckViolation::WalkMissedEpilogue { stopped_at: bp, epilogue });
      }
      break;
    }

    let footer = unsafe { crate::block::get_word(crate::block::footer_addr(bp, size)) };
    if footer != header {
      violations.push(CheckViolation::HeaderFooterMismatch { addr: bp, header, footer });
    }

    if size < MIN_BLOCK_SIZE {
      violations.push(CheckViolation::SizeTooSmall { addr: bp, size });
    }
    if size % 8 != 0 {
      violations.push(CheckViolation::SizeNotDoublewordAligned { addr: bp, size });
    }
    if bp % 8 != 0 {
      violations.push(CheckViolation::PayloadMisaligned { addr: bp });
    }

    let is_free = !crate::block::alloc_of_word(header);
    if is_free {
      free_by_walk.insert(bp);
      if prev_was_free {
        violations.push(CheckViolation::AdjacentFreeBlocks {
          first: unsafe { crate::block::prev_physical(bp) },
          second: bp,
        });
      }
    }
    prev_was_free = is_free;

    if verbose {
      log::trace!("check: physical block at {bp:#x}, size {size}, free={is_free}");
    }

    if size == 0 {
      // Defensive: avoid an infinite loop on a corrupt zero-size interior block.
      violations.push(CheckViolation::SizeTooSmall { addr: bp, size });
      break;
    }
    bp = unsafe { next_physical(bp) };
    if bp >= hi {
      violations.push(CheckViolation::WalkMissedEpilogue { stopped_at: bp, epilogue });
      break;
    }
  }

  let mut free_by_list: HashSet<usize> = HashSet::new();
  for bp in list.iter(base) {
    if verbose {
      log::trace!("check: free-list block at {bp:#x}");
    }
    if bp < lo || bp >= hi {
      violations.push(CheckViolation::LinkOutOfBounds { offset: offset_of(base, bp), addr: bp });
      continue;
    }
    if unsafe { block_alloc(bp) } {
      violations.push(CheckViolation::FreeListMemberNotFree { addr: bp });
    }

    let succ = unsafe { crate::block::get_word(bp + 4) };
    if succ != 0 {
      let next_bp = crate::block::addr_of(base, succ);
      if next_bp >= lo && next_bp < hi {
        let back = unsafe { crate::block::get_word(next_bp) };
        if back != offset_of(base, bp) {
          violations.push(CheckViolation::BrokenBackLink { addr: bp });
        }
      }
    }
    free_by_list.insert(bp);
  }

  for &addr in free_by_walk.difference(&free_by_list) {
    violations.push(CheckViolation::FreeBlockNotInList { addr });
  }

  if free_by_walk.len() != free_by_list.len() {
    violations.push(CheckViolation::FreeCountMismatch {
      physical: free_by_walk.len(),
      list: free_by_list.len(),
    });
  }

  for violation in &violations {
    warn!("{violation}");
  }

  violations
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::align::{DSIZE, WSIZE};
  use crate::block::{header_addr, pack, put_word, set_header_footer};

  /// Lays out a prologue, a run of blocks, and an epilogue in a scratch
  /// buffer, returning `(lo, hi, base, epilogue, bps)`.
  fn layout(sizes: &[(usize, bool)]) -> (usize, usize, usize, usize, Vec<usize>, Vec<u8>) {
    let total = 2 * WSIZE + DSIZE + sizes.iter().map(|(s, _)| s).sum::<usize>() + WSIZE;
    let mut buf = vec![0u8; total + WSIZE];
    let lo = buf.as_mut_ptr() as usize + WSIZE; // pretend padding word is below lo
    let base = lo + 2 * WSIZE;
    unsafe { set_header_footer(base, DSIZE, true) }; // prologue

    let mut cursor = base + DSIZE;
    let mut bps = Vec::new();
    for &(size, alloc) in sizes {
      unsafe { set_header_footer(cursor, size, alloc) };
      bps.push(cursor);
      cursor += size;
    }
    unsafe { put_word(header_addr(cursor), pack(0, true)) }; // epilogue
    let epilogue = cursor;
    let hi = epilogue + WSIZE;

    (lo, hi, base, epilogue, bps, buf)
  }

  #[test]
  fn clean_heap_with_matching_free_list_has_no_violations() {
    let (lo, hi, base, epilogue, bps, _buf) = layout(&[(16, true), (24, false), (16, true)]);
    let mut list = FreeList::new();
    unsafe { list.insert(base, bps[1]) };

    let violations = unsafe { check(lo, hi, base, epilogue, &list, false) };
    assert!(violations.is_empty(), "{violations:?}");
  }

  #[test]
  fn detects_free_block_missing_from_list() {
    let (lo, hi, base, epilogue, _bps, _buf) = layout(&[(16, true), (24, false), (16, true)]);
    let list = FreeList::new(); // empty: the free block was never inserted

    let violations = unsafe { check(lo, hi, base, epilogue, &list, false) };
    assert!(violations.iter().any(|v| matches!(v, CheckViolation::FreeBlockNotInList { .. })));
    assert!(violations.iter().any(|v| matches!(v, CheckViolation::FreeCountMismatch { .. })));
  }

  #[test]
  fn detects_adjacent_free_blocks() {
    let (lo, hi, base, epilogue, bps, _buf) = layout(&[(16, true), (16, false), (16, false)]);
    let mut list = FreeList::new();
    unsafe {
      list.insert(base, bps[1]);
      list.insert(base, bps[2]);
    }

    let violations = unsafe { check(lo, hi, base, epilogue, &list, false) };
    assert!(violations.iter().any(|v| matches!(v, CheckViolation::AdjacentFreeBlocks { .. })));
  }

  #[test]
  fn detects_header_footer_mismatch() {
    let (lo, hi, base, epilogue, bps, _buf) = layout(&[(16, true), (24, false), (16, true)]);
    let mut list = FreeList::new();
    unsafe { list.insert(base, bps[1]) };

    // Corrupt the footer of the middle block.
    unsafe { put_word(crate::block::footer_addr(bps[1], 24), pack(32, false)) };

    let violations = unsafe { check(lo, hi, base, epilogue, &list, false) };
    assert!(violations.iter().any(|v| matches!(v, CheckViolation::HeaderFooterMismatch { .. })));
  }
}
