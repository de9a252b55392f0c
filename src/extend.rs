//! The heap extender: requests more memory from the [`Arena`], formats it as
//! a new free block terminated by a fresh epilogue, coalesces it with
//! whatever free block used to border the old epilogue, and enrolls the
//! result in the free list.

use log::debug;

use crate::align::WSIZE;
use crate::arena::{Arena, ArenaError};
use crate::block::{put_word, set_header_footer};
use crate::coalesce::coalesce;
use crate::freelist::FreeList;

/// Extends the heap by at least `min_bytes` bytes (rounded up to a
/// doubleword), formats the new space as a free block, merges it with the
/// block that used to sit just before the old epilogue (which may itself be
/// free), links the result into `list`, and returns its payload address.
///
/// Returns the new epilogue's header address alongside the coalesced
/// block's payload address, so the caller can update its cached epilogue
/// pointer.
///
/// # Safety
/// `old_epilogue` must be the address of the current epilogue header word
/// (a zero-size allocated block terminating the heap), and `base` must be
/// the heap's established free-list offset anchor.
pub unsafe fn extend_heap<A: Arena>(
  arena: &mut A,
  base: usize,
  list: &mut FreeList,
  old_epilogue: usize,
  min_bytes: usize,
) -> Result<(usize, usize), ArenaError> {
  let bytes = (min_bytes + 7) & !7;
  let granted = arena.grow(bytes)?;
  debug_assert_eq!(granted, old_epilogue, "arena must append contiguously at hi()");

  let bp = old_epilogue;
  unsafe {
    set_header_footer(bp, bytes, false);
    let new_epilogue = bp + bytes;
    // Header lives one word before the (zero-size) epilogue payload address.
    put_word(crate::block::header_addr(new_epilogue), crate::block::pack(0, true));

    let merged = coalesce(base, list, bp);
    list.insert(base, merged);

    debug!("heap extended: requested {min_bytes} bytes, granted {bytes} at {bp:#x}");

    Ok((merged, new_epilogue))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::align::DSIZE;
  use crate::block::{block_alloc, block_size};
  use std::cell::RefCell;
  use std::rc::Rc;

  /// An in-process arena backed by a growable `Vec<u8>` rather than real
  /// `sbrk`, so tests can extend the heap repeatedly without touching the
  /// process break.
  struct VecArena {
    buf: Rc<RefCell<Vec<u8>>>,
    lo: usize,
  }

  impl VecArena {
    fn new(capacity: usize) -> Self {
      let buf = Rc::new(RefCell::new(vec![0u8; capacity]));
      let lo = buf.borrow().as_ptr() as usize;
      Self { buf, lo }
    }
  }

  impl Arena for VecArena {
    fn grow(&mut self, bytes: usize) -> Result<usize, ArenaError> {
      let mut buf = self.buf.borrow_mut();
      let addr = buf.as_ptr() as usize + buf.len();
      let cap_left = buf.capacity() - buf.len();
      if bytes > cap_left {
        return Err(ArenaError::Exhausted);
      }
      let old_len = buf.len();
      buf.resize(old_len + bytes, 0);
      debug_assert_eq!(buf.as_ptr() as usize + old_len, addr);
      Ok(addr)
    }

    fn lo(&self) -> usize {
      self.lo
    }

    fn hi(&self) -> usize {
      self.buf.borrow().as_ptr() as usize + self.buf.borrow().len()
    }
  }

  fn bootstrap() -> (VecArena, usize, usize) {
    // 4 words of headroom for prologue/epilogue, matching Heap::initialize.
    let mut arena = VecArena::new(4096);
    let pad = arena.grow(4 * WSIZE).unwrap();
    let base = pad + 2 * WSIZE;
    unsafe { set_header_footer(base, DSIZE, true) }; // prologue
    let epilogue = base + DSIZE;
    unsafe { put_word(crate::block::header_addr(epilogue), crate::block::pack(0, true)) };
    (arena, base, epilogue)
  }

  #[test]
  fn extend_heap_formats_a_free_block_and_new_epilogue() {
    let (mut arena, base, epilogue) = bootstrap();
    let mut list = FreeList::new();

    let (bp, new_epilogue) =
      unsafe { extend_heap(&mut arena, base, &mut list, epilogue, 256) }.unwrap();

    assert_eq!(bp, epilogue);
    assert!(!unsafe { block_alloc(bp) });
    assert_eq!(unsafe { block_size(bp) }, 256);
    assert!(unsafe { block_alloc(new_epilogue) });
    assert_eq!(unsafe { block_size(new_epilogue) }, 0);
    assert_eq!(list.iter(base).collect::<Vec<_>>(), vec![bp]);
  }

  #[test]
  fn extend_heap_coalesces_with_previous_free_tail() {
    let (mut arena, base, epilogue) = bootstrap();
    let mut list = FreeList::new();

    // First extension creates one free block right before the epilogue.
    let (first_bp, epilogue) =
      unsafe { extend_heap(&mut arena, base, &mut list, epilogue, 64) }.unwrap();
    assert_eq!(list.iter(base).count(), 1);

    // Second extension must merge with it rather than creating a second
    // free block.
    let (second_bp, _epilogue) =
      unsafe { extend_heap(&mut arena, base, &mut list, epilogue, 64) }.unwrap();

    assert_eq!(second_bp, first_bp);
    assert_eq!(unsafe { block_size(second_bp) }, 64 + 64);
    assert_eq!(list.iter(base).count(), 1);
  }

  #[test]
  fn extend_heap_propagates_arena_exhaustion() {
    let mut arena = VecArena::new(16);
    let pad = arena.grow(4 * WSIZE).unwrap();
    let base = pad + 2 * WSIZE;
    unsafe { set_header_footer(base, DSIZE, true) };
    let epilogue = base + DSIZE;
    unsafe { put_word(crate::block::header_addr(epilogue), crate::block::pack(0, true)) };
    let mut list = FreeList::new();

    let err = unsafe { extend_heap(&mut arena, base, &mut list, epilogue, 4096) };
    assert!(matches!(err, Err(ArenaError::Exhausted)));
  }
}
