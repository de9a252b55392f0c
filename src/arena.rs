//! The heap arena: the external, page-granularity memory provider the
//! allocator grows into. This module defines the [`Arena`] contract and
//! ships one concrete implementation, [`SbrkArena`], backed by POSIX
//! `sbrk(2)` — the same system call the teacher crate's bump allocator uses
//! to grow the process heap.
//!
//! The allocator logic in [`crate::Heap`] is generic over `Arena`; anything
//! implementing this trait (a fixed static buffer, an `mmap`-backed region,
//! a `no_std` page allocator) can stand in for `SbrkArena`.

use libc::{c_void, intptr_t, sbrk};
use thiserror::Error;

/// Failure modes the arena can report back to the allocator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArenaError {
  /// The provider refused to grow the heap (e.g. `sbrk` hit a resource
  /// limit or returned `(void*)-1`).
  #[error("arena exhausted: unable to grow the heap")]
  Exhausted,
  /// The requested growth would push the heap past the 4 GiB ceiling that
  /// the allocator's 32-bit free-list offsets can address.
  #[error("requested heap growth would exceed the 4 GiB offset space")]
  Overflow,
}

/// The page-granularity heap provider contract (§6 of the design).
///
/// `grow` is the only mutating operation; `lo`/`hi`/`size` are bounds
/// queries used solely by the invariant checker.
pub trait Arena {
  /// Appends `bytes` to the heap and returns the address of the first new
  /// byte. `bytes` is always a multiple of 8 when called by this crate.
  fn grow(&mut self, bytes: usize) -> Result<usize, ArenaError>;

  /// The lowest address ever handed out by this arena.
  fn lo(&self) -> usize;

  /// One past the highest address currently handed out by this arena.
  fn hi(&self) -> usize;

  /// Total bytes currently under management: `hi() - lo()`.
  fn size(&self) -> usize {
    self.hi() - self.lo()
  }
}

/// An [`Arena`] backed by the process program break, grown via `sbrk(2)`.
///
/// Mirrors the teacher crate's direct use of `sbrk` to extend the heap, but
/// keeps its own `lo`/`hi` bookkeeping rather than re-querying `sbrk(0)`, so
/// that `hi()` reflects exactly the bytes this arena itself has granted
/// (another caller of `sbrk` in the same process is out of scope, per the
/// single-mutator assumption in §5).
#[derive(Debug)]
pub struct SbrkArena {
  lo: usize,
  hi: usize,
}

impl SbrkArena {
  /// Creates a new arena anchored at the current program break.
  pub fn new() -> Self {
    let here = unsafe { sbrk(0) } as usize;
    Self { lo: here, hi: here }
  }
}

impl Default for SbrkArena {
  fn default() -> Self {
    Self::new()
  }
}

impl Arena for SbrkArena {
  fn grow(&mut self, bytes: usize) -> Result<usize, ArenaError> {
    if bytes == 0 {
      return Ok(self.hi);
    }
    // The ceiling is on the heap's *size* (the span the free list's 32-bit,
    // base-relative offsets must cover), not on the absolute process
    // address, which on a 64-bit host is already far above u32::MAX.
    let current_size = self.hi - self.lo;
    if current_size.checked_add(bytes).is_none_or(|size| size > u32::MAX as usize) {
      return Err(ArenaError::Overflow);
    }

    let raw = unsafe { sbrk(bytes as intptr_t) };
    if raw as usize == usize::MAX {
      return Err(ArenaError::Exhausted);
    }

    let addr = raw as *const c_void as usize;
    self.hi = addr + bytes;
    Ok(addr)
  }

  fn lo(&self) -> usize {
    self.lo
  }

  fn hi(&self) -> usize {
    self.hi
  }
}
