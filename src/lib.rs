//! # dwalloc - An Explicit Free-List Allocator with Boundary-Tag Coalescing
//!
//! This crate provides a **dynamic memory allocator** with the classical
//! four-operation interface (`allocate`, `free`, `reallocate`,
//! `zeroed_allocate`) over a single contiguous, monotonically growable heap.
//!
//! ## Overview
//!
//! The allocator manages memory as a chain of **blocks**, each bounded by a
//! boundary tag (a header and footer word encoding size and allocation
//! state). Free blocks additionally carry the links of an **explicit free
//! list**, so that a request can be satisfied by a first-fit scan over only
//! the free blocks, not the whole heap:
//!
//! ```text
//!   Physical heap (prologue .. epilogue):
//!
//!   ┌──────────┬────────────┬──────────┬────────────┬──────────┐
//!   │ prologue │  block A   │ block B  │  block C   │ epilogue │
//!   │ (alloc)  │ (allocated)│  (free)  │ (allocated)│ (size 0) │
//!   └──────────┴────────────┴──────────┴────────────┴──────────┘
//!                                 ▲
//!                                 └── threaded into the free list
//!
//!   Free list (LIFO, offset-linked through free payloads):
//!
//!   freelist ──► block B ──► (more free blocks...) ──► (none)
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   dwalloc
//!   ├── align      - Alignment macros and the block-size formula
//!   ├── arena      - The Arena contract and the sbrk-backed SbrkArena
//!   ├── block      - Boundary-tag packing and physical-neighbour navigation
//!   ├── freelist   - The explicit doubly-linked, offset-based free list
//!   ├── coalesce   - Four-case boundary-tag coalescing
//!   ├── placer     - First-fit search and block placement/splitting
//!   ├── extend     - Heap growth: format new space, coalesce, re-link
//!   └── check      - The invariant checker (the allocator's test oracle)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dwalloc::{Heap, SbrkArena};
//!
//! let mut heap = Heap::initialize(SbrkArena::new()).expect("arena should grant the initial chunk");
//!
//! unsafe {
//!     let p = heap.allocate(24) as *mut u64;
//!     assert!(!p.is_null());
//!     *p = 42;
//!
//!     heap.free(p as *mut u8);
//! }
//!
//! assert!(heap.check(false).is_empty());
//! ```
//!
//! ## How It Works
//!
//! `initialize` obtains an initial chunk from the [`Arena`] and lays down a
//! prologue/epilogue pair; `allocate` scans the free list first-fit, falling
//! back to growing the heap via the arena when nothing fits; `free`
//! immediately coalesces with free physical neighbours; `reallocate`
//! shrinks in place when possible and relocates otherwise.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Heap` is intentionally `!Sync`; no locking
//!   is provided or planned (see [`Heap`]'s docs).
//! - **Heap never shrinks**: freed memory is kept on the free list for
//!   reuse, never returned to the arena.
//! - **First-fit, not best-fit**: a teachable baseline, not a throughput
//!   optimization (see the design notes in `SPEC_FULL.md`).
//! - **4 GiB heap ceiling**: free-list links are 32-bit offsets.
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management.
//! Every function that dereferences a caller-supplied pointer documents its
//! safety preconditions; violating them (double free, freeing a foreign
//! pointer, racing two mutators) is undefined behaviour and is not detected.

pub mod align;
pub mod arena;
pub mod block;
mod check;
mod coalesce;
mod extend;
mod freelist;
mod placer;
#[cfg(feature = "libc_shim")]
mod shim;

pub use arena::{Arena, ArenaError, SbrkArena};
pub use check::CheckViolation;
#[cfg(feature = "libc_shim")]
pub use shim::{rcalloc, rfree, rmalloc, rrealloc};

use std::ptr;

use align::{DSIZE, MIN_BLOCK_SIZE, WSIZE, block_size_for};
use block::{block_size, next_physical, pack, put_word, set_header_footer};
use coalesce::coalesce;
use extend::extend_heap;
use freelist::FreeList;
use placer::{find_fit, place};

/// The heap-growth chunk size used both for the initial heap and for every
/// extension that is not itself larger than this many bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// An explicit free-list heap allocator over a single, growable [`Arena`].
///
/// `Heap` owns all of its state (the arena, the prologue-relative `base`,
/// the cached epilogue address, and the free list); nothing here is a
/// process-wide static, so a program may run several independent heaps
/// (handy in tests). Deliberately `!Sync`/`!Send`-by-convention: concurrent
/// mutators are out of scope (§5 of the design) and this type does not
/// attempt to be usable as a `#[global_allocator]`, which would require
/// synchronization this design forgoes.
pub struct Heap<A: Arena> {
  arena: A,
  base: usize,
  epilogue: usize,
  freelist: FreeList,
  chunk_size: usize,
}

impl<A: Arena> Heap<A> {
  /// Initializes a heap over a freshly-created arena, using
  /// [`DEFAULT_CHUNK_SIZE`] as the growth chunk.
  ///
  /// Lays down an 8-byte allocated prologue and a zero-size allocated
  /// epilogue, then immediately requests one chunk's worth of heap so the
  /// first `allocate` call has somewhere to look.
  pub fn initialize(arena: A) -> Result<Self, ArenaError> {
    Self::with_chunk_size(arena, DEFAULT_CHUNK_SIZE)
  }

  /// Like [`Self::initialize`], but with a caller-chosen growth chunk size.
  /// Useful in tests that want to exercise the heap-growth path without
  /// allocating hundreds of kilobytes up front.
  pub fn with_chunk_size(mut arena: A, chunk_size: usize) -> Result<Self, ArenaError> {
    let pad = arena.grow(4 * WSIZE)?;
    let base = pad + 2 * WSIZE;

    unsafe {
      set_header_footer(base, DSIZE, true); // prologue
      // The epilogue's header lives at header_addr(bp), one word before its
      // (zero-size) payload address, same as every other block.
      put_word(block::header_addr(base + DSIZE), pack(0, true)); // epilogue
    }

    let mut heap =
      Self { arena, base, epilogue: base + DSIZE, freelist: FreeList::new(), chunk_size };

    let (_, new_epilogue) = unsafe {
      extend_heap(&mut heap.arena, heap.base, &mut heap.freelist, heap.epilogue, chunk_size)?
    };
    heap.epilogue = new_epilogue;

    Ok(heap)
  }

  /// Allocates `n` bytes, returning a doubleword-aligned payload pointer, or
  /// null if `n == 0` or the arena cannot supply more memory.
  ///
  /// Chooses `a = max(16, align(n))` as the total block size, scans the
  /// free list first-fit, and on a miss grows the heap by `max(a,
  /// chunk_size)` before retrying placement.
  pub fn allocate(&mut self, n: usize) -> *mut u8 {
    if n == 0 {
      return ptr::null_mut();
    }
    let asize = block_size_for(n);

    if let Some(bp) = find_fit(self.base, &self.freelist, asize) {
      unsafe { place(self.base, &mut self.freelist, bp, asize) };
      return bp as *mut u8;
    }

    let grow_amount = asize.max(self.chunk_size);
    let extended = unsafe {
      extend_heap(&mut self.arena, self.base, &mut self.freelist, self.epilogue, grow_amount)
    };
    let Ok((_, new_epilogue)) = extended else {
      return ptr::null_mut();
    };
    self.epilogue = new_epilogue;

    match find_fit(self.base, &self.freelist, asize) {
      Some(bp) => {
        unsafe { place(self.base, &mut self.freelist, bp, asize) };
        bp as *mut u8
      }
      // Unreachable in practice: the heap just grew by at least `asize`, so
      // coalescing with the extension must produce a block large enough.
      None => ptr::null_mut(),
    }
  }

  /// Frees a previously allocated payload, immediately coalescing with any
  /// free physical neighbours and re-inserting the result into the free
  /// list. A null pointer is a no-op.
  ///
  /// # Safety
  /// `bp` must be null or a pointer previously returned by `allocate`,
  /// `reallocate`, or `zeroed_allocate` on this same `Heap` and not yet
  /// freed. Freeing a dangling, foreign, or already-freed pointer is
  /// undefined behaviour and is not detected.
  pub fn free(&mut self, bp: *mut u8) {
    if bp.is_null() {
      return;
    }
    let bp = bp as usize;

    unsafe {
      let size = block_size(bp);
      set_header_footer(bp, size, false);
      put_word(bp, 0);
      put_word(bp + 4, 0);

      let merged = coalesce(self.base, &mut self.freelist, bp);
      self.freelist.insert(self.base, merged);
    }
  }

  /// Resizes the allocation at `bp` to `n` bytes.
  ///
  /// - `bp` null: behaves as `allocate(n)`.
  /// - `n == 0`: frees `bp` and returns null.
  /// - Shrinking (or a request that fits in the existing block's slack):
  ///   either returns `bp` unchanged (remainder too small to split) or
  ///   splits the block in place, coalescing the new tail with whatever
  ///   free block follows it.
  /// - Growing: allocates a new block, copies
  ///   `min(old_payload_size, new_payload_size)` bytes from the old
  ///   payload, frees the old block, and returns the new pointer. On
  ///   allocation failure, the old block is left untouched and null is
  ///   returned.
  ///
  /// # Safety
  /// `bp` must be null or a pointer previously returned by this `Heap` and
  /// not yet freed.
  pub fn reallocate(&mut self, bp: *mut u8, n: usize) -> *mut u8 {
    if bp.is_null() {
      return self.allocate(n);
    }
    if n == 0 {
      self.free(bp);
      return ptr::null_mut();
    }

    let old_addr = bp as usize;
    let old_size = unsafe { block_size(old_addr) };
    let asize = block_size_for(n);

    if old_size >= asize {
      if old_size - asize < MIN_BLOCK_SIZE {
        return bp;
      }
      unsafe { self.shrink_in_place(old_addr, old_size, asize) };
      return bp;
    }

    let new_ptr = self.allocate(n);
    if new_ptr.is_null() {
      return ptr::null_mut();
    }

    let new_addr = new_ptr as usize;
    let new_size = unsafe { block_size(new_addr) };
    let old_payload = old_size - DSIZE;
    let new_payload = new_size - DSIZE;
    let copy_len = old_payload.min(new_payload);

    unsafe { ptr::copy_nonoverlapping(old_addr as *const u8, new_ptr, copy_len) };
    self.free(bp);

    new_ptr
  }

  /// Shrinks the block at `old_addr` (currently `old_size` bytes) down to
  /// `asize`, forming and coalescing a free tail of the remainder.
  ///
  /// # Safety
  /// `old_addr` must be an allocated block of exactly `old_size` bytes, and
  /// `old_size - asize` must be at least `MIN_BLOCK_SIZE`.
  unsafe fn shrink_in_place(&mut self, old_addr: usize, old_size: usize, asize: usize) {
    unsafe {
      set_header_footer(old_addr, asize, true);

      let tail = next_physical(old_addr);
      let remainder = old_size - asize;
      set_header_footer(tail, remainder, false);
      put_word(tail, 0);
      put_word(tail + 4, 0);

      let merged = coalesce(self.base, &mut self.freelist, tail);
      self.freelist.insert(self.base, merged);
    }
  }

  /// Allocates `count * size` bytes and zeroes them, returning null if the
  /// multiplication overflows `usize`, if the total is zero, or if the
  /// underlying `allocate` fails.
  pub fn zeroed_allocate(&mut self, count: usize, size: usize) -> *mut u8 {
    let Some(total) = count.checked_mul(size) else {
      return ptr::null_mut();
    };

    let p = self.allocate(total);
    if !p.is_null() {
      unsafe { ptr::write_bytes(p, 0, total) };
    }
    p
  }

  /// Runs the invariant checker (§3/§8) over the current heap state,
  /// returning every violation found. Each violation is also logged via
  /// `log::warn!`; callers that want a hard failure can
  /// `assert!(heap.check(false).is_empty())`.
  pub fn check(&self, verbose: bool) -> Vec<CheckViolation> {
    unsafe {
      check::check(self.arena.lo(), self.arena.hi(), self.base, self.epilogue, &self.freelist, verbose)
    }
  }

  /// The arena's current bounds, exposed for callers (and the stress test)
  /// that want to confirm the heap only ever grows.
  pub fn bounds(&self) -> (usize, usize) {
    (self.arena.lo(), self.arena.hi())
  }

  /// Sizes of every block currently on the free list, head first. A
  /// diagnostic for callers (and the stress test) that want to confirm how
  /// fragmented the heap currently is without reaching into its internals.
  pub fn free_block_sizes(&self) -> Vec<usize> {
    self.freelist.iter(self.base).map(|bp| unsafe { block_size(bp) }).collect()
  }
}
