//! `libc_shim`: an optional `extern "C"` facade exposing the allocator
//! through the classical `malloc`/`free`/`realloc`/`calloc` names.
//!
//! A single, lazily-initialized [`Heap<SbrkArena>`] backs every call. This is
//! a convenience for linking the allocator into C code or driving it from
//! an FFI smoke test; it inherits every limitation of `Heap` itself, most
//! importantly that it is **not** safe to call from more than one thread at
//! a time (there is no internal locking — see the single-mutator assumption
//! in the crate's top-level docs).

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::OnceLock;

use crate::{Heap, SbrkArena};

struct GlobalHeap(UnsafeCell<Heap<SbrkArena>>);

// SAFETY: this crate provides no synchronization of its own. Wrapping the
// cell in `Sync` only makes `OnceLock` willing to store it; callers of
// `rmalloc`/`rfree`/`rrealloc`/`rcalloc` are responsible for ensuring they
// are never called concurrently, exactly as with glibc `malloc` compiled
// without thread support.
unsafe impl Sync for GlobalHeap {}

static HEAP: OnceLock<GlobalHeap> = OnceLock::new();

fn heap() -> &'static UnsafeCell<Heap<SbrkArena>> {
  &HEAP
    .get_or_init(|| {
      let heap = Heap::initialize(SbrkArena::new()).expect("initial sbrk chunk should be available");
      GlobalHeap(UnsafeCell::new(heap))
    })
    .0
}

/// Allocates `size` bytes, mirroring C `malloc`.
///
/// # Safety
/// Must not be called concurrently with any other `r*` function in this
/// module.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rmalloc(size: usize) -> *mut u8 {
  unsafe { (*heap().get()).allocate(size) }
}

/// Frees a pointer previously returned by [`rmalloc`], [`rrealloc`], or
/// [`rcalloc`], mirroring C `free`. Null is a no-op.
///
/// # Safety
/// `ptr` must be null or a live allocation from this module's heap, and must
/// not be freed twice. Must not be called concurrently with any other `r*`
/// function in this module.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rfree(ptr: *mut u8) {
  unsafe { (*heap().get()).free(ptr) }
}

/// Resizes a pointer previously returned by [`rmalloc`], [`rrealloc`], or
/// [`rcalloc`], mirroring C `realloc`.
///
/// # Safety
/// Same preconditions as [`rfree`] plus: `ptr` may be null, in which case
/// this behaves as [`rmalloc`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rrealloc(ptr: *mut u8, size: usize) -> *mut u8 {
  unsafe { (*heap().get()).reallocate(ptr, size) }
}

/// Allocates `count * size` zeroed bytes, mirroring C `calloc`. Returns null
/// (without allocating) if `count * size` overflows `usize`.
///
/// # Safety
/// Must not be called concurrently with any other `r*` function in this
/// module.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rcalloc(count: usize, size: usize) -> *mut u8 {
  unsafe { (*heap().get()).zeroed_allocate(count, size) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn malloc_write_free_round_trip() {
    unsafe {
      let p = rmalloc(64) as *mut u64;
      assert!(!p.is_null());
      p.write(0xDEADBEEF);
      assert_eq!(p.read(), 0xDEADBEEF);
      rfree(p as *mut u8);
    }
  }

  #[test]
  fn realloc_of_null_behaves_like_malloc() {
    unsafe {
      let p = rrealloc(ptr::null_mut(), 32);
      assert!(!p.is_null());
      rfree(p);
    }
  }

  #[test]
  fn calloc_zeroes_memory() {
    unsafe {
      let p = rcalloc(8, 8);
      assert!(!p.is_null());
      let bytes = std::slice::from_raw_parts(p, 64);
      assert!(bytes.iter().all(|&b| b == 0));
      rfree(p);
    }
  }
}
