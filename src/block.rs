//! Block layout: boundary-tag packing, physical-neighbour navigation, and the
//! offset math used to thread the free list through payload bytes.
//!
//! Every block — allocated or free — looks like:
//!
//! ```text
//!   ┌─────────┬──────────────────────────────┬─────────┐
//!   │ header  │           payload             │ footer  │
//!   │ (4 B)   │   (>= 8 B, multiple of 8)     │ (4 B)   │
//!   └─────────┴──────────────────────────────┴─────────┘
//!             ▲
//!             └── `bp`, the address returned to callers
//! ```
//!
//! Header and footer are identical words encoding `size | alloc_bit`. A free
//! block additionally stores two link words at the start of its payload:
//!
//! ```text
//!   payload[0..4)  predecessor offset (0 = none)
//!   payload[4..8)  successor   offset (0 = none)
//! ```
//!
//! All addresses this module deals with are real process addresses (the
//! heap is backed by real memory obtained from the [`crate::arena::Arena`]);
//! only the free-list *links* are stored compactly as 32-bit offsets from a
//! fixed `base`, per [`offset_of`]/[`addr_of`].

use crate::align::{DSIZE, WSIZE};

/// Reads the 4-byte word at `addr`.
///
/// # Safety
/// `addr` must be valid for a 4-byte read and not concurrently mutated.
#[inline]
pub unsafe fn get_word(addr: usize) -> u32 {
  unsafe { (addr as *const u32).read_unaligned() }
}

/// Writes the 4-byte word `val` at `addr`.
///
/// # Safety
/// `addr` must be valid for a 4-byte write and not concurrently mutated.
#[inline]
pub unsafe fn put_word(addr: usize, val: u32) {
  unsafe { (addr as *mut u32).write_unaligned(val) };
}

/// Packs a block `size` (already a multiple of 8) and an `alloc` bit into a
/// single header/footer word.
#[inline]
pub const fn pack(size: usize, alloc: bool) -> u32 {
  size as u32 | (alloc as u32)
}

/// Extracts the size field from a header/footer word (clears the low 3 bits).
#[inline]
pub const fn size_of_word(word: u32) -> usize {
  (word & !0x7) as usize
}

/// Extracts the allocated flag from a header/footer word.
#[inline]
pub const fn alloc_of_word(word: u32) -> bool {
  (word & 0x1) != 0
}

/// Address of the header word for payload `bp`.
#[inline]
pub const fn header_addr(bp: usize) -> usize {
  bp - WSIZE
}

/// Address of the footer word for a block at `bp` with total `size`.
#[inline]
pub const fn footer_addr(bp: usize, size: usize) -> usize {
  bp + size - DSIZE
}

/// Reads the total size of the block at payload address `bp` from its header.
///
/// # Safety
/// `bp` must be a valid block payload address (header readable).
#[inline]
pub unsafe fn block_size(bp: usize) -> usize {
  size_of_word(unsafe { get_word(header_addr(bp)) })
}

/// Reads the allocated flag of the block at payload address `bp`.
///
/// # Safety
/// `bp` must be a valid block payload address (header readable).
#[inline]
pub unsafe fn block_alloc(bp: usize) -> bool {
  alloc_of_word(unsafe { get_word(header_addr(bp)) })
}

/// Writes matching header and footer words for the block at `bp`, encoding
/// `(size, alloc)`.
///
/// # Safety
/// `bp`'s header and `bp + size - 4` must both be valid, writable word
/// addresses, i.e. the block must be exactly `size` bytes wide.
#[inline]
pub unsafe fn set_header_footer(bp: usize, size: usize, alloc: bool) {
  let word = pack(size, alloc);
  unsafe {
    put_word(header_addr(bp), word);
    put_word(footer_addr(bp, size), word);
  }
}

/// Address of the next block's payload, found by adding this block's size.
///
/// # Safety
/// `bp` must be a valid block payload address; the result may be the
/// epilogue, which has no payload of its own (callers must check alloc/size
/// of the epilogue header before treating it as an ordinary block).
#[inline]
pub unsafe fn next_physical(bp: usize) -> usize {
  bp + unsafe { block_size(bp) }
}

/// Address of the previous physical block's payload, found via its footer.
///
/// # Safety
/// `bp` must not be the prologue (there is no block before it); the word at
/// `bp - 8` must be a valid footer.
#[inline]
pub unsafe fn prev_physical(bp: usize) -> usize {
  let prev_footer = bp - DSIZE;
  let prev_size = size_of_word(unsafe { get_word(prev_footer) });
  bp - prev_size
}

/// Converts an absolute payload address to a `base`-relative `u32` offset
/// for storage in a free-list link word. `base` is the prologue's payload
/// address, so offset 0 is reserved as "null" (the prologue is never free).
#[inline]
pub fn offset_of(base: usize, bp: usize) -> u32 {
  debug_assert!(bp >= base);
  (bp - base) as u32
}

/// Converts a `base`-relative offset back to an absolute payload address.
/// An offset of 0 denotes "no block" and must be checked by the caller
/// before calling this function.
#[inline]
pub fn addr_of(base: usize, offset: u32) -> usize {
  base + offset as usize
}
