use std::io::Read;
use std::ptr;

use libc::sbrk;

use dwalloc::{Heap, SbrkArena};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
unsafe fn print_program_break(label: &str) {
  println!("[{}] PID = {}, program break (sbrk(0)) = {:?}", label, std::process::id(), unsafe {
    sbrk(0)
  });
}

fn main() {
  env_logger::init();

  let mut heap = Heap::initialize(SbrkArena::new()).expect("initial sbrk chunk should be available");

  unsafe {
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) Allocate space for a u64.
    // --------------------------------------------------------------------
    let first = heap.allocate(8) as *mut u64;
    println!("\n[1] Allocate u64, address = {:p}", first);
    first.write(0xDEADBEEF);
    println!("[1] Value written = 0x{:X}", first.read());
    assert!(heap.check(false).is_empty());
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Allocate 12 odd-sized bytes.
    // --------------------------------------------------------------------
    let second = heap.allocate(12);
    println!("\n[2] Allocate 12 bytes, address = {:p}", second);
    ptr::write_bytes(second, 0xAB, 12);
    println!("[2] Initialized second block with 0xAB");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Free the first block, then allocate something smaller and watch
    //    the free list hand the same address back out (first fit).
    // --------------------------------------------------------------------
    heap.free(first as *mut u8);
    println!("\n[3] Freed first block at {:p}", first);

    let third = heap.allocate(4) as *mut u64;
    println!(
      "[3] third == first? {}",
      if third as usize == first as usize { "yes, reused the freed block" } else { "no" }
    );
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Grow in place vs. relocate.
    // --------------------------------------------------------------------
    let grown = heap.reallocate(second, 256);
    println!("\n[4] Grew second block (12 -> 256 bytes), address = {:p}", grown);
    assert!(heap.check(false).is_empty());
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Allocate something large enough to force the heap to grow.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");
    let big = heap.allocate(64 * 1024);
    println!("\n[5] Allocated large 64 KiB block at {:p}", big);
    print_program_break("after large alloc");
    assert!(heap.check(false).is_empty());
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) End of demo: run the checker one last time, verbosely.
    // --------------------------------------------------------------------
    let violations = heap.check(true);
    println!("\n[6] Final check: {} violation(s)", violations.len());
    for v in &violations {
      println!("  - {v}");
    }
    println!("[6] End of example. Process will exit and the OS will reclaim all memory.");
  }
}
