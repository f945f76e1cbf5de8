use std::io::Read;

use libc::sbrk;
use segheap::platform::SystemPlatform;
use segheap::{Config, Heap};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
unsafe fn print_program_break(label: &str) {
    println!(
        "[{}] PID = {}, program break (sbrk(0)) = {:?}",
        label,
        std::process::id(),
        unsafe { sbrk(0) },
    );
}

fn main() {
    // The engine: a contiguous region grown via sbrk, plus anonymous
    // mappings for requests too large for it, driven by the real platform.
    let mut heap = Heap::new(SystemPlatform, Config::default());

    unsafe {
        print_program_break("start");
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 1) Allocate space for a u32.
        // --------------------------------------------------------------
        let first_block = heap.allocate(4) as *mut u32;
        println!("\n[1] Allocate u32 at {:?}", first_block);
        first_block.write(0xDEADBEEF);
        println!("[1] Value written to first_block = 0x{:X}", first_block.read());
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 2) Allocate 12 bytes.
        // --------------------------------------------------------------
        let second_block = heap.allocate(12);
        println!("\n[2] Allocate [u8; 12] at {:?}", second_block);
        std::ptr::write_bytes(second_block, 0xAB, 12);
        println!("[2] Initialized second block with 0xAB");
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 3) Allocate a u64 to observe alignment (the engine always hands
        //    back 8-byte aligned payloads).
        // --------------------------------------------------------------
        let third_block = heap.allocate(8) as *mut u64;
        println!("\n[3] Allocate u64 at {:?}", third_block);
        third_block.write(0x1122334455667788);
        println!("[3] Value written = 0x{:X}", third_block.read());
        println!(
            "[3] Address = {:#X}, addr % 8 = {}",
            third_block as usize,
            third_block as usize % 8
        );
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 4) Allocate an array of 16 u16s to force more list movement.
        // --------------------------------------------------------------
        let fourth_block = heap.allocate(32) as *mut u16;
        println!("\n[4] Allocate [u16; 16] at {:?}", fourth_block);
        for i in 0..16 {
            fourth_block.add(i).write(i as u16);
        }
        println!("[4] Wrote 0..15 into the u16 array");
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 5) Free the first block. It becomes a Free block in the
        //    registry, eligible for best-fit reuse on the next allocate.
        // --------------------------------------------------------------
        heap.free(first_block as *mut u8);
        println!("\n[5] Freed first_block at {:?}", first_block);
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 6) Allocate a small block to see whether the engine reuses the
        //    freed span.
        // --------------------------------------------------------------
        let fifth_block = heap.allocate(2);
        println!("\n[6] Allocate [u8; 2] at {:?} (check reuse of freed block)", fifth_block);
        println!(
            "[6] fifth_block == first_block? {}",
            if fifth_block == first_block as *mut u8 {
                "yes, it reused the freed block"
            } else {
                "no, it allocated elsewhere"
            }
        );
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 7) Allocate a block above the mmap threshold to see the
        //    engine fall back to an anonymous mapping instead of growing
        //    the contiguous region.
        // --------------------------------------------------------------
        print_program_break("before large alloc");
        let big_block = heap.allocate(256 * 1024);
        println!("\n[7] Allocate 256 KiB block at {:?} (served from a mapping)", big_block);
        print_program_break("after large alloc (program break unchanged)");
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 8) Shrink the large block in place, then free everything.
        // --------------------------------------------------------------
        let shrunk = heap.resize(big_block, 1024);
        println!("\n[8] Resized large block down to 1024 bytes, now at {:?}", shrunk);
        heap.free(shrunk);
        heap.free(second_block);
        heap.free(third_block as *mut u8);
        heap.free(fourth_block as *mut u8);
        heap.free(fifth_block);
        println!("\n[9] End of example. Freed every outstanding block.");
    }
}
