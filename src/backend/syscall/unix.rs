#![cfg(unix)]

use libc::{c_void, mmap, munmap, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};
use std::ptr;

/// Maps a fresh anonymous region of `size` bytes, or `None` on failure.
pub(crate) unsafe fn allocate_region(size: usize) -> Option<*mut u8> {
    let ptr = mmap(
        ptr::null_mut(),
        size,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANONYMOUS,
        -1,
        0,
    );

    if ptr == MAP_FAILED {
        None
    } else {
        Some(ptr.cast::<u8>())
    }
}

pub(crate) unsafe fn free_region(ptr: *mut u8, size: usize) {
    munmap(ptr.cast::<c_void>(), size);
}
