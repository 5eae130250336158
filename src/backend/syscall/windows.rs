#![cfg(windows)]

use std::ptr;
use windows_sys::Win32::System::Memory::{VirtualAlloc, MEM_COMMIT, MEM_RESERVE, PAGE_READWRITE};

/// Maps a fresh committed region of `size` bytes, or `None` on failure.
///
/// Regions are never released piecewise on Windows (`VirtualFree` with
/// `MEM_RELEASE` frees only whole reservations), so the page cache retains
/// them for the life of the process.
pub(crate) unsafe fn allocate_region(size: usize) -> Option<*mut u8> {
    let ptr = VirtualAlloc(
        ptr::null_mut(),
        size,
        MEM_COMMIT | MEM_RESERVE,
        PAGE_READWRITE,
    );
    if ptr.is_null() {
        None
    } else {
        Some(ptr.cast::<u8>())
    }
}
