//! The OS page provider: `os::Alloc`/`os::Free` over anonymous `mmap`.
//!
//! Arenas are always exactly [`crate::config::ARENA_SIZE`] bytes, and
//! `mmap`'s own page granularity already guarantees the alignment Stratum
//! needs, so there is no separate alignment step after a successful call.

use std::ptr::NonNull;

/// Maps a fresh, zeroed, page-aligned region of exactly `size` bytes.
///
/// Returns `None` on any OS failure (out of address space, `RLIMIT_AS`,
/// memory overcommit refusal, ...).
pub(crate) fn alloc(size: usize) -> Option<NonNull<u8>> {
    // SAFETY: a fixed-size anonymous, private mapping with no backing file;
    // the returned pointer is either null (MAP_FAILED) or a valid mapping of
    // `size` bytes owned by the caller until `free` is called with the same
    // size.
    let addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if addr == libc::MAP_FAILED {
        None
    } else {
        // SAFETY: mmap did not fail, so addr is non-null.
        Some(unsafe { NonNull::new_unchecked(addr.cast::<u8>()) })
    }
}

/// Releases a region previously returned by [`alloc`] with the same `size`.
///
/// # Safety
///
/// `ptr` must have been returned by a prior call to [`alloc`] with this
/// exact `size`, and must not be used again after this call.
pub(crate) unsafe fn free(ptr: NonNull<u8>, size: usize) {
    libc::munmap(ptr.as_ptr().cast::<libc::c_void>(), size);
}
