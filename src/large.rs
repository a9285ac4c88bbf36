//! The large-allocation path: requests over [`crate::config::BLOCK_MAX_SIZE`]
//! delegate to the system allocator with a two-word prefix header so `Free`
//! and `Realloc` can recover the raw pointer and original size.
//!
//! The header stores a `{size, offset}` pair immediately below a
//! quantum-aligned user pointer, where `offset` is the distance back to the
//! raw allocation the system allocator returned.

use std::alloc::{self, Layout};
use std::mem;
use std::ptr::NonNull;

use crate::config;

/// The prefix header, stored immediately before the user pointer.
#[repr(C)]
struct LargeHeader {
    /// The size the caller requested.
    size: usize,
    /// Distance from the raw allocation base to the user pointer, used to
    /// recover the pointer `System::dealloc` needs.
    offset: usize,
}

const HEADER_SIZE: usize = mem::size_of::<LargeHeader>();

fn layout_for(total: usize) -> Option<Layout> {
    Layout::from_size_align(total, 1).ok()
}

fn total_bytes(user_size: usize) -> Option<usize> {
    user_size.checked_add(HEADER_SIZE)?.checked_add(config::QUANTUM)
}

/// Allocates `size` bytes via the system allocator, returning a
/// quantum-aligned user pointer with a [`LargeHeader`] immediately before
/// it.
///
/// Returns `None` if `size` overflows the header arithmetic or the system
/// allocator refuses the request.
pub(crate) fn alloc_large(size: usize) -> Option<NonNull<u8>> {
    let total = total_bytes(size)?;
    let layout = layout_for(total)?;

    // SAFETY: `layout` has a non-zero size (`size >= 1` by caller contract,
    // plus the header and quantum slack) and alignment 1.
    let raw = unsafe { alloc::alloc(layout) };
    let raw = NonNull::new(raw)?;

    // The user pointer must sit at least `HEADER_SIZE` bytes past `raw` and
    // be quantum-aligned.
    let after_header = unsafe { raw.as_ptr().add(HEADER_SIZE) } as usize;
    let remainder = after_header % config::QUANTUM;
    let pad = if remainder == 0 { 0 } else { config::QUANTUM - remainder };
    let user_ptr = unsafe { raw.as_ptr().add(HEADER_SIZE + pad) };

    let header_ptr = unsafe { user_ptr.sub(HEADER_SIZE) }.cast::<LargeHeader>();
    // SAFETY: `header_ptr` is `HEADER_SIZE` bytes before `user_ptr`, which
    // is itself within the allocation (`HEADER_SIZE + pad <= total`), so the
    // header fits entirely inside the allocated region.
    unsafe {
        header_ptr.write(LargeHeader { size, offset: user_ptr as usize - raw.as_ptr() as usize });
    }

    // SAFETY: user_ptr is non-null (derived from non-null raw by a positive
    // offset).
    Some(unsafe { NonNull::new_unchecked(user_ptr) })
}

/// Reads the header belonging to a user pointer previously returned by
/// [`alloc_large`].
///
/// # Safety
///
/// `user_ptr` must have been returned by [`alloc_large`] and not yet freed.
unsafe fn header_of(user_ptr: NonNull<u8>) -> LargeHeader {
    user_ptr.as_ptr().sub(HEADER_SIZE).cast::<LargeHeader>().read()
}

/// The original caller-requested size of a live large allocation.
///
/// # Safety
///
/// `user_ptr` must have been returned by [`alloc_large`] and not yet freed.
pub(crate) unsafe fn size_of_large(user_ptr: NonNull<u8>) -> usize {
    header_of(user_ptr).size
}

/// Recovers the raw allocation and releases it via the system allocator.
///
/// # Safety
///
/// `user_ptr` must have been returned by [`alloc_large`], must not be used
/// afterwards, and must not be freed twice.
pub(crate) unsafe fn free_large(user_ptr: NonNull<u8>) {
    let header = header_of(user_ptr);
    let raw = user_ptr.as_ptr().sub(header.offset);
    let total = total_bytes(header.size).expect("size was accepted by a prior alloc_large call");
    let layout = layout_for(total).expect("size was accepted by a prior alloc_large call");
    alloc::dealloc(raw, layout);
}
