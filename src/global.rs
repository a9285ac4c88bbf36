//! The process-wide default allocator: a singleton [`Memory`] instance with
//! an explicit `Initialize`/`Finalize` lifecycle, plus the free-function
//! façade (`Alloc`/`Calloc`/`Realloc`/`Free`) that forwards to it.
//!
//! There is no implicit construction; a process that never calls
//! [`initialize`] never maps a single arena.

use std::ptr::NonNull;
use std::sync::OnceLock;

use crate::memory::Memory;

static DEFAULT_ALLOCATOR: OnceLock<Memory> = OnceLock::new();

fn default_allocator() -> &'static Memory {
    DEFAULT_ALLOCATOR.get_or_init(Memory::new)
}

/// Idempotent bring-up of the process-wide default allocator.
pub fn initialize() -> bool {
    default_allocator().initialize()
}

/// Tears down the process-wide default allocator. The caller must ensure
/// there are no outstanding allocations.
pub fn finalize() {
    default_allocator().finalize()
}

/// Allocates `size` bytes from the process-wide default allocator.
pub fn alloc(size: usize) -> Option<NonNull<u8>> {
    default_allocator().alloc(size)
}

/// Zero-fills `num * size` bytes from the process-wide default allocator.
pub fn calloc(num: usize, size: usize) -> Option<NonNull<u8>> {
    default_allocator().calloc(num, size)
}

/// Frees `ptr`, previously returned by [`alloc`]/[`calloc`]/[`realloc`].
pub fn free(ptr: Option<NonNull<u8>>) {
    default_allocator().free(ptr)
}

/// Reallocates `ptr` to `size` bytes.
pub fn realloc(ptr: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
    default_allocator().realloc(ptr, size)
}

#[cfg(feature = "global")]
mod global_alloc_impl {
    use std::alloc::{GlobalAlloc, Layout};

    use super::default_allocator;

    /// Installs Stratum as the process's `#[global_allocator]`.
    ///
    /// Stratum ignores alignment requests above its quantum (8 bytes), so
    /// this should not be installed in a process that relies on
    /// over-aligned global allocations.
    pub struct StratumGlobal;

    unsafe impl GlobalAlloc for StratumGlobal {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            default_allocator()
                .alloc(layout.size().max(1))
                .map_or(std::ptr::null_mut(), |p| p.as_ptr())
        }

        unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
            default_allocator().free(std::ptr::NonNull::new(ptr));
        }

        unsafe fn realloc(&self, ptr: *mut u8, _layout: Layout, new_size: usize) -> *mut u8 {
            default_allocator()
                .realloc(std::ptr::NonNull::new(ptr), new_size.max(1))
                .map_or(std::ptr::null_mut(), |p| p.as_ptr())
        }
    }
}

#[cfg(feature = "global")]
pub use global_alloc_impl::StratumGlobal;
