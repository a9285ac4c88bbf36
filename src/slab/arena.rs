//! Arena: a 256 KiB OS-mapped region, one header page plus
//! [`crate::config::POOL_CAPACITY`] pool-candidate pages.

use std::ptr::NonNull;

use crate::config;
use crate::list::{Linked, ListLink};
use crate::os;

/// The arena header, written into the first page of a freshly mapped
/// region. Everything after it in that page is unused padding; pages
/// `1..POOLS_AVAILABLE` are the pool-candidate pages this header tracks.
#[repr(C)]
pub(crate) struct ArenaHeader {
    /// Total pool-candidate capacity, `P`. Immutable once written.
    pub(crate) pools: u32,
    /// Count of raw pages not yet carved into a pool.
    pub(crate) free: u32,
    /// Head of the free-pool singly-linked list; each free page's first
    /// word holds the next free page (or `None`).
    free_pool_head: Option<NonNull<u8>>,
    /// This arena's position in the global arena list.
    pub(crate) link: ListLink,
}

// SAFETY: `ArenaHeader` is accessed only through pointers guarded by the
// `Memory` façade's arena lock; no field is ever read or written without
// holding it.
unsafe impl Send for ArenaHeader {}
unsafe impl Sync for ArenaHeader {}

unsafe impl Linked for ArenaHeader {
    fn link(this: NonNull<Self>) -> NonNull<ListLink> {
        // SAFETY: `this` points at a live `ArenaHeader`; `link` is a field
        // of it, so taking its address is always valid.
        unsafe { NonNull::new_unchecked(std::ptr::addr_of_mut!((*this.as_ptr()).link)) }
    }

    unsafe fn from_link(link: NonNull<ListLink>) -> NonNull<Self> {
        let offset = std::mem::offset_of!(ArenaHeader, link);
        NonNull::new_unchecked(link.as_ptr().cast::<u8>().sub(offset).cast::<ArenaHeader>())
    }

    fn key(this: NonNull<Self>) -> usize {
        // SAFETY: `this` points at a live, lock-guarded `ArenaHeader`.
        unsafe { (*this.as_ptr()).free as usize }
    }
}

/// Obtains a fresh 256 KiB region from the OS, writes its header, and
/// threads the pool-candidate pages onto its free-pool list.
///
/// Returns `None` on OS mapping failure.
pub(crate) fn alloc_arena() -> Option<NonNull<ArenaHeader>> {
    let base = os::alloc(config::ARENA_SIZE)?;
    let header = base.cast::<ArenaHeader>();

    // SAFETY: `base` is a freshly mapped, exclusively owned region of at
    // least `size_of::<ArenaHeader>()` bytes; writing the header and then
    // threading the remaining pages is the only code that has touched it.
    unsafe {
        header.as_ptr().write(ArenaHeader {
            pools: config::POOL_CAPACITY as u32,
            free: config::POOL_CAPACITY as u32,
            free_pool_head: None,
            link: ListLink::default(),
        });

        let mut head: Option<NonNull<u8>> = None;
        for page_index in (1..config::POOLS_AVAILABLE).rev() {
            let page = NonNull::new_unchecked(base.as_ptr().add(page_index * config::PAGE_SIZE));
            page.cast::<Option<NonNull<u8>>>().as_ptr().write(head);
            head = Some(page);
        }
        (*header.as_ptr()).free_pool_head = head;
    }

    Some(header)
}

/// Returns the arena's 256 KiB region to the OS.
///
/// # Safety
///
/// `arena` must be the result of a previous [`alloc_arena`] call, must have
/// `free == pools` (empty), and must not be used after this call.
pub(crate) unsafe fn free_arena(arena: NonNull<ArenaHeader>) {
    os::free(arena.cast::<u8>(), config::ARENA_SIZE);
}

/// Unlinks one raw page from `arena`'s free-pool list.
///
/// # Safety
///
/// `arena` must point at a live `ArenaHeader` with `free > 0`, accessed
/// under the caller's arena lock.
pub(crate) unsafe fn take_free_page(arena: NonNull<ArenaHeader>) -> Option<NonNull<u8>> {
    let a = arena.as_ptr();
    let page = (*a).free_pool_head?;
    (*a).free_pool_head = page.cast::<Option<NonNull<u8>>>().as_ptr().read();
    (*a).free -= 1;
    Some(page)
}

/// Re-threads `page` onto `arena`'s free-pool list.
///
/// # Safety
///
/// `page` must be a pool-candidate page previously carved from `arena` via
/// [`take_free_page`], now empty of any live pool.
pub(crate) unsafe fn give_free_page(arena: NonNull<ArenaHeader>, page: NonNull<u8>) {
    let a = arena.as_ptr();
    page.cast::<Option<NonNull<u8>>>().as_ptr().write((*a).free_pool_head);
    (*a).free_pool_head = Some(page);
    (*a).free += 1;
}
