//! Pool: a single 4 KiB page dedicated to one size class, carved into
//! fixed-size blocks threaded on an embedded free list.

use std::mem;
use std::ptr::NonNull;

use super::arena::{self, ArenaHeader};
use crate::config;
use crate::list::{Linked, ListLink};

/// The pool header, written into the first bytes of a page carved from an
/// arena. The remainder of the page is divided into `blocks` equal-sized
/// blocks, starting immediately after this header.
#[repr(C)]
pub(crate) struct PoolHeader {
    /// The owning arena. Recovering it is how a freed block finds its way
    /// back to the arena's free-pool list.
    pub(crate) arena: NonNull<ArenaHeader>,
    /// Head of the free-block singly-linked list.
    free_block_head: Option<NonNull<u8>>,
    /// Block size in bytes, a multiple of the quantum. Immutable once
    /// carved.
    pub(crate) blocksz: u16,
    /// Total blocks this page holds. Immutable once carved.
    pub(crate) blocks: u16,
    /// Currently free blocks.
    pub(crate) free: u16,
    /// Whether this pool is currently linked into its class's pool list.
    /// Full pools are unlinked, so `remove`/`sort` can't be called blindly
    /// without first checking this.
    pub(crate) in_list: bool,
    _pad: u8,
    /// This pool's position in its size class's pool list.
    pub(crate) link: ListLink,
}

// SAFETY: see `ArenaHeader`; access is always under the owning size
// class's lock.
unsafe impl Send for PoolHeader {}
unsafe impl Sync for PoolHeader {}

unsafe impl Linked for PoolHeader {
    fn link(this: NonNull<Self>) -> NonNull<ListLink> {
        // SAFETY: `this` points at a live `PoolHeader`.
        unsafe { NonNull::new_unchecked(std::ptr::addr_of_mut!((*this.as_ptr()).link)) }
    }

    unsafe fn from_link(link: NonNull<ListLink>) -> NonNull<Self> {
        let offset = std::mem::offset_of!(PoolHeader, link);
        NonNull::new_unchecked(link.as_ptr().cast::<u8>().sub(offset).cast::<PoolHeader>())
    }

    fn key(this: NonNull<Self>) -> usize {
        // SAFETY: `this` points at a live, lock-guarded `PoolHeader`.
        unsafe { (*this.as_ptr()).free as usize }
    }
}

/// Carves a pool of the given size class from `arena`.
///
/// # Safety
///
/// `arena` must point at a live `ArenaHeader` with `free > 0`, accessed
/// under the caller's arena lock.
pub(crate) unsafe fn alloc_pool(
    arena: NonNull<ArenaHeader>,
    class: usize,
) -> Option<NonNull<PoolHeader>> {
    let page = arena::take_free_page(arena)?;

    let blocksz = config::class_to_size(class);
    let header_size = mem::size_of::<PoolHeader>();
    let blocks = (config::PAGE_SIZE - header_size) / blocksz;

    let pool = page.cast::<PoolHeader>();
    pool.as_ptr().write(PoolHeader {
        arena,
        free_block_head: None,
        blocksz: blocksz as u16,
        blocks: blocks as u16,
        free: blocks as u16,
        in_list: false,
        _pad: 0,
        link: ListLink::default(),
    });

    let blocks_base = page.as_ptr().add(header_size);
    let mut head: Option<NonNull<u8>> = None;
    for i in (0..blocks).rev() {
        let block = NonNull::new_unchecked(blocks_base.add(i * blocksz));
        block.cast::<Option<NonNull<u8>>>().as_ptr().write(head);
        head = Some(block);
    }
    (*pool.as_ptr()).free_block_head = head;

    Some(pool)
}

/// Re-threads `pool`'s page onto its owning arena's free-pool list.
///
/// # Safety
///
/// `pool` must point at a live, empty (`free == blocks`) `PoolHeader`
/// carved from its arena via [`alloc_pool`], not currently linked into any
/// class pool list, accessed under the caller's arena lock.
pub(crate) unsafe fn free_pool(pool: NonNull<PoolHeader>) {
    let arena = (*pool.as_ptr()).arena;
    arena::give_free_page(arena, pool.cast::<u8>());
}

/// Unlinks the head of the free-block list.
///
/// # Safety
///
/// `pool` must point at a live `PoolHeader` with `free > 0`, accessed under
/// the caller's size-class lock.
pub(crate) unsafe fn alloc_block(pool: NonNull<PoolHeader>) -> NonNull<u8> {
    let p = pool.as_ptr();
    let block = (*p).free_block_head.expect("AllocBlock precondition: pool->free > 0");
    (*p).free_block_head = block.cast::<Option<NonNull<u8>>>().as_ptr().read();
    (*p).free -= 1;
    block
}

/// Pushes `block` back onto `pool`'s free-block list.
///
/// # Safety
///
/// `block` must be a currently-allocated block of `pool`, accessed under
/// the caller's size-class lock. Double-free is not detected.
pub(crate) unsafe fn free_block(pool: NonNull<PoolHeader>, block: NonNull<u8>) {
    let p = pool.as_ptr();
    block.cast::<Option<NonNull<u8>>>().as_ptr().write((*p).free_block_head);
    (*p).free_block_head = Some(block);
    (*p).free += 1;
}
