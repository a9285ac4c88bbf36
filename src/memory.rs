//! The `Memory` façade: owns the arena list and per-size-class pool lists,
//! and implements `Initialize`/`Finalize`/`Alloc`/`Calloc`/`Realloc`/`Free`.

use std::ptr::NonNull;

use parking_lot::Mutex;

use crate::config;
use crate::error::{StratumError, StratumResult};
use crate::large;
use crate::list::OrderedList;
use crate::slab::arena::{self, ArenaHeader};
use crate::slab::pool::{self, PoolHeader};

/// A sorted map from arena base address to arena, consulted to classify a
/// pointer as small (pool-owned) or large without reading through a
/// pointer that might not actually be a valid pool header.
struct ArenaMap {
    bases: Vec<(usize, NonNull<ArenaHeader>)>,
}

// SAFETY: only ever touched while holding the arena lock that also guards
// the arena list itself.
unsafe impl Send for ArenaMap {}

impl ArenaMap {
    fn new() -> Self {
        Self { bases: Vec::new() }
    }

    fn insert(&mut self, arena: NonNull<ArenaHeader>) {
        let base = arena.as_ptr() as usize;
        let idx = self.bases.partition_point(|(b, _)| *b < base);
        self.bases.insert(idx, (base, arena));
    }

    fn remove(&mut self, arena: NonNull<ArenaHeader>) {
        let base = arena.as_ptr() as usize;
        if let Ok(idx) = self.bases.binary_search_by(|(b, _)| b.cmp(&base)) {
            self.bases.remove(idx);
        }
    }

    /// Finds the arena whose 256 KiB extent contains `addr`, if any.
    fn locate(&self, addr: usize) -> Option<NonNull<ArenaHeader>> {
        let idx = self.bases.partition_point(|(b, _)| *b <= addr);
        if idx == 0 {
            return None;
        }
        let (base, arena) = self.bases[idx - 1];
        if addr < base + config::ARENA_SIZE {
            Some(arena)
        } else {
            None
        }
    }
}

/// State guarded by `L_A`: the arena list and the provenance map.
struct ArenaRegistry {
    list: OrderedList<ArenaHeader>,
    map: ArenaMap,
}

impl ArenaRegistry {
    fn new() -> Self {
        Self { list: OrderedList::new(), map: ArenaMap::new() }
    }
}

enum Provenance {
    Small(NonNull<PoolHeader>),
    Large,
}

/// A Stratum allocator instance.
///
/// Most processes want exactly one, reached through [`crate::global`]; this
/// type is exposed directly for embedding or testing multiple independent
/// instances side by side.
pub struct Memory {
    arenas: Mutex<ArenaRegistry>,
    pools: Vec<Mutex<OrderedList<PoolHeader>>>,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    /// Builds an uninitialized instance. Call [`Memory::initialize`] before
    /// allocating.
    pub fn new() -> Self {
        Self {
            arenas: Mutex::new(ArenaRegistry::new()),
            pools: (0..config::CLASSES).map(|_| Mutex::new(OrderedList::new())).collect(),
        }
    }

    /// Idempotent bring-up: creates [`config::MINIMUM_RESERVE`] arenas if
    /// none exist yet. Returns `false`, with no arenas retained, if the OS
    /// can't satisfy the reserve.
    pub fn initialize(&self) -> bool {
        let mut registry = self.arenas.lock();
        if registry.list.count() > 0 {
            return true;
        }

        let mut created = Vec::with_capacity(config::MINIMUM_RESERVE);
        for _ in 0..config::MINIMUM_RESERVE {
            match arena::alloc_arena() {
                Some(a) => created.push(a),
                None => {
                    #[cfg(feature = "logging")]
                    tracing::debug!(created = created.len(), "Initialize rolling back");
                    for a in created {
                        unsafe { arena::free_arena(a) };
                    }
                    return false;
                }
            }
        }

        for a in created {
            registry.map.insert(a);
            registry.list.insert(a);
        }

        #[cfg(feature = "logging")]
        tracing::info!(arenas = config::MINIMUM_RESERVE, "Stratum initialized");
        true
    }

    /// Pops and frees every arena. The caller must ensure there are no
    /// outstanding allocations; Stratum does not track live blocks.
    pub fn finalize(&self) {
        let mut registry = self.arenas.lock();
        while let Some(a) = registry.list.pop() {
            registry.map.remove(a);
            unsafe { arena::free_arena(a) };
        }
        #[cfg(feature = "logging")]
        tracing::info!("Stratum finalized");
    }

    /// Number of arenas currently retained. Exposed for tests and
    /// diagnostics, not part of the conceptual allocator surface.
    pub fn arena_count(&self) -> usize {
        self.arenas.lock().list.count()
    }

    /// [`Memory::initialize`], reporting OS mapping failure as a
    /// [`StratumError`] instead of a bare `false`.
    pub fn try_initialize(&self) -> StratumResult<()> {
        if self.initialize() {
            Ok(())
        } else {
            Err(StratumError::ArenaMapFailed)
        }
    }

    /// [`Memory::alloc`], reporting failure as a [`StratumError`] that
    /// distinguishes a refused large request from small-path OS pressure.
    pub fn try_alloc(&self, size: usize) -> StratumResult<NonNull<u8>> {
        self.alloc(size).ok_or_else(|| {
            if size > config::BLOCK_MAX_SIZE {
                StratumError::LargeAllocFailed { size }
            } else {
                StratumError::ArenaMapFailed
            }
        })
    }

    /// Returns a pool with spare capacity for `class`, carving a new one if
    /// the class list is empty. Must be called with `pools[class]` held.
    fn get_pool(
        &self,
        class: usize,
        pool_list: &mut OrderedList<PoolHeader>,
    ) -> Option<NonNull<PoolHeader>> {
        if let Some(p) = pool_list.front() {
            return Some(p);
        }
        let pool = self.allocate_pool(class)?;
        pool_list.insert(pool);
        unsafe { (*pool.as_ptr()).in_list = true };
        Some(pool)
    }

    /// Carves a new pool of `class` from an existing or freshly-mapped
    /// arena. Takes `L_A`.
    fn allocate_pool(&self, class: usize) -> Option<NonNull<PoolHeader>> {
        let mut registry = self.arenas.lock();

        let arena = match registry.list.find_free() {
            Some(a) => a,
            None => {
                let a = arena::alloc_arena()?;
                registry.map.insert(a);
                registry.list.insert(a);
                #[cfg(feature = "logging")]
                tracing::debug!("arena grown beyond the initial reserve");
                a
            }
        };

        // SAFETY: `arena` has `free > 0` by construction of `find_free`/a
        // freshly mapped arena, and is accessed under `L_A`.
        let pool = unsafe { pool::alloc_pool(arena, class) }?;
        registry.list.sort(arena);
        Some(pool)
    }

    /// Classifies `ptr` as small (pool-owned) or large via the arena map,
    /// under `L_A`.
    fn classify(&self, ptr: NonNull<u8>) -> Provenance {
        let registry = self.arenas.lock();
        match registry.map.locate(ptr.as_ptr() as usize) {
            Some(_arena) => {
                let page_addr = (ptr.as_ptr() as usize) & !(config::PAGE_SIZE - 1);
                // SAFETY: `page_addr` is confirmed to lie within a live
                // arena's extent, so it is the base of a page that either
                // holds the arena header or a carved pool's header; since
                // it's not the arena's own base (that would be an address
                // inside the header page, which Stratum never returns to a
                // caller), it is a pool header.
                Provenance::Small(unsafe {
                    NonNull::new_unchecked(page_addr as *mut PoolHeader)
                })
            }
            None => Provenance::Large,
        }
    }

    /// Allocates `size` bytes. `size == 0` is a precondition violation.
    pub fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        debug_assert!(size > 0, "Alloc(0) is a precondition violation");
        if size <= config::BLOCK_MAX_SIZE {
            self.alloc_small(size)
        } else {
            large::alloc_large(size).or_else(|| {
                #[cfg(feature = "logging")]
                tracing::debug!(size, "large allocation failed");
                None
            })
        }
    }

    fn alloc_small(&self, size: usize) -> Option<NonNull<u8>> {
        let class = config::size_to_class(size);
        let mut pool_list = self.pools[class].lock();
        let pool = self.get_pool(class, &mut pool_list)?;

        // SAFETY: `pool` was just returned non-full by `get_pool`.
        let block = unsafe { pool::alloc_block(pool) };

        // SAFETY: `pool` is held under `pool_list`'s lock.
        if unsafe { (*pool.as_ptr()).free } == 0 {
            pool_list.remove(pool);
            unsafe { (*pool.as_ptr()).in_list = false };
        }

        Some(block)
    }

    /// Zero-fills `num * size` bytes. Returns `None` if either is zero or
    /// the product overflows.
    pub fn calloc(&self, num: usize, size: usize) -> Option<NonNull<u8>> {
        if num == 0 || size == 0 {
            return None;
        }
        let total = num.checked_mul(size)?;
        let ptr = self.alloc(total)?;
        // SAFETY: `ptr` is a fresh allocation of exactly `total` bytes.
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, total) };
        Some(ptr)
    }

    /// Frees `ptr`. A no-op if `ptr` is `None`.
    pub fn free(&self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else { return };
        match self.classify(ptr) {
            Provenance::Small(pool) => self.free_small(pool, ptr),
            // SAFETY: classified as large by the arena map, i.e. not owned
            // by any live arena.
            Provenance::Large => unsafe { large::free_large(ptr) },
        }
    }

    fn free_small(&self, pool: NonNull<PoolHeader>, ptr: NonNull<u8>) {
        // SAFETY: `pool.blocksz` is immutable once carved, so reading it
        // without the class lock is sound.
        let class = config::size_to_class(unsafe { (*pool.as_ptr()).blocksz as usize });
        let mut pool_list = self.pools[class].lock();

        // SAFETY: `ptr` was classified as belonging to `pool` by `classify`.
        unsafe { pool::free_block(pool, ptr) };

        self.release_policy(pool, &mut pool_list);
    }

    /// Release policy: after a small-block free, re-sort or return the
    /// pool, then possibly return or release the arena. `L_C[c]` is held on
    /// entry; this may additionally take `L_A` (the only lock order
    /// Stratum allows: class lock, then arena lock).
    fn release_policy(&self, pool: NonNull<PoolHeader>, pool_list: &mut OrderedList<PoolHeader>) {
        // SAFETY: `pool` is held under `pool_list`'s lock.
        let (free, blocks, in_list) =
            unsafe { ((*pool.as_ptr()).free, (*pool.as_ptr()).blocks, (*pool.as_ptr()).in_list) };

        if free < blocks {
            if in_list {
                pool_list.sort(pool);
            } else {
                pool_list.insert(pool);
                unsafe { (*pool.as_ptr()).in_list = true };
            }
            return;
        }

        // The pool is now empty: return its page to the arena.
        let mut registry = self.arenas.lock();
        if in_list {
            pool_list.remove(pool);
            unsafe { (*pool.as_ptr()).in_list = false };
        }

        // SAFETY: `arena` is immutable once the pool was carved.
        let arena = unsafe { (*pool.as_ptr()).arena };
        // SAFETY: `pool` is confirmed empty above, and is no longer linked
        // into any class list.
        unsafe { pool::free_pool(pool) };

        // SAFETY: `arena` is accessed under `L_A`, held as `registry`.
        let (arena_free, arena_pools) =
            unsafe { ((*arena.as_ptr()).free, (*arena.as_ptr()).pools) };

        if arena_free != arena_pools {
            registry.list.sort(arena);
        } else if registry.list.count() > config::MINIMUM_RESERVE {
            registry.list.remove(arena);
            registry.map.remove(arena);
            // SAFETY: the arena is empty (`arena_free == arena_pools`) and
            // just removed from both the list and the map.
            unsafe { arena::free_arena(arena) };
            #[cfg(feature = "logging")]
            tracing::debug!("empty arena released above the minimum reserve");
        }
    }

    /// Reallocates `ptr` to `size` bytes. `ptr == None` behaves as
    /// `Alloc(size)`.
    pub fn realloc(&self, ptr: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
        let Some(ptr) = ptr else { return self.alloc(size) };
        debug_assert!(size > 0, "Realloc(_, 0) is a precondition violation");

        match self.classify(ptr) {
            Provenance::Small(pool) => {
                // SAFETY: `blocksz` is immutable once carved.
                let blocksz = unsafe { (*pool.as_ptr()).blocksz as usize };

                if size <= config::BLOCK_MAX_SIZE {
                    let actual = config::size_to_class(blocksz);
                    let desired = config::size_to_class(size);
                    if actual >= desired && actual - desired < config::SHRINK_THRESHOLD {
                        return Some(ptr);
                    }
                }

                self.realloc_by_copy(ptr, blocksz, size)
            }
            Provenance::Large => {
                // SAFETY: classified as large, and not yet freed.
                let old_size = unsafe { large::size_of_large(ptr) };
                if size > config::BLOCK_MAX_SIZE && old_size >= size {
                    return Some(ptr);
                }
                self.realloc_by_copy(ptr, old_size, size)
            }
        }
    }

    fn realloc_by_copy(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        size: usize,
    ) -> Option<NonNull<u8>> {
        let new_ptr = self.alloc(size)?;
        let to_copy = old_size.min(size);
        // SAFETY: `ptr` is the live, still-valid old allocation with at
        // least `old_size` readable bytes; `new_ptr` is a fresh allocation
        // of at least `size` bytes; the two never overlap.
        unsafe { std::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), to_copy) };
        self.free(Some(ptr));
        Some(new_ptr)
    }
}
