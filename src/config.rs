//! Compile-time constants and size-class arithmetic.
//!
//! Every other module reads these rather than repeating the arithmetic, so
//! changing the quantum or class ceiling only touches this file.

/// Bytes per OS page. Stratum assumes a flat 4 KiB page size rather than
/// querying `sysconf(_SC_PAGESIZE)`, and never varies it at runtime.
pub const PAGE_SIZE: usize = 4096;

/// Bytes per arena: 64 pages.
pub const ARENA_SIZE: usize = 256 * 1024;

/// Pages per arena, including the header page.
pub const POOLS_AVAILABLE: usize = ARENA_SIZE / PAGE_SIZE;

/// Pool-candidate pages per arena (`POOLS_AVAILABLE` minus the header page).
pub const POOL_CAPACITY: usize = POOLS_AVAILABLE - 1;

/// Minimum allocation granularity and alignment.
pub const QUANTUM: usize = 8;

/// Largest request routed to the slab hierarchy; anything bigger takes the
/// large-allocation path.
pub const BLOCK_MAX_SIZE: usize = 1024;

/// Number of size classes, `0..CLASSES`.
pub const CLASSES: usize = BLOCK_MAX_SIZE / QUANTUM;

/// Maximum class gap across which a small `Realloc` shrink is silently
/// ignored.
pub const SHRINK_THRESHOLD: usize = 10;

/// Arena count below which empty arenas are retained rather than released
/// to the OS.
pub const MINIMUM_RESERVE: usize = 16;

/// Maps a requested size in `1..=BLOCK_MAX_SIZE` to its size class.
///
/// # Examples
///
/// ```
/// # use stratum::config::size_to_class;
/// assert_eq!(size_to_class(1), 0);
/// assert_eq!(size_to_class(8), 0);
/// assert_eq!(size_to_class(9), 1);
/// assert_eq!(size_to_class(1024), 127);
/// ```
#[inline]
pub const fn size_to_class(size: usize) -> usize {
    (size + QUANTUM - 1) / QUANTUM - 1
}

/// Maps a size class back to the block size it houses.
///
/// # Examples
///
/// ```
/// # use stratum::config::class_to_size;
/// assert_eq!(class_to_size(0), 8);
/// assert_eq!(class_to_size(127), 1024);
/// ```
#[inline]
pub const fn class_to_size(class: usize) -> usize {
    (class + 1) * QUANTUM
}
