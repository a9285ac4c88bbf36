//! Error type for the `Result`-shaped parts of the Stratum surface.
//!
//! The raw pointer surface (`Alloc`/`Free`/`Realloc`/`Calloc`, see
//! [`crate::memory`]) keeps its null-on-failure contract, since it backs
//! [`GlobalAlloc`](std::alloc::GlobalAlloc) and a `Result` return there
//! would just be unwrapped back into a pointer anyway. `StratumError` covers
//! the lifecycle entry points where an ergonomic `Result` is worth having.

use thiserror::Error;

/// Failure modes surfaced by the `Result`-returning parts of the API.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StratumError {
    /// The OS declined to map a new 256 KiB arena.
    #[error("failed to map a new arena from the operating system")]
    ArenaMapFailed,

    /// The system allocator declined a large (> 1024 byte) request.
    #[error("system allocator refused a large allocation of {size} bytes")]
    LargeAllocFailed {
        /// The requested size, in bytes.
        size: usize,
    },
}

/// Convenience alias for the above.
pub type StratumResult<T> = Result<T, StratumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_stable() {
        assert_eq!(
            StratumError::LargeAllocFailed { size: 4096 }.to_string(),
            "system allocator refused a large allocation of 4096 bytes"
        );
        assert_eq!(
            StratumError::ArenaMapFailed.to_string(),
            "failed to map a new arena from the operating system"
        );
    }
}
