//! The arena/pool/block slab hierarchy: page-aligned regions obtained from
//! the OS, carved into fixed-size-class pools, carved into blocks.

pub(crate) mod arena;
pub(crate) mod pool;
