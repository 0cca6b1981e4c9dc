//! Byte-range allocation that does not own GPU memory.

pub mod arena;

pub use arena::{ArenaAllocator, ArenaExtent};
