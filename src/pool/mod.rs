//! Frame-scoped pools and caches.
//!
//! Every pool sweeps exactly once per frame boundary
//! ([`RenderContext::end_frame`](crate::context::RenderContext::end_frame)),
//! never in the middle of a frame.

pub mod cache;
pub mod gpu_buffer;
pub mod ledger;
pub mod sampler;
pub mod scratch;
pub mod vertex_array;

pub use cache::{CacheValue, IdleCache};
pub use gpu_buffer::{BufferClass, GpuBufferPools, PooledBuffer};
pub use ledger::{Lease, PoolItem, PoolStats, ResourcePool, WRITE_OFF_GRACE_SWEEPS};
pub use sampler::{SamplerCache, SamplerKey};
pub use scratch::{ScratchBuffer, ScratchPool};
pub use vertex_array::{SharedVertexBuffer, VertexArrayCache};
