//! Thin wrappers over wgpu objects.

pub mod buffer;
pub mod quad;
pub mod vertex_array;

pub use buffer::GpuBuffer;
pub use quad::QuadIndexBuffer;
pub use vertex_array::{IndexBinding, VertexArray, VertexBinding};
