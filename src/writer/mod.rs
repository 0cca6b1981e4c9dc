//! Append-only encoders for the streams a batch is built from.

pub mod block;
pub mod index;
pub mod vertex;

pub use block::{BlockLayout, BlockWriter, Std140, Std430, StructSpan};
pub use index::{IndexWriter, QUAD_INDICES};
pub use vertex::{VertexWriter, pack_color};
