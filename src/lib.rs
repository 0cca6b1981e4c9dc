//! # drawpack
//!
//! A CPU-to-GPU draw-batch pipeline on top of wgpu.
//!
//! Callers describe a draw once with a [`DrawBatch`], stream vertices,
//! indices, instances and shader blocks into a [`DrawBatchDataHolder`],
//! [`prepare`](RenderContext::prepare) it into draw commands, and upload it
//! either for one frame or for good. Sub-meshes sharing a descriptor can be
//! packed into one buffer pair with a [`MultiDrawBuilder`] and drawn with a
//! single indirect call.
//!
//! All GPU state lives in one [`RenderContext`] bound to the thread that
//! created it. Other threads queue work through a
//! [`RenderThreadHandle`](deferred::RenderThreadHandle).

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod batch;
pub mod context;
pub mod deferred;
pub mod errors;
pub mod gpu;
pub mod memory;
pub mod pool;
pub mod settings;
pub mod writer;

pub use batch::{
    DrawBatch, DrawBatchDataHolder, DrawCommand, IndexFormat, MultiDrawBuilder, PreparedDrawBatchData,
    SubMeshId, Topology, UploadedDrawBatchData, VertexAttribute, VertexLayout,
};
pub use context::{FrameStats, RenderContext, RenderThread};
pub use deferred::{CancellationToken, Completion, RenderThreadHandle};
pub use errors::{ContractViolation, Error, Result};
pub use memory::{ArenaAllocator, ArenaExtent};
pub use settings::{ArenaSettings, PipelineSettings, PoolSettings};
pub use writer::{BlockWriter, IndexWriter, Std140, Std430, VertexWriter};
