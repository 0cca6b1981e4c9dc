//! Draw batches: descriptor, CPU accumulation, preparation, optimization,
//! upload and multi-draw packing.
//!
//! ```text
//!  DrawBatch ──► DrawBatchDataHolder ──prepare──► PreparedDrawBatchData
//!                                                     │ (optimize)
//!                        upload_temporary / upload_persistent
//!                                                     ▼
//!                                           UploadedDrawBatchData ──► draw
//!                                                     │
//!                                          MultiDrawBuilder::upload_buffer
//! ```

pub mod command;
pub mod descriptor;
pub mod holder;
pub mod multi_draw;
pub mod optimize;
pub mod prepare;
pub mod upload;

pub use command::{DrawCommand, DrawIndexedIndirectArgs, DrawIndirectArgs, encode_indirect, indirect_stride};
pub use descriptor::{
    AttributeTarget, DrawBatch, DrawBatchBuilder, IndexFormat, OwnedVertexBufferLayout, PassHook,
    ProgramId, ScalarType, Topology, VertexAttribute, VertexLayout,
};
pub use holder::DrawBatchDataHolder;
pub use multi_draw::{CommandTable, IndexMode, MultiDrawBuilder, SubMeshId, SubMeshRecord};
pub use optimize::{OptimizeReport, optimize};
pub use prepare::{IndexSource, PreparedDrawBatchData, prepare};
pub use upload::{BlockBuffer, IndirectCommands, Residency, UploadedDrawBatchData};
