//! Draw Batch Data Holder
//!
//! Single-use accumulation state for one [`DrawBatch`]. Every stream is
//! borrowed from the scratch pool on first use; dropping the holder (or the
//! prepared data that owns it) hands them all back.

use rustc_hash::FxHashMap;

use super::descriptor::DrawBatch;
use crate::pool::scratch::ScratchPool;
use crate::writer::{BlockWriter, IndexWriter, Std140, Std430, VertexWriter};

const INITIAL_STREAM_BYTES: usize = 4096;
const INITIAL_BLOCK_BYTES: usize = 256;

pub struct DrawBatchDataHolder {
    batch: DrawBatch,
    scratch: ScratchPool,
    vertices: VertexWriter,
    indices: Option<IndexWriter>,
    instances: Option<VertexWriter>,
    uniforms: FxHashMap<String, BlockWriter<Std140>>,
    storage: FxHashMap<String, BlockWriter<Std430>>,
}

impl DrawBatchDataHolder {
    #[must_use]
    pub fn new(scratch: &ScratchPool, batch: DrawBatch) -> Self {
        let stride = batch.vertex_stride() as usize;
        Self {
            vertices: VertexWriter::new(scratch.acquire(INITIAL_STREAM_BYTES), stride),
            batch,
            scratch: scratch.clone(),
            indices: None,
            instances: None,
            uniforms: FxHashMap::default(),
            storage: FxHashMap::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn batch(&self) -> &DrawBatch {
        &self.batch
    }

    // ─── Streams ──────────────────────────────────────────────────────────

    #[inline]
    pub fn vertices(&mut self) -> &mut VertexWriter {
        &mut self.vertices
    }

    /// The index stream, in the descriptor's index format.
    pub fn indices(&mut self) -> &mut IndexWriter {
        let format = self.batch.index_format();
        let scratch = &self.scratch;
        self.indices
            .get_or_insert_with(|| IndexWriter::new(scratch.acquire(INITIAL_STREAM_BYTES), format))
    }

    /// The per-instance stream, strided by the descriptor's instance layout.
    pub fn instances(&mut self) -> &mut VertexWriter {
        let stride = self
            .batch
            .instance_layout()
            .map_or(0, |layout| layout.stride() as usize);
        let scratch = &self.scratch;
        self.instances
            .get_or_insert_with(|| VertexWriter::new(scratch.acquire(INITIAL_STREAM_BYTES), stride))
    }

    /// The `std140` uniform block bound under `name`.
    pub fn uniform_block(&mut self, name: &str) -> &mut BlockWriter<Std140> {
        let scratch = &self.scratch;
        self.uniforms
            .entry(name.to_owned())
            .or_insert_with(|| BlockWriter::new(scratch.acquire(INITIAL_BLOCK_BYTES)))
    }

    /// The `std430` storage block bound under `name`.
    pub fn storage_block(&mut self, name: &str) -> &mut BlockWriter<Std430> {
        let scratch = &self.scratch;
        self.storage
            .entry(name.to_owned())
            .or_insert_with(|| BlockWriter::new(scratch.acquire(INITIAL_BLOCK_BYTES)))
    }

    // ─── Read access for the preparer ─────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn vertex_stream(&self) -> &VertexWriter {
        &self.vertices
    }

    /// The index stream if anything was written to it.
    #[must_use]
    pub fn index_stream(&self) -> Option<&IndexWriter> {
        self.indices.as_ref().filter(|w| !w.is_empty())
    }

    /// The instance stream if anything was written to it.
    #[must_use]
    pub fn instance_stream(&self) -> Option<&VertexWriter> {
        self.instances.as_ref().filter(|w| !w.is_empty())
    }

    pub fn uniform_blocks(&self) -> impl Iterator<Item = (&str, &BlockWriter<Std140>)> {
        self.uniforms.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn storage_blocks(&self) -> impl Iterator<Item = (&str, &BlockWriter<Std430>)> {
        self.storage.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn vertex_stream_mut(&mut self) -> &mut VertexWriter {
        &mut self.vertices
    }

    pub(crate) fn index_stream_mut(&mut self) -> Option<&mut IndexWriter> {
        self.indices.as_mut()
    }
}

impl std::fmt::Debug for DrawBatchDataHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawBatchDataHolder")
            .field("batch", &self.batch)
            .field("vertices", &self.vertices.vertex_count())
            .field("indices", &self.indices.as_ref().map(IndexWriter::index_count))
            .field("instances", &self.instances.as_ref().map(VertexWriter::vertex_count))
            .field("uniform_blocks", &self.uniforms.len())
            .field("storage_blocks", &self.storage.len())
            .finish()
    }
}
