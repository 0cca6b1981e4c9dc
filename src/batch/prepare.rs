//! Draw Batch Data Preparer
//!
//! Validates a [`DrawBatchDataHolder`] against its descriptor and is the only
//! place draw commands are created. Every failure here is a
//! [`ContractViolation`]: the holder was populated wrongly and retrying
//! cannot help.

use super::command::DrawCommand;
use super::descriptor::{DrawBatch, IndexFormat, Topology};
use super::holder::DrawBatchDataHolder;
use crate::errors::{ContractViolation, Result};
use crate::gpu::quad::QuadIndexBuffer;
use crate::writer::{BlockLayout, BlockWriter};

/// Where the indices of a prepared batch come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSource {
    /// Non-indexed draw.
    None,
    /// The holder's own index stream.
    Stream(IndexFormat),
    /// The shared quad index buffer, of which the first `index_count` are used.
    SharedQuads { index_count: u32 },
}

impl IndexSource {
    #[must_use]
    pub fn format(self) -> Option<IndexFormat> {
        match self {
            Self::None => None,
            Self::Stream(format) => Some(format),
            Self::SharedQuads { .. } => Some(IndexFormat::U32),
        }
    }
}

/// CPU-resident, validated batch data and its draw commands.
///
/// Owns the holder; its streams return to the scratch pool when this is
/// dropped or [`release`](Self::release)d.
#[derive(Debug)]
pub struct PreparedDrawBatchData {
    holder: DrawBatchDataHolder,
    commands: Vec<DrawCommand>,
    index_source: IndexSource,
    vertex_count: u32,
    instance_count: u32,
}

impl PreparedDrawBatchData {
    #[inline]
    #[must_use]
    pub fn batch(&self) -> &DrawBatch {
        self.holder.batch()
    }

    /// Never empty.
    #[inline]
    #[must_use]
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    #[inline]
    #[must_use]
    pub fn index_source(&self) -> IndexSource {
        self.index_source
    }

    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// `1` for batches without a per-instance layout.
    #[inline]
    #[must_use]
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    #[inline]
    #[must_use]
    pub fn vertex_bytes(&self) -> &[u8] {
        self.holder.vertex_stream().as_bytes()
    }

    /// The explicit index stream, if the batch has one.
    #[must_use]
    pub fn index_bytes(&self) -> Option<&[u8]> {
        match self.index_source {
            IndexSource::Stream(_) => self.holder.index_stream().map(|w| w.as_bytes()),
            _ => None,
        }
    }

    #[must_use]
    pub fn instance_bytes(&self) -> Option<&[u8]> {
        self.holder.instance_stream().map(|w| w.as_bytes())
    }

    pub fn uniform_blocks(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.holder.uniform_blocks().map(|(n, w)| (n, w.as_bytes()))
    }

    pub fn storage_blocks(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.holder.storage_blocks().map(|(n, w)| (n, w.as_bytes()))
    }

    /// Bytes across every stream, for statistics.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.vertex_bytes().len()
            + self.index_bytes().map_or(0, <[u8]>::len)
            + self.instance_bytes().map_or(0, <[u8]>::len)
            + self.uniform_blocks().map(|(_, b)| b.len()).sum::<usize>()
            + self.storage_blocks().map(|(_, b)| b.len()).sum::<usize>()
    }

    /// Returns the streams to the scratch pool.
    pub fn release(self) {
        drop(self);
    }

    // ─── Optimizer hooks ──────────────────────────────────────────────────

    pub(crate) fn replace_streams(&mut self, vertices: &[u8], indices: &[u32]) {
        self.holder.vertex_stream_mut().replace_bytes(vertices);
        if self.holder.index_stream_mut().is_none() {
            // Materialize the stream so the optimized indices have a home.
            let _ = self.holder.indices();
        }
        if let Some(stream) = self.holder.index_stream_mut() {
            stream.replace_u32(indices);
        }
        self.vertex_count = self.holder.vertex_stream().vertex_count();
        self.index_source = IndexSource::Stream(IndexFormat::U32);
        self.commands = vec![
            DrawCommand::elements(0, indices.len() as u32).with_instances(self.instance_count, 0),
        ];
    }
}

/// Validates `holder` and synthesizes its draw commands.
///
/// Quad batches without explicit indices grow `quads` as needed and draw
/// through it.
pub fn prepare(
    holder: DrawBatchDataHolder,
    quads: &mut QuadIndexBuffer,
) -> Result<PreparedDrawBatchData> {
    let batch = holder.batch().clone();
    let topology = batch.topology();

    // ─── Vertex stream ────────────────────────────────────────────────────

    let stride = batch.vertex_stride() as usize;
    let vertex_stream = holder.vertex_stream();
    if stride == 0 || vertex_stream.is_empty() {
        return Err(ContractViolation::EmptyBatch.into());
    }
    if vertex_stream.byte_len() % stride != 0 {
        return Err(ContractViolation::PartialVertex {
            len: vertex_stream.byte_len(),
            stride,
        }
        .into());
    }
    let vertex_count = vertex_stream.vertex_count();

    // ─── Blocks ───────────────────────────────────────────────────────────

    check_blocks_balanced(holder.uniform_blocks())?;
    check_blocks_balanced(holder.storage_blocks())?;

    // ─── Instances ────────────────────────────────────────────────────────

    let instance_count = match (batch.instance_layout(), holder.instance_stream()) {
        (Some(layout), Some(stream)) => {
            let stride = layout.stride() as usize;
            if stride == 0 || stream.byte_len() % stride != 0 {
                return Err(ContractViolation::PartialVertex {
                    len: stream.byte_len(),
                    stride,
                }
                .into());
            }
            stream.vertex_count()
        }
        (None, None) => 1,
        (Some(_), None) => return Err(ContractViolation::MissingInstances.into()),
        (None, Some(_)) => return Err(ContractViolation::UnexpectedInstances.into()),
    };

    // ─── Boundaries ───────────────────────────────────────────────────────

    let boundaries = vertex_stream.primitive_boundaries();
    if topology.is_connected() && boundaries.is_empty() {
        return Err(ContractViolation::MissingPrimitiveBoundaries(topology).into());
    }
    if !topology.is_connected() && !boundaries.is_empty() {
        return Err(ContractViolation::UnexpectedPrimitiveBoundaries(topology).into());
    }

    // ─── Indices and commands ─────────────────────────────────────────────

    let index_stream = holder.index_stream();
    let (index_source, commands) = if topology.is_indexed() {
        match index_stream {
            Some(stream) => (
                IndexSource::Stream(stream.format()),
                vec![DrawCommand::elements(0, stream.index_count())],
            ),
            None if topology == Topology::Quads => {
                if vertex_count % 4 != 0 {
                    return Err(ContractViolation::PartialQuad(vertex_count).into());
                }
                let quad_count = vertex_count / 4;
                quads.ensure_quads(quad_count);
                let index_count = quad_count * 6;
                (
                    IndexSource::SharedQuads { index_count },
                    vec![DrawCommand::elements(0, index_count)],
                )
            }
            None => return Err(ContractViolation::MissingIndices(topology).into()),
        }
    } else {
        if index_stream.is_some() {
            return Err(ContractViolation::UnexpectedIndices(topology).into());
        }
        let commands = if topology.is_connected() {
            runs_from_boundaries(boundaries, vertex_count)?
        } else {
            vec![DrawCommand::arrays(0, vertex_count)]
        };
        (IndexSource::None, commands)
    };

    let commands = commands
        .into_iter()
        .map(|c| c.with_instances(instance_count, 0))
        .collect();

    Ok(PreparedDrawBatchData {
        holder,
        commands,
        index_source,
        vertex_count,
        instance_count,
    })
}

/// One Arrays command per non-empty run between consecutive marks.
fn runs_from_boundaries(boundaries: &[u32], vertex_count: u32) -> Result<Vec<DrawCommand>> {
    let malformed = || ContractViolation::MalformedPrimitiveBoundaries(boundaries.to_vec());

    if boundaries.len() < 2 {
        return Err(malformed().into());
    }
    let mut commands = Vec::with_capacity(boundaries.len() - 1);
    for pair in boundaries.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        if end < start || end > vertex_count {
            return Err(malformed().into());
        }
        if end > start {
            commands.push(DrawCommand::arrays(start, end - start));
        }
    }
    if commands.is_empty() {
        return Err(malformed().into());
    }
    Ok(commands)
}

fn check_blocks_balanced<'a, L: BlockLayout>(
    blocks: impl Iterator<Item = (&'a str, &'a BlockWriter<L>)>,
) -> Result<()> {
    for (name, block) in blocks {
        if !block.is_balanced() {
            return Err(ContractViolation::UnbalancedBlock(name.to_owned()).into());
        }
    }
    Ok(())
}
