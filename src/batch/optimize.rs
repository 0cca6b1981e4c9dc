//! Draw Batch Data Optimizer
//!
//! Optional pass over a prepared triangle batch:
//!
//! 1. deduplicate bitwise-identical vertices (whole stride), in index order
//! 2. rewrite both streams through that remap
//! 3. reorder triangles for post-transform cache locality (meshopt)
//! 4. reorder vertex storage to match first use (meshopt)
//!
//! Indexed input must use `u32` indices. The result always has an explicit
//! `u32` index stream, so Arrays batches come out as an equivalent Elements
//! command.

use rustc_hash::{FxHashMap, FxHashSet};

use super::prepare::{IndexSource, PreparedDrawBatchData};
use crate::batch::descriptor::IndexFormat;
use crate::errors::{ContractViolation, Result};
use crate::writer::QUAD_INDICES;

const UNUSED: u32 = u32::MAX;

/// What the optimizer did to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeReport {
    pub original_vertices: u32,
    pub unique_vertices: u32,
    pub index_count: u32,
}

/// Optimizes `prepared` in place.
pub fn optimize(prepared: &mut PreparedDrawBatchData) -> Result<OptimizeReport> {
    if prepared.commands().len() != 1 {
        return Err(ContractViolation::NotOptimizable("more than one draw command").into());
    }
    if !prepared.batch().topology().is_triangles() {
        return Err(ContractViolation::NotOptimizable("not a triangle topology").into());
    }

    let original_vertices = prepared.vertex_count();
    let indices = source_indices(prepared)?;
    if indices.len() % 3 != 0 {
        return Err(ContractViolation::NotOptimizable("index count is not a multiple of 3").into());
    }
    if indices.iter().any(|&i| i >= original_vertices) {
        return Err(ContractViolation::NotOptimizable("index out of range").into());
    }

    let stride = prepared.batch().vertex_stride() as usize;

    // 1 + 2: dedupe and rewrite
    let (unique_bytes, deduped_indices) = {
        let vertices = prepared.vertex_bytes();
        let mut lookup: FxHashMap<&[u8], u32> = FxHashMap::default();
        let mut unique_bytes = Vec::with_capacity(vertices.len());
        let mut deduped = Vec::with_capacity(indices.len());
        for &index in &indices {
            let start = index as usize * stride;
            let vertex = &vertices[start..start + stride];
            let next = lookup.len() as u32;
            let id = *lookup.entry(vertex).or_insert_with(|| {
                unique_bytes.extend_from_slice(vertex);
                next
            });
            deduped.push(id);
        }
        (unique_bytes, deduped)
    };
    let unique = unique_bytes.len() / stride;

    // 3: vertex cache
    let cache_ordered = meshopt::optimize_vertex_cache(&deduped_indices, unique);

    // 4: vertex fetch
    let fetch_remap = meshopt::optimize_vertex_fetch_remap(&cache_ordered, unique);
    let fetched = fetch_remap.iter().filter(|&&r| r != UNUSED).count();
    let mut final_vertices = vec![0u8; fetched * stride];
    for (old, &new) in fetch_remap.iter().enumerate() {
        if new != UNUSED {
            let (dst, src) = (new as usize * stride, old * stride);
            final_vertices[dst..dst + stride].copy_from_slice(&unique_bytes[src..src + stride]);
        }
    }
    let final_indices: Vec<u32> = cache_ordered
        .iter()
        .map(|&i| fetch_remap[i as usize])
        .collect();

    let referenced = final_indices.iter().collect::<FxHashSet<_>>().len();
    if referenced != unique || fetched != unique {
        return Err(ContractViolation::UnusedVertices { unique, referenced }.into());
    }

    prepared.replace_streams(&final_vertices, &final_indices);

    let report = OptimizeReport {
        original_vertices,
        unique_vertices: unique as u32,
        index_count: final_indices.len() as u32,
    };
    log::debug!(
        "Optimized batch {:?}: {} -> {} vertices, {} indices",
        prepared.batch().label(),
        report.original_vertices,
        report.unique_vertices,
        report.index_count
    );
    Ok(report)
}

/// The batch's index list, synthesized for non-indexed and quad batches.
fn source_indices(prepared: &PreparedDrawBatchData) -> Result<Vec<u32>> {
    match prepared.index_source() {
        IndexSource::Stream(IndexFormat::U32) => Ok(prepared
            .index_bytes()
            .map(|bytes| {
                bytes
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect()
            })
            .unwrap_or_default()),
        IndexSource::Stream(IndexFormat::U16) => {
            Err(ContractViolation::NotOptimizable("index type is not 32-bit").into())
        }
        IndexSource::SharedQuads { index_count } => Ok((0..index_count / 6)
            .flat_map(|quad| QUAD_INDICES.map(|i| quad * 4 + i))
            .collect()),
        IndexSource::None => Ok((0..prepared.vertex_count()).collect()),
    }
}
