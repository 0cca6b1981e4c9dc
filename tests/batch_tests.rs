//! Draw Batch Preparation Tests
//!
//! Tests for:
//! - prepare(): command synthesis per topology (quads, strips, indexed, plain)
//! - prepare(): every holder/descriptor contract check
//! - optimize(): dedupe, remap, `unique == referenced` post-condition
//! - DrawCommand / encode_indirect binary layout

mod common;

use glam::Vec3;

use drawpack::batch::{
    DrawBatch, DrawBatchDataHolder, DrawCommand, IndexFormat, IndexSource, PreparedDrawBatchData, ProgramId,
    Topology, VertexAttribute, VertexLayout, encode_indirect, optimize, prepare,
};
use drawpack::gpu::QuadIndexBuffer;
use drawpack::{ContractViolation, Error};

use common::{batch, position_layout, scratch_pool};

fn run(holder: DrawBatchDataHolder) -> drawpack::Result<PreparedDrawBatchData> {
    let mut quads = QuadIndexBuffer::new(4);
    prepare(holder, &mut quads)
}

fn violation(result: drawpack::Result<PreparedDrawBatchData>) -> ContractViolation {
    match result {
        Err(Error::Contract(violation)) => violation,
        Err(other) => panic!("expected a contract violation, got {other}"),
        Ok(prepared) => panic!("expected a contract violation, got {:?}", prepared.commands()),
    }
}

fn put_points(holder: &mut DrawBatchDataHolder, count: u32) {
    for i in 0..count {
        holder.vertices().put_vec3(Vec3::new(i as f32, 0.0, 0.0));
    }
}

fn index_values(prepared: &PreparedDrawBatchData) -> Vec<u32> {
    prepared
        .index_bytes()
        .expect("index stream")
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

// ============================================================================
// Command synthesis
// ============================================================================

#[test]
fn quads_without_indices_use_shared_quad_buffer() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::Quads));
    put_points(&mut holder, 4);

    let prepared = run(holder).unwrap();
    assert_eq!(prepared.commands(), &[DrawCommand::elements(0, 6)]);
    assert_eq!(prepared.index_source(), IndexSource::SharedQuads { index_count: 6 });
    assert!(prepared.index_bytes().is_none());
}

#[test]
fn many_quads_grow_the_shared_buffer() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::Quads));
    put_points(&mut holder, 4 * 10);

    let mut quads = QuadIndexBuffer::new(4);
    let prepared = prepare(holder, &mut quads).unwrap();
    assert!(quads.quad_capacity() >= 10);
    assert_eq!(prepared.commands()[0].count(), 60);
    assert_eq!(&quads.indices()[54..60], &[36, 37, 38, 38, 39, 36]);
}

#[test]
fn strip_boundaries_become_array_runs() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::LineStrip));
    holder.vertices().mark_primitive_boundary();
    for run in [5, 4, 3] {
        put_points(&mut holder, run);
        holder.vertices().mark_primitive_boundary();
    }
    assert_eq!(holder.vertex_stream().primitive_boundaries(), &[0, 5, 9, 12]);

    let prepared = run(holder).unwrap();
    assert_eq!(
        prepared.commands(),
        &[
            DrawCommand::arrays(0, 5),
            DrawCommand::arrays(5, 4),
            DrawCommand::arrays(9, 3),
        ]
    );
    assert_eq!(prepared.index_source(), IndexSource::None);
}

#[test]
fn zero_length_runs_are_skipped() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::TriangleStrip));
    holder.vertices().mark_primitive_boundary();
    holder.vertices().mark_primitive_boundary();
    put_points(&mut holder, 4);
    holder.vertices().mark_primitive_boundary();

    let prepared = run(holder).unwrap();
    assert_eq!(prepared.commands(), &[DrawCommand::arrays(0, 4)]);
}

#[test]
fn explicit_indices_produce_one_elements_command() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::IndexedTriangles));
    put_points(&mut holder, 4);
    holder.indices().put_quad();

    let prepared = run(holder).unwrap();
    assert_eq!(prepared.commands(), &[DrawCommand::elements(0, 6)]);
    assert_eq!(prepared.index_source(), IndexSource::Stream(IndexFormat::U32));
    assert_eq!(index_values(&prepared), vec![0, 1, 2, 2, 3, 0]);
}

#[test]
fn plain_topology_draws_every_vertex() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::Points));
    put_points(&mut holder, 7);

    let prepared = run(holder).unwrap();
    assert_eq!(prepared.commands(), &[DrawCommand::arrays(0, 7)]);
    assert_eq!(prepared.vertex_count(), 7);
    assert_eq!(prepared.instance_count(), 1);
}

#[test]
fn instance_count_is_applied_to_commands() {
    let pool = scratch_pool();
    let instanced = DrawBatch::builder(ProgramId(2), Topology::Triangles, position_layout())
        .instance_layout(VertexLayout::new(vec![VertexAttribute::float32("offset", 2)]))
        .build();
    let mut holder = DrawBatchDataHolder::new(&pool, instanced);
    put_points(&mut holder, 3);
    for i in 0..5 {
        holder.instances().put_tex_coord(i as f32, 0.0);
    }

    let prepared = run(holder).unwrap();
    assert_eq!(prepared.instance_count(), 5);
    assert_eq!(prepared.commands()[0].instance_count(), 5);
    assert_eq!(prepared.instance_bytes().map(<[u8]>::len), Some(40));
}

#[test]
fn dropping_prepared_data_returns_streams() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::IndexedTriangles));
    put_points(&mut holder, 3);
    holder.indices().put_triangle(0, 1, 2);
    holder.uniform_block("Globals").put_f32(1.0);
    assert_eq!(pool.in_use_count(), 3);

    let prepared = run(holder).unwrap();
    prepared.release();
    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(pool.free_count(), 3);
}

// ============================================================================
// Contract checks
// ============================================================================

#[test]
fn empty_holder_is_rejected() {
    let pool = scratch_pool();
    let holder = DrawBatchDataHolder::new(&pool, batch(Topology::Triangles));
    assert_eq!(violation(run(holder)), ContractViolation::EmptyBatch);
}

#[test]
fn partial_vertex_is_rejected() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::Points));
    put_points(&mut holder, 2);
    holder.vertices().put_f32(1.0);
    assert_eq!(
        violation(run(holder)),
        ContractViolation::PartialVertex { len: 28, stride: 12 }
    );
}

#[test]
fn indexed_topology_without_indices_is_rejected() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::IndexedLines));
    put_points(&mut holder, 2);
    assert_eq!(
        violation(run(holder)),
        ContractViolation::MissingIndices(Topology::IndexedLines)
    );
}

#[test]
fn indices_on_plain_topology_are_rejected() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::Triangles));
    put_points(&mut holder, 3);
    holder.indices().put_triangle(0, 1, 2);
    assert_eq!(
        violation(run(holder)),
        ContractViolation::UnexpectedIndices(Topology::Triangles)
    );
}

#[test]
fn instance_layout_without_instances_is_rejected() {
    let pool = scratch_pool();
    let instanced = DrawBatch::builder(ProgramId(2), Topology::Points, position_layout())
        .instance_layout(VertexLayout::new(vec![VertexAttribute::float32("size", 1)]))
        .build();
    let mut holder = DrawBatchDataHolder::new(&pool, instanced);
    put_points(&mut holder, 1);
    assert_eq!(violation(run(holder)), ContractViolation::MissingInstances);
}

#[test]
fn instances_without_layout_are_rejected() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::Points));
    put_points(&mut holder, 1);
    holder.instances().put_f32(1.0);
    assert_eq!(violation(run(holder)), ContractViolation::UnexpectedInstances);
}

#[test]
fn strip_without_boundaries_is_rejected() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::TriangleStrip));
    put_points(&mut holder, 4);
    assert_eq!(
        violation(run(holder)),
        ContractViolation::MissingPrimitiveBoundaries(Topology::TriangleStrip)
    );
}

#[test]
fn boundaries_on_unconnected_topology_are_rejected() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::Lines));
    put_points(&mut holder, 2);
    holder.vertices().mark_primitive_boundary();
    assert_eq!(
        violation(run(holder)),
        ContractViolation::UnexpectedPrimitiveBoundaries(Topology::Lines)
    );
}

#[test]
fn single_boundary_is_malformed() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::LineStrip));
    put_points(&mut holder, 3);
    holder.vertices().mark_primitive_boundary();
    assert_eq!(
        violation(run(holder)),
        ContractViolation::MalformedPrimitiveBoundaries(vec![3])
    );
}

#[test]
fn quads_need_whole_quads() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::Quads));
    put_points(&mut holder, 6);
    assert_eq!(violation(run(holder)), ContractViolation::PartialQuad(6));
}

#[test]
fn open_block_scope_is_rejected() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::Points));
    put_points(&mut holder, 1);
    holder.uniform_block("Lights").begin_array().put_f32(1.0);
    assert_eq!(
        violation(run(holder)),
        ContractViolation::UnbalancedBlock("Lights".to_owned())
    );
}

// ============================================================================
// Optimizer
// ============================================================================

fn assert_every_vertex_referenced(prepared: &PreparedDrawBatchData) {
    let mut referenced = index_values(prepared);
    referenced.sort_unstable();
    referenced.dedup();
    let unique = prepared.vertex_count();
    assert_eq!(referenced.len() as u32, unique);
    assert_eq!(referenced, (0..unique).collect::<Vec<_>>());
}

#[test]
fn optimizer_merges_duplicate_vertices() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::Triangles));
    // Two triangles sharing the edge (b, c), written without indices.
    let (a, b, c, d) = (Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE);
    for v in [a, b, c, c, b, d] {
        holder.vertices().put_vec3(v);
    }
    let mut prepared = run(holder).unwrap();

    let report = optimize(&mut prepared).unwrap();
    assert_eq!(report.original_vertices, 6);
    assert_eq!(report.unique_vertices, 4);
    assert_eq!(report.index_count, 6);
    assert_eq!(prepared.index_source(), IndexSource::Stream(IndexFormat::U32));
    assert_eq!(prepared.commands(), &[DrawCommand::elements(0, 6)]);
    assert_eq!(prepared.vertex_bytes().len(), 4 * 12);
    assert_every_vertex_referenced(&prepared);
}

#[test]
fn optimizer_drops_unreferenced_vertices() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::IndexedTriangles));
    put_points(&mut holder, 6);
    holder.indices().put_triangle(4, 2, 0).put_triangle(0, 2, 5);
    let mut prepared = run(holder).unwrap();

    let report = optimize(&mut prepared).unwrap();
    assert_eq!(report.unique_vertices, 4);
    assert_eq!(prepared.vertex_count(), 4);
    assert_every_vertex_referenced(&prepared);
}

#[test]
fn optimizer_rejects_16_bit_indices() {
    let pool = scratch_pool();
    let indexed = DrawBatch::builder(ProgramId(3), Topology::IndexedTriangles, position_layout())
        .index_format(IndexFormat::U16)
        .build();
    let mut holder = DrawBatchDataHolder::new(&pool, indexed);
    put_points(&mut holder, 3);
    holder.indices().put_triangle(0, 1, 2);
    let mut prepared = run(holder).unwrap();

    assert!(matches!(
        optimize(&mut prepared),
        Err(Error::Contract(ContractViolation::NotOptimizable(_)))
    ));
    assert_eq!(prepared.index_source(), IndexSource::Stream(IndexFormat::U16));
    assert_eq!(prepared.vertex_count(), 3);
}

#[test]
fn optimizer_expands_shared_quads() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::Quads));
    // Two quads sharing their middle edge.
    let corners = [
        [0.0, 0.0],
        [1.0, 0.0],
        [1.0, 1.0],
        [0.0, 1.0],
        [1.0, 0.0],
        [2.0, 0.0],
        [2.0, 1.0],
        [1.0, 1.0],
    ];
    for [x, y] in corners {
        holder.vertices().put_vec3(Vec3::new(x, y, 0.0));
    }
    let mut prepared = run(holder).unwrap();

    let report = optimize(&mut prepared).unwrap();
    assert_eq!(report.unique_vertices, 6);
    assert_eq!(report.index_count, 12);
    assert_every_vertex_referenced(&prepared);
}

#[test]
fn optimizer_rejects_strips() {
    let pool = scratch_pool();
    let mut holder = DrawBatchDataHolder::new(&pool, batch(Topology::LineStrip));
    holder.vertices().mark_primitive_boundary();
    put_points(&mut holder, 3);
    holder.vertices().mark_primitive_boundary();
    let mut prepared = run(holder).unwrap();

    assert!(matches!(
        optimize(&mut prepared),
        Err(Error::Contract(ContractViolation::NotOptimizable(_)))
    ));
}

// ============================================================================
// Indirect encoding
// ============================================================================

#[test]
fn indirect_records_follow_wgpu_layout() {
    let commands = [
        DrawCommand::elements(6, 12).rebased(100, 0),
        DrawCommand::elements(0, 3).with_instances(2, 1),
    ];
    let (bytes, indexed) = encode_indirect(&commands).unwrap();
    assert!(indexed);
    assert_eq!(bytes.len(), 40);

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(&words[..5], &[12, 1, 6, 100, 0]);
    assert_eq!(&words[5..], &[3, 2, 0, 0, 1]);
}

#[test]
fn mixed_command_kinds_cannot_be_encoded() {
    let commands = [DrawCommand::arrays(0, 3), DrawCommand::elements(0, 3)];
    assert!(matches!(
        encode_indirect(&commands),
        Err(Error::Contract(ContractViolation::MixedCommands))
    ));
}
