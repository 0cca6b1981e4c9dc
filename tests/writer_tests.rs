//! Structured Buffer Writer Tests
//!
//! Tests for:
//! - BlockWriter<Std140>: array element stride of 16 for every scalar kind
//! - BlockWriter<Std430>: natural packing, struct spans
//! - IndexWriter: put_quad pattern and vertex cursor
//! - VertexWriter: attribute packing, colors, boundaries

use glam::{Mat3, Vec2, Vec3, Vec4};

use drawpack::pool::ScratchBuffer;
use drawpack::writer::{BlockWriter, IndexWriter, QUAD_INDICES, Std140, Std430, VertexWriter, pack_color};
use drawpack::IndexFormat;

fn std140() -> BlockWriter<Std140> {
    BlockWriter::new(ScratchBuffer::detached(0))
}

fn std430() -> BlockWriter<Std430> {
    BlockWriter::new(ScratchBuffer::detached(0))
}

fn word(bytes: &[u8], at: usize) -> [u8; 4] {
    [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]
}

// ============================================================================
// std140 arrays
// ============================================================================

#[test]
fn std140_array_elements_are_16_bytes_apart_for_every_scalar() {
    type Put = fn(&mut BlockWriter<Std140>, u32);
    let writers: [(&str, Put); 4] = [
        ("f32", |w, i| {
            w.put_f32(i as f32);
        }),
        ("i32", |w, i| {
            w.put_i32(i as i32);
        }),
        ("u32", |w, i| {
            w.put_u32(i);
        }),
        ("bool", |w, i| {
            w.put_bool(i % 2 == 1);
        }),
    ];

    for (name, put) in writers {
        for count in 1..=7u32 {
            let mut w = std140();
            w.begin_array();
            for i in 0..count {
                put(&mut w, i);
            }
            w.end_array();

            let bytes = w.as_bytes();
            assert_eq!(bytes.len() % 16, 0, "{name} x{count}: length not a multiple of 16");
            assert_eq!(bytes.len(), count as usize * 16, "{name} x{count}");

            // Each element occupies the first word of its 16-byte slot.
            let mut reference = std140();
            for i in 0..count {
                put(&mut reference, i);
                let expected = word(reference.as_bytes(), reference.position() - 4);
                assert_eq!(word(bytes, i as usize * 16), expected, "{name} element {i}");
            }
        }
    }
}

#[test]
fn std140_array_of_f64_pads_each_element() {
    let mut w = std140();
    w.begin_array().put_f64(1.0).put_f64(2.0).end_array();
    assert_eq!(w.position(), 32);
    assert_eq!(&w.as_bytes()[16..24], &2.0f64.to_le_bytes());
}

#[test]
fn std140_array_following_a_scalar_starts_on_16() {
    let mut w = std140();
    w.put_f32(9.0);
    w.begin_array().put_f32(1.0).put_f32(2.0).end_array();
    assert_eq!(w.position(), 48);
    assert_eq!(word(w.as_bytes(), 16), 1.0f32.to_le_bytes());
    assert_eq!(word(w.as_bytes(), 32), 2.0f32.to_le_bytes());
}

#[test]
fn std140_mat3_uses_padded_columns() {
    let mut w = std140();
    w.put_mat3(Mat3::IDENTITY);
    assert_eq!(w.position(), 48);
    assert_eq!(word(w.as_bytes(), 16 + 4), 1.0f32.to_le_bytes());
    assert_eq!(word(w.as_bytes(), 12), 0.0f32.to_le_bytes());
}

// ============================================================================
// Structs
// ============================================================================

#[test]
fn std140_struct_span_rounds_to_16() {
    let mut w = std140();
    w.begin_struct().put_f32(1.0).put_vec2(Vec2::ONE);
    let span = w.end_struct();
    assert_eq!(span.start, 0);
    assert_eq!(span.size(), 16);
    assert_eq!(w.struct_index(16), 0);

    w.begin_struct().put_vec3(Vec3::ONE).put_f32(2.0).put_f32(3.0);
    let span = w.end_struct();
    assert_eq!(span.start, 16);
    assert_eq!(span.size(), 32);
    assert!(w.is_balanced());
}

#[test]
fn std430_struct_aligns_to_widest_member() {
    let mut w = std430();
    w.put_f32(0.0);
    w.begin_struct().put_vec2(Vec2::ONE).put_f32(1.0);
    let span = w.end_struct();
    assert_eq!(span.start, 8);
    assert_eq!(span.size(), 16);
}

#[test]
fn std430_array_inside_struct_packs_naturally() {
    let mut w = std430();
    w.begin_struct();
    w.begin_array().put_f32(1.0).put_f32(2.0).put_f32(3.0).end_array();
    let span = w.end_struct();
    assert_eq!(span.size(), 12);
}

#[test]
fn open_scope_is_reported_unbalanced() {
    let mut w = std140();
    w.begin_array().put_vec4(Vec4::ONE);
    assert!(!w.is_balanced());
    w.end_array();
    assert!(w.is_balanced());
}

#[test]
#[should_panic(expected = "end_array without matching begin_array")]
fn end_array_without_begin_panics() {
    let mut w = std140();
    w.end_array();
}

#[test]
#[should_panic(expected = "end_array while a struct is open")]
fn interleaved_scopes_panic() {
    let mut w = std430();
    w.begin_array();
    w.begin_struct();
    w.end_array();
}

// ============================================================================
// IndexWriter
// ============================================================================

#[test]
fn put_quad_offsets_by_vertex_cursor_and_advances_by_four() {
    for format in [IndexFormat::U16, IndexFormat::U32] {
        let mut w = IndexWriter::new(ScratchBuffer::detached(0), format);
        w.advance_vertex_offset(10);
        for quad in 0..3u32 {
            let before = w.vertex_offset();
            let start = w.index_count() as usize;
            w.put_quad();
            assert_eq!(w.vertex_offset(), before + 4);

            let written = &w.to_u32()[start..];
            let expected: Vec<u32> = QUAD_INDICES.iter().map(|i| i + before).collect();
            assert_eq!(written, expected.as_slice(), "quad {quad} ({format:?})");
        }
        assert_eq!(w.index_count(), 18);
    }
}

#[test]
fn triangle_indices_are_relative_to_cursor() {
    let mut w = IndexWriter::new(ScratchBuffer::detached(0), IndexFormat::U32);
    w.put_triangle(0, 1, 2).advance_vertex_offset(3).put_triangle(0, 1, 2);
    assert_eq!(w.to_u32(), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn largest_u16_index_is_accepted() {
    let mut w = IndexWriter::new(ScratchBuffer::detached(0), IndexFormat::U16);
    w.advance_vertex_offset(u32::from(u16::MAX) - 1).put(1);
    assert_eq!(w.to_u32(), vec![u32::from(u16::MAX)]);
}

#[test]
#[should_panic(expected = "overflows a u16 index stream")]
fn u16_overflow_panics_instead_of_wrapping() {
    let mut w = IndexWriter::new(ScratchBuffer::detached(0), IndexFormat::U16);
    w.advance_vertex_offset(u32::from(u16::MAX)).put(1);
}

#[test]
#[should_panic(expected = "overflows u32")]
fn vertex_offset_overflow_panics() {
    let mut w = IndexWriter::new(ScratchBuffer::detached(0), IndexFormat::U32);
    w.advance_vertex_offset(u32::MAX).put(1);
}

// ============================================================================
// VertexWriter
// ============================================================================

#[test]
fn vertex_writer_counts_whole_vertices() {
    // position (12) + packed color (4)
    let mut w = VertexWriter::new(ScratchBuffer::detached(0), 16);
    w.put_vec3(Vec3::X).put_color(Vec4::ONE);
    w.put_vec3(Vec3::Y);
    assert_eq!(w.vertex_count(), 1);
    w.put_color_rgba8([255, 0, 0, 255]);
    assert_eq!(w.vertex_count(), 2);
    assert_eq!(w.byte_len(), 32);
    assert_eq!(&w.as_bytes()[12..16], &pack_color(Vec4::ONE).to_le_bytes());
}

#[test]
fn padding_is_zero_filled() {
    let mut w = VertexWriter::new(ScratchBuffer::detached(0), 8);
    w.put_f16(1.0).pad(6);
    assert_eq!(w.vertex_count(), 1);
    assert_eq!(&w.as_bytes()[2..], &[0u8; 6]);
}

#[test]
fn boundaries_record_vertex_counts() {
    let mut w = VertexWriter::new(ScratchBuffer::detached(0), 4);
    w.mark_primitive_boundary();
    for i in 0..5 {
        w.put_f32(i as f32);
    }
    w.mark_primitive_boundary();
    w.put_f32(9.0).put_f32(9.0);
    w.mark_primitive_boundary();
    assert_eq!(w.primitive_boundaries(), &[0, 5, 7]);
}
