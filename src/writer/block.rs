//! Uniform / Storage Block Writer
//!
//! Encodes values into a byte stream laid out by the GLSL `std140` or `std430`
//! rules, so the bytes match what a shader compiled against the same block
//! declaration reads.
//!
//! ```text
//!              std140                         std430
//!  float[3]    0 ....|16 ....|32 ....|48      0 |4 |8 |12
//!  struct S    start & size rounded to 16     start & size rounded to the
//!                                             largest member alignment
//!  mat3        3 columns × 16 bytes           3 columns × 16 bytes
//! ```
//!
//! Two stacks drive the layout: an "in-array" stack (`true` for an open array,
//! `false` for an open struct, so struct members inside an array pack normally)
//! and a struct-frame stack that records each open struct's start offset and
//! largest member alignment.
//!
//! Nesting misuse (`end_array` without `begin_array`, interleaved ends) is a
//! bookkeeping bug and panics.

use std::marker::PhantomData;

use glam::{IVec4, Mat3, Mat4, Vec2, Vec3, Vec4};
use smallvec::SmallVec;

use crate::pool::scratch::ScratchBuffer;

/// Selects the padding policy of a [`BlockWriter`].
pub trait BlockLayout: 'static {
    const NAME: &'static str;

    /// Whether array elements start on 16-byte boundaries.
    const PAD_ARRAY_ELEMENTS: bool;

    /// Final alignment of a struct whose widest member aligns to `max_member`.
    fn struct_alignment(max_member: usize) -> usize;

    /// Alignment applied at `begin_struct` before any member is known.
    fn struct_start_alignment() -> usize;
}

/// GLSL `std140` (uniform blocks).
#[derive(Debug, Clone, Copy, Default)]
pub struct Std140;

/// GLSL `std430` (shader storage blocks).
#[derive(Debug, Clone, Copy, Default)]
pub struct Std430;

impl BlockLayout for Std140 {
    const NAME: &'static str = "std140";
    const PAD_ARRAY_ELEMENTS: bool = true;

    #[inline]
    fn struct_alignment(max_member: usize) -> usize {
        max_member.max(16).next_multiple_of(16)
    }

    #[inline]
    fn struct_start_alignment() -> usize {
        16
    }
}

impl BlockLayout for Std430 {
    const NAME: &'static str = "std430";
    const PAD_ARRAY_ELEMENTS: bool = false;

    #[inline]
    fn struct_alignment(max_member: usize) -> usize {
        max_member.max(4)
    }

    #[inline]
    fn struct_start_alignment() -> usize {
        4
    }
}

/// Byte range covered by a closed struct, padding included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructSpan {
    pub start: usize,
    pub end: usize,
}

impl StructSpan {
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy)]
struct StructFrame {
    start: usize,
    /// Set once the first member has been placed (std430 start fix-up).
    placed: bool,
    max_align: usize,
    explicit_align: Option<usize>,
}

pub struct BlockWriter<L: BlockLayout> {
    buf: ScratchBuffer,
    in_array: SmallVec<[bool; 8]>,
    structs: SmallVec<[StructFrame; 8]>,
    _layout: PhantomData<L>,
}

impl<L: BlockLayout> BlockWriter<L> {
    #[must_use]
    pub fn new(buf: ScratchBuffer) -> Self {
        Self {
            buf,
            in_array: SmallVec::new(),
            structs: SmallVec::new(),
            _layout: PhantomData,
        }
    }

    // ========================================================================
    // Values
    // ========================================================================

    #[inline]
    pub fn put_f32(&mut self, v: f32) -> &mut Self {
        self.write_aligned(&v.to_le_bytes(), 4)
    }

    #[inline]
    pub fn put_i32(&mut self, v: i32) -> &mut Self {
        self.write_aligned(&v.to_le_bytes(), 4)
    }

    #[inline]
    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.write_aligned(&v.to_le_bytes(), 4)
    }

    /// GLSL `bool` occupies one 32-bit word.
    #[inline]
    pub fn put_bool(&mut self, v: bool) -> &mut Self {
        self.put_u32(u32::from(v))
    }

    #[inline]
    pub fn put_f64(&mut self, v: f64) -> &mut Self {
        self.write_aligned(&v.to_le_bytes(), 8)
    }

    #[inline]
    pub fn put_vec2(&mut self, v: Vec2) -> &mut Self {
        self.write_aligned(bytemuck::bytes_of(&v.to_array()), 8)
    }

    /// 12 bytes, aligned like a `vec4`.
    #[inline]
    pub fn put_vec3(&mut self, v: Vec3) -> &mut Self {
        self.write_aligned(bytemuck::bytes_of(&v.to_array()), 16)
    }

    #[inline]
    pub fn put_vec4(&mut self, v: Vec4) -> &mut Self {
        self.write_aligned(bytemuck::bytes_of(&v.to_array()), 16)
    }

    #[inline]
    pub fn put_ivec4(&mut self, v: IVec4) -> &mut Self {
        self.write_aligned(bytemuck::bytes_of(&v.to_array()), 16)
    }

    /// Three columns, each padded to 16 bytes (48 bytes total).
    pub fn put_mat3(&mut self, m: Mat3) -> &mut Self {
        let cols: [[f32; 4]; 3] = [
            m.x_axis.extend(0.0).to_array(),
            m.y_axis.extend(0.0).to_array(),
            m.z_axis.extend(0.0).to_array(),
        ];
        self.write_aligned(bytemuck::cast_slice(&cols), 16)
    }

    pub fn put_mat4(&mut self, m: Mat4) -> &mut Self {
        self.write_aligned(bytemuck::cast_slice(&m.to_cols_array()), 16)
    }

    /// Writes a `Pod` value whose declared block alignment is `align`.
    pub fn put_pod_aligned<T: bytemuck::Pod>(&mut self, v: &T, align: usize) -> &mut Self {
        self.write_aligned(bytemuck::bytes_of(v), align)
    }

    // ========================================================================
    // Arrays
    // ========================================================================

    pub fn begin_array(&mut self) -> &mut Self {
        self.in_array.push(true);
        self
    }

    /// # Panics
    ///
    /// Panics if the innermost open scope is not an array.
    pub fn end_array(&mut self) -> &mut Self {
        match self.in_array.last() {
            Some(true) => {}
            Some(false) => panic!("{}: end_array while a struct is open", L::NAME),
            None => panic!("{}: end_array without matching begin_array", L::NAME),
        }
        if L::PAD_ARRAY_ELEMENTS {
            self.buf.pad_to(16);
        }
        self.in_array.pop();
        self
    }

    // ========================================================================
    // Structs
    // ========================================================================

    /// Opens a struct aligned by the layout's rules.
    ///
    /// Under `std430` the final start offset is the aligned offset of the first
    /// member, which is only correct when that member has the struct's widest
    /// alignment. Use [`begin_struct_aligned`](Self::begin_struct_aligned) otherwise.
    pub fn begin_struct(&mut self) -> &mut Self {
        self.open_struct(L::struct_start_alignment(), None)
    }

    /// Opens a struct with an explicit alignment (start and size).
    pub fn begin_struct_aligned(&mut self, align: usize) -> &mut Self {
        let align = align.max(1);
        self.open_struct(align, Some(align))
    }

    /// Closes the innermost struct, padding its size to the struct alignment.
    ///
    /// # Panics
    ///
    /// Panics if the innermost open scope is not a struct.
    pub fn end_struct(&mut self) -> StructSpan {
        match self.in_array.last() {
            Some(false) => {}
            Some(true) => panic!("{}: end_struct while an array is open", L::NAME),
            None => panic!("{}: end_struct without matching begin_struct", L::NAME),
        }
        self.in_array.pop();
        let Some(frame) = self.structs.pop() else {
            panic!("{}: struct frame stack out of sync", L::NAME);
        };

        let align = frame
            .explicit_align
            .unwrap_or_else(|| L::struct_alignment(frame.max_align));
        self.buf.pad_to(align);

        if let Some(parent) = self.structs.last_mut() {
            parent.max_align = parent.max_align.max(align);
            if !parent.placed {
                parent.placed = true;
                parent.start = frame.start;
            }
        }

        StructSpan {
            start: frame.start,
            end: self.buf.len(),
        }
    }

    /// Zero-based index of the struct that just ended, for fixed-size structs
    /// written back to back: `position / struct_size - 1`.
    #[inline]
    #[must_use]
    pub fn struct_index(&self, struct_size: usize) -> usize {
        debug_assert!(struct_size > 0);
        (self.buf.len() / struct_size).saturating_sub(1)
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// `true` when every array and struct has been closed.
    #[inline]
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.in_array.is_empty()
    }

    // ─── Internals ────────────────────────────────────────────────────────

    fn open_struct(&mut self, align: usize, explicit_align: Option<usize>) -> &mut Self {
        if L::PAD_ARRAY_ELEMENTS && self.in_array.last() == Some(&true) {
            self.buf.pad_to(16);
        }
        self.buf.pad_to(align);
        self.in_array.push(false);
        self.structs.push(StructFrame {
            start: self.buf.len(),
            placed: explicit_align.is_some() || L::PAD_ARRAY_ELEMENTS,
            max_align: explicit_align.unwrap_or(0),
            explicit_align,
        });
        self
    }

    fn write_aligned(&mut self, bytes: &[u8], align: usize) -> &mut Self {
        if L::PAD_ARRAY_ELEMENTS && self.in_array.last() == Some(&true) {
            self.buf.pad_to(16);
        }
        self.buf.pad_to(align);

        if let Some(frame) = self.structs.last_mut() {
            frame.max_align = frame.max_align.max(align);
            if !frame.placed {
                frame.placed = true;
                frame.start = self.buf.len();
            }
        }

        self.buf.extend_from_slice(bytes);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn std140() -> BlockWriter<Std140> {
        BlockWriter::new(ScratchBuffer::detached(0))
    }

    fn std430() -> BlockWriter<Std430> {
        BlockWriter::new(ScratchBuffer::detached(0))
    }

    #[test]
    fn std140_pads_array_scalars_to_16() {
        let mut w = std140();
        w.begin_array().put_f32(1.0).put_f32(2.0).put_f32(3.0).end_array();
        assert_eq!(w.position(), 48);
        assert_eq!(&w.as_bytes()[16..20], &2.0f32.to_le_bytes());
    }

    #[test]
    fn std430_packs_array_scalars() {
        let mut w = std430();
        w.begin_array().put_f32(1.0).put_f32(2.0).put_f32(3.0).end_array();
        assert_eq!(w.position(), 12);
    }

    #[test]
    fn vec3_followed_by_scalar_shares_the_slot() {
        let mut w = std140();
        w.put_vec3(Vec3::ONE).put_f32(5.0);
        assert_eq!(w.position(), 16);
        assert_eq!(&w.as_bytes()[12..16], &5.0f32.to_le_bytes());
    }

    #[test]
    fn std140_struct_rounds_to_16() {
        let mut w = std140();
        w.put_f32(0.0);
        w.begin_struct();
        w.put_f32(1.0);
        let span = w.end_struct();
        assert_eq!(span, StructSpan { start: 16, end: 32 });
    }

    #[test]
    fn std430_struct_uses_widest_member() {
        let mut w = std430();
        w.put_f32(0.0);
        w.begin_struct();
        w.put_vec2(Vec2::ONE).put_f32(3.0);
        let span = w.end_struct();
        assert_eq!(span, StructSpan { start: 8, end: 24 });
    }

    #[test]
    fn struct_members_inside_std140_array_pack_normally() {
        let mut w = std140();
        w.begin_array();
        for i in 0..2 {
            w.begin_struct();
            w.put_f32(i as f32).put_f32(i as f32);
            w.end_struct();
        }
        w.end_array();
        assert_eq!(w.position(), 32);
        assert_eq!(w.struct_index(16), 1);
    }

    #[test]
    fn mat3_columns_are_padded() {
        let mut w = std430();
        w.put_mat3(Mat3::IDENTITY);
        assert_eq!(w.position(), 48);
        assert_eq!(&w.as_bytes()[16..20], &0.0f32.to_le_bytes());
        assert_eq!(&w.as_bytes()[20..24], &1.0f32.to_le_bytes());
    }

    #[test]
    #[should_panic(expected = "without matching begin_array")]
    fn unmatched_end_array_panics() {
        std140().end_array();
    }

    #[test]
    #[should_panic(expected = "end_array while a struct is open")]
    fn interleaved_scopes_panic() {
        let mut w = std430();
        w.begin_array().begin_struct();
        w.end_array();
    }
}
