//! Vertex Stream Writer
//!
//! Appends fixed-format values in the order the caller declares them. The
//! writer does not validate values against the [`VertexLayout`](crate::batch::VertexLayout);
//! it only knows the stride, so the preparer can count whole vertices.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use half::f16;

use crate::pool::scratch::ScratchBuffer;

/// Packs a linear RGBA color into four normalized bytes (R in the lowest byte).
#[inline]
#[must_use]
pub fn pack_color(color: Vec4) -> u32 {
    let c = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    u32::from_le_bytes([c.x as u8, c.y as u8, c.z as u8, c.w as u8])
}

pub struct VertexWriter {
    buf: ScratchBuffer,
    stride: usize,
    boundaries: Vec<u32>,
}

impl VertexWriter {
    #[must_use]
    pub fn new(buf: ScratchBuffer, stride: usize) -> Self {
        Self {
            buf,
            stride,
            boundaries: Vec::new(),
        }
    }

    // ── Scalars ────────────────────────────────────────────────────────────

    #[inline]
    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.extend_from_slice(&[v]);
        self
    }

    #[inline]
    pub fn put_i8(&mut self, v: i8) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    #[inline]
    pub fn put_u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    #[inline]
    pub fn put_i16(&mut self, v: i16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    #[inline]
    pub fn put_u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    #[inline]
    pub fn put_i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    #[inline]
    pub fn put_f32(&mut self, v: f32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    #[inline]
    pub fn put_f64(&mut self, v: f64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Writes `v` as an IEEE half-precision float.
    #[inline]
    pub fn put_f16(&mut self, v: f32) -> &mut Self {
        self.buf.extend_from_slice(&f16::from_f32(v).to_le_bytes());
        self
    }

    // ── Composite values ───────────────────────────────────────────────────

    /// Writes a packed RGBA8 color (4 bytes).
    #[inline]
    pub fn put_color(&mut self, color: Vec4) -> &mut Self {
        self.put_u32(pack_color(color))
    }

    #[inline]
    pub fn put_color_rgba8(&mut self, rgba: [u8; 4]) -> &mut Self {
        self.buf.extend_from_slice(&rgba);
        self
    }

    #[inline]
    pub fn put_tex_coord(&mut self, u: f32, v: f32) -> &mut Self {
        self.put_f32(u).put_f32(v)
    }

    #[inline]
    pub fn put_vec2(&mut self, v: Vec2) -> &mut Self {
        self.put_f32(v.x).put_f32(v.y)
    }

    #[inline]
    pub fn put_vec3(&mut self, v: Vec3) -> &mut Self {
        self.put_f32(v.x).put_f32(v.y).put_f32(v.z)
    }

    #[inline]
    pub fn put_vec4(&mut self, v: Vec4) -> &mut Self {
        self.put_f32(v.x).put_f32(v.y).put_f32(v.z).put_f32(v.w)
    }

    /// Column-major, tightly packed (36 bytes).
    pub fn put_mat3(&mut self, m: Mat3) -> &mut Self {
        self.buf
            .extend_from_slice(bytemuck::cast_slice(&m.to_cols_array()));
        self
    }

    /// Column-major (64 bytes).
    pub fn put_mat4(&mut self, m: Mat4) -> &mut Self {
        self.buf
            .extend_from_slice(bytemuck::cast_slice(&m.to_cols_array()));
        self
    }

    #[inline]
    pub fn put_pod<T: bytemuck::Pod>(&mut self, v: &T) -> &mut Self {
        self.buf.extend_from_slice(bytemuck::bytes_of(v));
        self
    }

    #[inline]
    pub fn put_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// Appends `count` zero bytes, e.g. for declared attribute padding.
    #[inline]
    pub fn pad(&mut self, count: usize) -> &mut Self {
        self.buf.pad(count);
        self
    }

    // ── Primitive boundaries ───────────────────────────────────────────────

    /// Records the current vertex count as a boundary between connected
    /// primitives (strips). Mark the start of the first run and the end of the
    /// last one: marks `{0, 5, 9}` describe the runs `0..5` and `5..9`.
    pub fn mark_primitive_boundary(&mut self) -> &mut Self {
        let at = self.vertex_count();
        self.boundaries.push(at);
        self
    }

    #[inline]
    #[must_use]
    pub fn primitive_boundaries(&self) -> &[u32] {
        &self.boundaries
    }

    // ── Inspection ─────────────────────────────────────────────────────────

    /// Number of complete vertices written.
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        if self.stride == 0 {
            0
        } else {
            (self.buf.len() / self.stride) as u32
        }
    }

    #[inline]
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }

    #[inline]
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn replace_bytes(&mut self, data: &[u8]) {
        self.buf.replace(data);
        self.boundaries.clear();
    }
}
