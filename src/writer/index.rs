//! Index Stream Writer
//!
//! Indices are written relative to a running vertex offset, so shapes can be
//! described with local indices (`0..4` for a quad) while the stream ends up
//! referencing the vertices written earlier into the same holder.

use crate::batch::descriptor::IndexFormat;
use crate::pool::scratch::ScratchBuffer;

/// Local indices of one quad, two counter-clockwise triangles.
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

pub struct IndexWriter {
    buf: ScratchBuffer,
    format: IndexFormat,
    vertex_offset: u32,
}

impl IndexWriter {
    #[must_use]
    pub fn new(buf: ScratchBuffer, format: IndexFormat) -> Self {
        Self {
            buf,
            format,
            vertex_offset: 0,
        }
    }

    /// Appends `index + vertex_offset`.
    ///
    /// # Panics
    ///
    /// Panics if the offset index does not fit the stream's index format.
    pub fn put(&mut self, index: u32) -> &mut Self {
        let Some(value) = index.checked_add(self.vertex_offset) else {
            panic!("index {index} + vertex offset {} overflows u32", self.vertex_offset);
        };
        match self.format {
            IndexFormat::U16 => {
                let Ok(narrow) = u16::try_from(value) else {
                    panic!("index {value} overflows a u16 index stream");
                };
                self.buf.extend_from_slice(&narrow.to_le_bytes());
            }
            IndexFormat::U32 => self.buf.extend_from_slice(&value.to_le_bytes()),
        }
        self
    }

    pub fn put_triangle(&mut self, a: u32, b: u32, c: u32) -> &mut Self {
        self.put(a).put(b).put(c)
    }

    /// Appends `{0,1,2,2,3,0}` relative to the current offset, then advances
    /// the offset by 4.
    pub fn put_quad(&mut self) -> &mut Self {
        for i in QUAD_INDICES {
            self.put(i);
        }
        self.vertex_offset += 4;
        self
    }

    /// Moves the offset past `count` vertices that have been fully indexed.
    pub fn advance_vertex_offset(&mut self, count: u32) -> &mut Self {
        self.vertex_offset += count;
        self
    }

    #[inline]
    #[must_use]
    pub fn vertex_offset(&self) -> u32 {
        self.vertex_offset
    }

    #[inline]
    #[must_use]
    pub fn index_count(&self) -> u32 {
        (self.buf.len() / self.format.size()) as u32
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> IndexFormat {
        self.format
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

    /// Decodes the stream into 32-bit indices.
    #[must_use]
    pub fn to_u32(&self) -> Vec<u32> {
        match self.format {
            IndexFormat::U16 => self
                .as_bytes()
                .chunks_exact(2)
                .map(|c| u32::from(u16::from_le_bytes([c[0], c[1]])))
                .collect(),
            IndexFormat::U32 => self
                .as_bytes()
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        }
    }

    pub(crate) fn replace_u32(&mut self, indices: &[u32]) {
        self.format = IndexFormat::U32;
        self.buf.replace(bytemuck::cast_slice(indices));
    }
}
