//! Draw Batch Descriptor
//!
//! A [`DrawBatch`] identifies one kind of draw: the program it runs, the
//! primitive topology, the per-vertex and optional per-instance layouts, and
//! the state hooks run around it. Descriptors are immutable and compared by
//! identity, so two separately built descriptors with identical contents are
//! still different keys.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{Error, Result};

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Topology
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
    IndexedLines,
    IndexedTriangles,
    /// Four vertices per quad, drawn as two triangles through the shared
    /// quad index buffer unless explicit indices are written.
    Quads,
}

impl Topology {
    /// Draws through an index buffer.
    #[inline]
    #[must_use]
    pub fn is_indexed(self) -> bool {
        matches!(self, Self::IndexedLines | Self::IndexedTriangles | Self::Quads)
    }

    /// Strips: one draw command per marked run of vertices.
    #[inline]
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::LineStrip | Self::TriangleStrip)
    }

    /// Triangle lists the optimizer can work on.
    #[inline]
    #[must_use]
    pub fn is_triangles(self) -> bool {
        matches!(self, Self::Triangles | Self::IndexedTriangles | Self::Quads)
    }

    #[must_use]
    pub fn to_wgpu(self) -> wgpu::PrimitiveTopology {
        match self {
            Self::Points => wgpu::PrimitiveTopology::PointList,
            Self::Lines | Self::IndexedLines => wgpu::PrimitiveTopology::LineList,
            Self::LineStrip => wgpu::PrimitiveTopology::LineStrip,
            Self::Triangles | Self::IndexedTriangles | Self::Quads => {
                wgpu::PrimitiveTopology::TriangleList
            }
            Self::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    U16,
    #[default]
    U32,
}

impl IndexFormat {
    /// Bytes per index.
    #[inline]
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    #[inline]
    #[must_use]
    pub fn to_wgpu(self) -> wgpu::IndexFormat {
        match self {
            Self::U16 => wgpu::IndexFormat::Uint16,
            Self::U32 => wgpu::IndexFormat::Uint32,
        }
    }
}

// ============================================================================
// Vertex layout
// ============================================================================

/// Numeric type of an attribute's components as stored in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F16,
    F32,
    F64,
}

impl ScalarType {
    #[inline]
    #[must_use]
    pub fn size(self) -> u32 {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 | Self::F16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

/// How the shader sees an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeTarget {
    Int,
    Float,
    /// Integer storage read as `[0, 1]` (unsigned) or `[-1, 1]` (signed).
    NormalizedFloat,
    Double,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub name: String,
    pub scalar: ScalarType,
    pub components: u8,
    pub target: AttributeTarget,
    /// Bytes skipped after the attribute.
    pub padding: u32,
}

impl VertexAttribute {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        scalar: ScalarType,
        components: u8,
        target: AttributeTarget,
    ) -> Self {
        Self {
            name: name.into(),
            scalar,
            components,
            target,
            padding: 0,
        }
    }

    #[must_use]
    pub fn float32(name: impl Into<String>, components: u8) -> Self {
        Self::new(name, ScalarType::F32, components, AttributeTarget::Float)
    }

    /// Four normalized bytes, as written by `VertexWriter::put_color`.
    #[must_use]
    pub fn color(name: impl Into<String>) -> Self {
        Self::new(name, ScalarType::U8, 4, AttributeTarget::NormalizedFloat)
    }

    #[must_use]
    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    /// Bytes occupied by the values, padding excluded.
    #[inline]
    #[must_use]
    pub fn byte_count(&self) -> u32 {
        self.scalar.size() * u32::from(self.components)
    }

    /// The wgpu vertex format this attribute maps to.
    pub fn vertex_format(&self) -> Result<wgpu::VertexFormat> {
        use AttributeTarget as T;
        use ScalarType as S;
        use wgpu::VertexFormat as F;

        let format = match (self.scalar, self.target, self.components) {
            (S::F32, T::Float, 1) => F::Float32,
            (S::F32, T::Float, 2) => F::Float32x2,
            (S::F32, T::Float, 3) => F::Float32x3,
            (S::F32, T::Float, 4) => F::Float32x4,
            (S::F16, T::Float, 2) => F::Float16x2,
            (S::F16, T::Float, 4) => F::Float16x4,
            (S::F64, T::Double, 1) => F::Float64,
            (S::F64, T::Double, 2) => F::Float64x2,
            (S::F64, T::Double, 3) => F::Float64x3,
            (S::F64, T::Double, 4) => F::Float64x4,
            (S::U32, T::Int, 1) => F::Uint32,
            (S::U32, T::Int, 2) => F::Uint32x2,
            (S::U32, T::Int, 3) => F::Uint32x3,
            (S::U32, T::Int, 4) => F::Uint32x4,
            (S::I32, T::Int, 1) => F::Sint32,
            (S::I32, T::Int, 2) => F::Sint32x2,
            (S::I32, T::Int, 3) => F::Sint32x3,
            (S::I32, T::Int, 4) => F::Sint32x4,
            (S::U8, T::Int, 2) => F::Uint8x2,
            (S::U8, T::Int, 4) => F::Uint8x4,
            (S::I8, T::Int, 2) => F::Sint8x2,
            (S::I8, T::Int, 4) => F::Sint8x4,
            (S::U8, T::NormalizedFloat, 2) => F::Unorm8x2,
            (S::U8, T::NormalizedFloat, 4) => F::Unorm8x4,
            (S::I8, T::NormalizedFloat, 2) => F::Snorm8x2,
            (S::I8, T::NormalizedFloat, 4) => F::Snorm8x4,
            (S::U16, T::Int, 2) => F::Uint16x2,
            (S::U16, T::Int, 4) => F::Uint16x4,
            (S::I16, T::Int, 2) => F::Sint16x2,
            (S::I16, T::Int, 4) => F::Sint16x4,
            (S::U16, T::NormalizedFloat, 2) => F::Unorm16x2,
            (S::U16, T::NormalizedFloat, 4) => F::Unorm16x4,
            (S::I16, T::NormalizedFloat, 2) => F::Snorm16x2,
            (S::I16, T::NormalizedFloat, 4) => F::Snorm16x4,
            (_, T::Double, _) => return Err(self.unsupported("double target needs f64 storage")),
            (S::F16 | S::F32 | S::F64, T::Int | T::NormalizedFloat, _) => {
                return Err(self.unsupported("float storage cannot be read as integers"));
            }
            _ => return Err(self.unsupported("no vertex format for this component count")),
        };
        Ok(format)
    }

    fn unsupported(&self, reason: &'static str) -> Error {
        Error::UnsupportedAttribute {
            name: self.name.clone(),
            reason,
        }
    }
}

/// An ordered list of attributes packed at increasing offsets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayout {
    attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    #[must_use]
    pub fn new(attributes: Vec<VertexAttribute>) -> Self {
        Self { attributes }
    }

    #[must_use]
    pub fn with(mut self, attribute: VertexAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    #[inline]
    #[must_use]
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Bytes per vertex, declared padding included.
    #[must_use]
    pub fn stride(&self) -> u32 {
        self.attributes
            .iter()
            .map(|a| a.byte_count() + a.padding)
            .sum()
    }

    /// Byte offset of each attribute within a vertex.
    #[must_use]
    pub fn offsets(&self) -> Vec<u32> {
        let mut offset = 0;
        self.attributes
            .iter()
            .map(|a| {
                let at = offset;
                offset += a.byte_count() + a.padding;
                at
            })
            .collect()
    }

    /// wgpu attributes with shader locations starting at `first_location`.
    pub fn to_wgpu_attributes(&self, first_location: u32) -> Result<Vec<wgpu::VertexAttribute>> {
        self.attributes
            .iter()
            .zip(self.offsets())
            .zip(first_location..)
            .map(|((attr, offset), location)| {
                Ok(wgpu::VertexAttribute {
                    format: attr.vertex_format()?,
                    offset: u64::from(offset),
                    shader_location: location,
                })
            })
            .collect()
    }
}

/// A vertex buffer layout that owns its attribute list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnedVertexBufferLayout {
    pub array_stride: u64,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

impl OwnedVertexBufferLayout {
    #[must_use]
    pub fn as_wgpu(&self) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: self.array_stride,
            step_mode: self.step_mode,
            attributes: &self.attributes,
        }
    }
}

// ============================================================================
// DrawBatch
// ============================================================================

/// Opaque selector of the GPU program a batch is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

/// State change run on the render pass before or after a batch is drawn.
pub type PassHook = Arc<dyn Fn(&mut wgpu::RenderPass<'_>) + Send + Sync>;

struct DrawBatchInner {
    id: u64,
    label: Option<String>,
    program: ProgramId,
    topology: Topology,
    index_format: IndexFormat,
    vertex_layout: VertexLayout,
    instance_layout: Option<VertexLayout>,
    setup: Option<PassHook>,
    cleanup: Option<PassHook>,
}

/// Immutable, identity-compared descriptor of one kind of draw.
#[derive(Clone)]
pub struct DrawBatch(Arc<DrawBatchInner>);

impl DrawBatch {
    #[must_use]
    pub fn builder(
        program: ProgramId,
        topology: Topology,
        vertex_layout: VertexLayout,
    ) -> DrawBatchBuilder {
        DrawBatchBuilder {
            label: None,
            program,
            topology,
            index_format: IndexFormat::default(),
            vertex_layout,
            instance_layout: None,
            setup: None,
            cleanup: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.0.label.as_deref()
    }

    #[inline]
    #[must_use]
    pub fn program(&self) -> ProgramId {
        self.0.program
    }

    #[inline]
    #[must_use]
    pub fn topology(&self) -> Topology {
        self.0.topology
    }

    #[inline]
    #[must_use]
    pub fn index_format(&self) -> IndexFormat {
        self.0.index_format
    }

    #[inline]
    #[must_use]
    pub fn vertex_layout(&self) -> &VertexLayout {
        &self.0.vertex_layout
    }

    #[inline]
    #[must_use]
    pub fn instance_layout(&self) -> Option<&VertexLayout> {
        self.0.instance_layout.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn vertex_stride(&self) -> u32 {
        self.0.vertex_layout.stride()
    }

    /// wgpu buffer layouts: slot 0 per-vertex, slot 1 per-instance if declared.
    /// Instance attributes continue the shader locations after the vertex ones.
    pub fn buffer_layouts(&self) -> Result<Vec<OwnedVertexBufferLayout>> {
        let vertex = &self.0.vertex_layout;
        let mut layouts = vec![OwnedVertexBufferLayout {
            array_stride: u64::from(vertex.stride()),
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: vertex.to_wgpu_attributes(0)?,
        }];
        if let Some(instance) = &self.0.instance_layout {
            layouts.push(OwnedVertexBufferLayout {
                array_stride: u64::from(instance.stride()),
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: instance.to_wgpu_attributes(vertex.attributes().len() as u32)?,
            });
        }
        Ok(layouts)
    }

    pub(crate) fn run_setup(&self, pass: &mut wgpu::RenderPass<'_>) {
        if let Some(hook) = &self.0.setup {
            hook(pass);
        }
    }

    pub(crate) fn run_cleanup(&self, pass: &mut wgpu::RenderPass<'_>) {
        if let Some(hook) = &self.0.cleanup {
            hook(pass);
        }
    }
}

impl PartialEq for DrawBatch {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for DrawBatch {}

impl std::hash::Hash for DrawBatch {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for DrawBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawBatch")
            .field("id", &self.0.id)
            .field("label", &self.0.label)
            .field("program", &self.0.program)
            .field("topology", &self.0.topology)
            .field("vertex_stride", &self.0.vertex_layout.stride())
            .field("instanced", &self.0.instance_layout.is_some())
            .finish_non_exhaustive()
    }
}

pub struct DrawBatchBuilder {
    label: Option<String>,
    program: ProgramId,
    topology: Topology,
    index_format: IndexFormat,
    vertex_layout: VertexLayout,
    instance_layout: Option<VertexLayout>,
    setup: Option<PassHook>,
    cleanup: Option<PassHook>,
}

impl DrawBatchBuilder {
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn index_format(mut self, format: IndexFormat) -> Self {
        self.index_format = format;
        self
    }

    #[must_use]
    pub fn instance_layout(mut self, layout: VertexLayout) -> Self {
        self.instance_layout = Some(layout);
        self
    }

    #[must_use]
    pub fn setup(mut self, hook: impl Fn(&mut wgpu::RenderPass<'_>) + Send + Sync + 'static) -> Self {
        self.setup = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn cleanup(
        mut self,
        hook: impl Fn(&mut wgpu::RenderPass<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.cleanup = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn build(self) -> DrawBatch {
        DrawBatch(Arc::new(DrawBatchInner {
            id: NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed),
            label: self.label,
            program: self.program,
            topology: self.topology,
            index_format: self.index_format,
            vertex_layout: self.vertex_layout,
            instance_layout: self.instance_layout,
            setup: self.setup,
            cleanup: self.cleanup,
        }))
    }
}
