//! Draw Commands
//!
//! [`DrawCommand`] is the closed set of draws a batch can issue. Each variant
//! has a `#[repr(C)]` twin laid out exactly as wgpu reads indirect arguments:
//!
//! ```text
//! Arrays   { vertex_count, instance_count, first_vertex, first_instance }            16 bytes
//! Elements { index_count, instance_count, first_index, base_vertex, first_instance }  20 bytes
//! ```

use bytemuck::{Pod, Zeroable};

use crate::errors::{ContractViolation, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawCommand {
    Arrays {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        base_instance: u32,
    },
    Elements {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        base_instance: u32,
    },
}

impl DrawCommand {
    /// A single-instance draw of `count` vertices starting at `first`.
    #[inline]
    #[must_use]
    pub fn arrays(first: u32, count: u32) -> Self {
        Self::Arrays {
            vertex_count: count,
            instance_count: 1,
            first_vertex: first,
            base_instance: 0,
        }
    }

    /// A single-instance draw of `count` indices starting at `first_index`.
    #[inline]
    #[must_use]
    pub fn elements(first_index: u32, count: u32) -> Self {
        Self::Elements {
            index_count: count,
            instance_count: 1,
            first_index,
            base_vertex: 0,
            base_instance: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::Elements { .. })
    }

    /// Vertices (Arrays) or indices (Elements) drawn per instance.
    #[inline]
    #[must_use]
    pub fn count(&self) -> u32 {
        match *self {
            Self::Arrays { vertex_count, .. } => vertex_count,
            Self::Elements { index_count, .. } => index_count,
        }
    }

    #[inline]
    #[must_use]
    pub fn instance_count(&self) -> u32 {
        match *self {
            Self::Arrays { instance_count, .. } | Self::Elements { instance_count, .. } => {
                instance_count
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn base_instance(&self) -> u32 {
        match *self {
            Self::Arrays { base_instance, .. } | Self::Elements { base_instance, .. } => {
                base_instance
            }
        }
    }

    /// Returns the command with every instance field replaced.
    #[must_use]
    pub fn with_instances(self, count: u32, base: u32) -> Self {
        match self {
            Self::Arrays {
                vertex_count,
                first_vertex,
                ..
            } => Self::Arrays {
                vertex_count,
                instance_count: count,
                first_vertex,
                base_instance: base,
            },
            Self::Elements {
                index_count,
                first_index,
                base_vertex,
                ..
            } => Self::Elements {
                index_count,
                instance_count: count,
                first_index,
                base_vertex,
                base_instance: base,
            },
        }
    }

    /// Shifts the command into a packed buffer: vertices start `vertex_base`
    /// vertices later, indices `index_base` indices later.
    #[must_use]
    pub fn rebased(self, vertex_base: u32, index_base: u32) -> Self {
        match self {
            Self::Arrays {
                vertex_count,
                instance_count,
                first_vertex,
                base_instance,
            } => Self::Arrays {
                vertex_count,
                instance_count,
                first_vertex: first_vertex + vertex_base,
                base_instance,
            },
            Self::Elements {
                index_count,
                instance_count,
                first_index,
                base_vertex,
                base_instance,
            } => Self::Elements {
                index_count,
                instance_count,
                first_index: first_index + index_base,
                base_vertex: base_vertex + vertex_base as i32,
                base_instance,
            },
        }
    }

    /// Issues the command as a direct draw on `pass`.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        match *self {
            Self::Arrays {
                vertex_count,
                instance_count,
                first_vertex,
                base_instance,
            } => pass.draw(
                first_vertex..first_vertex + vertex_count,
                base_instance..base_instance + instance_count,
            ),
            Self::Elements {
                index_count,
                instance_count,
                first_index,
                base_vertex,
                base_instance,
            } => pass.draw_indexed(
                first_index..first_index + index_count,
                base_vertex,
                base_instance..base_instance + instance_count,
            ),
        }
    }
}

// ============================================================================
// Indirect layouts
// ============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndirectArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

/// Bytes per indirect record of the given kind.
#[inline]
#[must_use]
pub fn indirect_stride(indexed: bool) -> u64 {
    if indexed {
        size_of::<DrawIndexedIndirectArgs>() as u64
    } else {
        size_of::<DrawIndirectArgs>() as u64
    }
}

/// Encodes a homogeneous command list into indirect argument bytes.
///
/// Returns the bytes and whether the records are indexed.
pub fn encode_indirect(commands: &[DrawCommand]) -> Result<(Vec<u8>, bool)> {
    let indexed = commands.first().is_some_and(DrawCommand::is_indexed);
    let mut bytes = Vec::with_capacity(commands.len() * indirect_stride(indexed) as usize);

    for command in commands {
        match (*command, indexed) {
            (
                DrawCommand::Arrays {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    base_instance,
                },
                false,
            ) => bytes.extend_from_slice(bytemuck::bytes_of(&DrawIndirectArgs {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance: base_instance,
            })),
            (
                DrawCommand::Elements {
                    index_count,
                    instance_count,
                    first_index,
                    base_vertex,
                    base_instance,
                },
                true,
            ) => bytes.extend_from_slice(bytemuck::bytes_of(&DrawIndexedIndirectArgs {
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance: base_instance,
            })),
            _ => return Err(ContractViolation::MixedCommands.into()),
        }
    }

    Ok((bytes, indexed))
}
