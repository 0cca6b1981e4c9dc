//! Error Types
//!
//! This module defines the error types used throughout the pipeline.
//!
//! # Overview
//!
//! Failures fall into three groups:
//! - **Contract violations** ([`ContractViolation`]): a holder, descriptor or
//!   uploaded batch was populated incorrectly. These abort the batch build in
//!   progress and are never worth retrying.
//! - **Resource exhaustion** ([`Error::ArenaExhausted`]): the arena cannot
//!   satisfy a request even at its maximum capacity. Callers may evict and
//!   retry at a higher level.
//! - **Deferred work outcomes** ([`Error::ContextLost`], [`Error::Cancelled`]).
//!
//! Pool bookkeeping bugs (returning an untracked lease, freeing an arena extent
//! twice) panic instead of surfacing here, since continuing would corrupt shared
//! GPU memory.
//!
//! # Usage
//!
//! ```rust,ignore
//! use drawpack::errors::Result;
//!
//! fn build() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::batch::descriptor::Topology;

/// A caller bug detected while preparing, optimizing or packing a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    // ========================================================================
    // Holder / descriptor consistency
    // ========================================================================
    /// The topology requires indices but none were written.
    #[error("indexed topology {0:?} but no index data")]
    MissingIndices(Topology),

    /// Indices were written for a topology that does not use them.
    #[error("index data written for non-indexed topology {0:?}")]
    UnexpectedIndices(Topology),

    /// The descriptor declares a per-instance layout but no instance data was written.
    #[error("descriptor declares a per-instance layout but no instance data was written")]
    MissingInstances,

    /// Instance data was written but the descriptor has no per-instance layout.
    #[error("instance data written but descriptor has no per-instance layout")]
    UnexpectedInstances,

    /// A connected topology was used without primitive boundary marks.
    #[error("connected topology {0:?} requires primitive boundary marks")]
    MissingPrimitiveBoundaries(Topology),

    /// Primitive boundaries were marked for a topology that does not use them.
    #[error("primitive boundaries marked for non-connected topology {0:?}")]
    UnexpectedPrimitiveBoundaries(Topology),

    /// Boundary marks must be non-decreasing and describe at least one run.
    #[error("primitive boundaries {0:?} do not describe any run")]
    MalformedPrimitiveBoundaries(Vec<u32>),

    /// The vertex stream length is not a whole number of vertices.
    #[error("vertex stream of {len} bytes is not a multiple of the {stride}-byte stride")]
    PartialVertex { len: usize, stride: usize },

    /// Quad auto-indexing needs groups of four vertices.
    #[error("quad topology needs a multiple of 4 vertices, got {0}")]
    PartialQuad(u32),

    /// Nothing was written into the holder.
    #[error("batch has no vertices")]
    EmptyBatch,

    /// A uniform or storage block still has an open array or struct.
    #[error("block {0:?} has unclosed arrays or structs")]
    UnbalancedBlock(String),

    // ========================================================================
    // Optimizer
    // ========================================================================
    /// The batch does not satisfy the optimizer's input requirements.
    #[error("batch cannot be optimized: {0}")]
    NotOptimizable(&'static str),

    /// After vertex-fetch reordering some unique vertices were left unreferenced.
    #[error("optimizer left unused vertices: {unique} unique, {referenced} referenced")]
    UnusedVertices { unique: usize, referenced: usize },

    // ========================================================================
    // Multi-draw packing
    // ========================================================================
    /// The uploaded data is richer than the multi-draw builder can pack.
    #[error("batch cannot be packed into a multi-draw arena: {0}")]
    NotPackable(&'static str),

    /// A sub-mesh's index source differs from the builder's established mode.
    #[error("sub-mesh index mode differs from the builder's index mode")]
    IndexModeMismatch,

    /// Indirect commands of both variants were mixed in one command list.
    #[error("draw command list mixes array and element commands")]
    MixedCommands,
}

/// The main error type of the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller bug in how a batch was populated or submitted.
    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),

    /// The arena allocator cannot satisfy a request even at maximum capacity.
    #[error("arena exhausted: requested {requested} bytes with a {max_capacity}-byte maximum capacity")]
    ArenaExhausted {
        /// Requested extent size in bytes
        requested: u64,
        /// The allocator's virtual capacity
        max_capacity: u64,
    },

    /// A vertex attribute declaration has no wgpu vertex format.
    #[error("unsupported vertex attribute {name}: {reason}")]
    UnsupportedAttribute {
        /// Attribute name as declared in the layout
        name: String,
        /// Why the combination cannot be expressed
        reason: &'static str,
    },

    /// The render context was torn down before deferred work could run.
    #[error("render context was torn down")]
    ContextLost,

    /// Deferred work was cancelled before its GPU handoff.
    #[error("operation cancelled")]
    Cancelled,

    /// A background worker thread could not be started.
    #[error("worker spawn failed: {0}")]
    Io(#[from] std::io::Error),

    /// Settings could not be parsed.
    #[error("settings parse error: {0}")]
    Settings(#[from] serde_json::Error),
}

/// Alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
