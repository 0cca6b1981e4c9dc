//! Pipeline Settings
//!
//! Tuning values for the arena allocator and the frame-scoped pools.
//!
//! None of these are protocol requirements: they trade memory tightness
//! against allocation churn and can be changed without affecting what gets
//! drawn.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use drawpack::settings::PipelineSettings;
//!
//! // Reference policy: 1 GiB arenas, 10 MiB growth, 60 s idle eviction
//! let settings = PipelineSettings::default();
//!
//! // Or from JSON, with omitted fields falling back to the defaults
//! let settings = PipelineSettings::from_json(r#"{ "pools": { "idle_timeout_secs": 5 } }"#)?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

// ---------------------------------------------------------------------------
// ArenaSettings
// ---------------------------------------------------------------------------

/// Tunables of the multi-draw arena allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaSettings {
    /// Size of the virtual byte range the allocator manages.
    ///
    /// The default value is 1 GiB.
    pub max_capacity: u64,

    /// Minimum number of bytes the backing GPU buffer grows by.
    ///
    /// The backing buffer never shrinks. The default value is 10 MiB.
    pub min_growth: u64,
}

impl Default for ArenaSettings {
    fn default() -> Self {
        Self {
            max_capacity: GIB,
            min_growth: 10 * MIB,
        }
    }
}

// ---------------------------------------------------------------------------
// PoolSettings
// ---------------------------------------------------------------------------

/// Tunables of the frame-scoped pools and caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Entries untouched for longer than this are destroyed at the next sweep.
    pub idle_timeout_secs: u64,

    /// Entry count above which the shared vertex-array cache is force-cleared.
    pub vertex_array_ceiling: usize,

    /// Entry count above which the sampler cache is force-cleared.
    pub sampler_ceiling: usize,

    /// Number of quads the shared quad index buffer is created with.
    pub initial_quad_capacity: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60,
            vertex_array_ceiling: 64,
            sampler_ceiling: 512,
            initial_quad_capacity: 1024,
        }
    }
}

impl PoolSettings {
    /// The idle window as a [`Duration`].
    #[inline]
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// PipelineSettings
// ---------------------------------------------------------------------------

/// All tunables of a [`RenderContext`](crate::context::RenderContext).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub arena: ArenaSettings,
    pub pools: PoolSettings,
}

impl PipelineSettings {
    /// Parses settings from JSON. Missing fields keep their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the settings as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
