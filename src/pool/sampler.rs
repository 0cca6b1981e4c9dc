//! Sampler Cache
//!
//! Samplers are keyed by (minification filter, magnification filter, wrap
//! mode). There is no idle eviction; the cache is only force-cleared when it
//! grows past its ceiling.

use std::time::Instant;

use crate::context::{RenderThread, Teardown};
use crate::errors::Result;
use crate::pool::cache::IdleCache;
use crate::pool::ledger::PoolStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerKey {
    pub min_filter: wgpu::FilterMode,
    pub mag_filter: wgpu::FilterMode,
    pub wrap: wgpu::AddressMode,
}

impl SamplerKey {
    #[must_use]
    pub fn new(min_filter: wgpu::FilterMode, mag_filter: wgpu::FilterMode, wrap: wgpu::AddressMode) -> Self {
        Self {
            min_filter,
            mag_filter,
            wrap,
        }
    }

    #[must_use]
    pub fn linear_clamp() -> Self {
        Self::new(
            wgpu::FilterMode::Linear,
            wgpu::FilterMode::Linear,
            wgpu::AddressMode::ClampToEdge,
        )
    }
}

pub struct SamplerCache {
    device: wgpu::Device,
    cache: IdleCache<SamplerKey, wgpu::Sampler>,
}

impl SamplerCache {
    #[must_use]
    pub fn new(device: wgpu::Device, thread: RenderThread, ceiling: usize) -> Self {
        Self {
            device,
            cache: IdleCache::new("SamplerCache", thread, None, ceiling),
        }
    }

    pub fn get(&mut self, key: SamplerKey, now: Instant) -> Result<wgpu::Sampler> {
        let device = &self.device;
        let sampler = self.cache.get_or_try_insert_with(key, now, || {
            Ok(device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("Cached Sampler"),
                address_mode_u: key.wrap,
                address_mode_v: key.wrap,
                address_mode_w: key.wrap,
                mag_filter: key.mag_filter,
                min_filter: key.min_filter,
                ..Default::default()
            }))
        })?;
        Ok(sampler.clone())
    }

    pub fn sweep(&mut self, now: Instant) {
        self.cache.sweep(now);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn take_stats(&mut self) -> PoolStats {
        self.cache.take_stats()
    }
}

impl Teardown for SamplerCache {
    fn teardown(&mut self) {
        self.cache.clear();
    }
}
