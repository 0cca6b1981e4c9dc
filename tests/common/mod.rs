//! Shared helpers for integration tests.

#![allow(dead_code)]

use drawpack::batch::{DrawBatch, ProgramId, Topology, VertexAttribute, VertexLayout};
use drawpack::pool::ScratchPool;
use drawpack::{PipelineSettings, RenderContext, RenderThread};
use std::time::Duration;

/// `position: vec3<f32>` (12-byte stride).
pub fn position_layout() -> VertexLayout {
    VertexLayout::new(vec![VertexAttribute::float32("position", 3)])
}

pub fn batch(topology: Topology) -> DrawBatch {
    DrawBatch::builder(ProgramId(1), topology, position_layout())
        .label(format!("{topology:?} test batch"))
        .build()
}

pub fn scratch_pool() -> ScratchPool {
    ScratchPool::new(RenderThread::current(), Duration::from_secs(60))
}

/// A device on the default adapter, or `None` on machines without one.
pub fn test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::default();
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::LowPower,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .ok()?;

    pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("drawpack test device"),
        ..Default::default()
    }))
    .ok()
}

/// A render context on a test device, or `None` without an adapter.
pub fn test_context() -> Option<RenderContext> {
    let _ = env_logger::builder().is_test(true).try_init();
    let (device, queue) = test_device()?;
    Some(RenderContext::new(device, queue, PipelineSettings::default()))
}
