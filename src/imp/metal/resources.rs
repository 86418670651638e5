// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use super::Metal;
use super::driver::Driver;
use super::layout::RootSignature;
use super::native::{BufferHandle, PipelineHandle, PrimitiveType, SamplerHandle, TextureHandle};
use crate::backend::{GpuBuffer, GpuSampler, GpuTexture};
use crate::bindings::bind_group::BindingResource;
use crate::bindings::resource_tracking::UsageTracker;
use crate::bindings::usage::ResourceUsage;
use crate::pipeline::{PipelineKind, PrimitiveTopology};
use crate::resources::{BufferDesc, ResourceId, SamplerDesc, TextureDesc};
use std::sync::Arc;

#[derive(Debug)]
pub struct Buffer {
    id: ResourceId,
    desc: BufferDesc,
    handle: BufferHandle,
    tracker: UsageTracker,
    driver: Arc<dyn Driver>,
}

impl Buffer {
    pub(crate) fn new(driver: Arc<dyn Driver>, desc: &BufferDesc, handle: BufferHandle) -> Self {
        Buffer {
            id: ResourceId::next(),
            desc: desc.clone(),
            handle,
            tracker: UsageTracker::new(desc.initial_usage, 0),
            driver,
        }
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub(crate) fn tracker(&self) -> &UsageTracker {
        &self.tracker
    }
}

impl GpuBuffer for Buffer {
    fn id(&self) -> ResourceId {
        self.id
    }
    fn desc(&self) -> &BufferDesc {
        &self.desc
    }
    fn current_usage(&self) -> ResourceUsage {
        self.tracker.usage()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.driver.release_buffer(self.handle);
    }
}

/**
An `MTLTexture`.

Metal has no image layouts, so the tracker only records usage.  Drawable textures belong to
their layer and are not released here.
*/
#[derive(Debug)]
pub struct Texture {
    id: ResourceId,
    desc: TextureDesc,
    handle: TextureHandle,
    tracker: UsageTracker,
    owned: bool,
    driver: Arc<dyn Driver>,
}

impl Texture {
    pub(crate) fn new(driver: Arc<dyn Driver>, desc: TextureDesc, handle: TextureHandle, owned: bool) -> Self {
        let tracker = UsageTracker::new(desc.initial_usage, 0);
        Texture {
            id: ResourceId::next(),
            desc,
            handle,
            tracker,
            owned,
            driver,
        }
    }

    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub(crate) fn tracker(&self) -> &UsageTracker {
        &self.tracker
    }
}

impl GpuTexture for Texture {
    fn id(&self) -> ResourceId {
        self.id
    }
    fn desc(&self) -> &TextureDesc {
        &self.desc
    }
    fn current_usage(&self) -> ResourceUsage {
        self.tracker.usage()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if self.owned {
            self.driver.release_texture(self.handle);
        }
    }
}

#[derive(Debug)]
pub struct Sampler {
    id: ResourceId,
    desc: SamplerDesc,
    handle: SamplerHandle,
    driver: Arc<dyn Driver>,
}

impl Sampler {
    pub(crate) fn new(driver: Arc<dyn Driver>, desc: &SamplerDesc, handle: SamplerHandle) -> Self {
        Sampler {
            id: ResourceId::next(),
            desc: desc.clone(),
            handle,
            driver,
        }
    }

    pub fn handle(&self) -> SamplerHandle {
        self.handle
    }
}

impl GpuSampler for Sampler {
    fn id(&self) -> ResourceId {
        self.id
    }
    fn desc(&self) -> &SamplerDesc {
        &self.desc
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.driver.release_sampler_state(self.handle);
    }
}

impl<'a> From<&'a Buffer> for BindingResource<'a, Metal> {
    fn from(buffer: &'a Buffer) -> Self {
        BindingResource::Buffer(buffer)
    }
}

impl<'a> From<&'a Texture> for BindingResource<'a, Metal> {
    fn from(texture: &'a Texture) -> Self {
        BindingResource::Texture(texture)
    }
}

impl<'a> From<&'a Sampler> for BindingResource<'a, Metal> {
    fn from(sampler: &'a Sampler) -> Self {
        BindingResource::Sampler(sampler)
    }
}

pub fn primitive_type(topology: PrimitiveTopology) -> PrimitiveType {
    match topology {
        PrimitiveTopology::PointList => PrimitiveType::Point,
        PrimitiveTopology::LineList => PrimitiveType::Line,
        PrimitiveTopology::LineStrip => PrimitiveType::LineStrip,
        PrimitiveTopology::TriangleList => PrimitiveType::Triangle,
        PrimitiveTopology::TriangleStrip => PrimitiveType::TriangleStrip,
    }
}

/**
A render or compute pipeline state.

Metal takes the primitive type per draw and the threadgroup size per dispatch, so both are kept
with the pipeline.
*/
#[derive(Debug)]
pub struct Pipeline {
    kind: PipelineKind,
    handle: PipelineHandle,
    root: RootSignature,
    primitive: PrimitiveType,
    threads_per_threadgroup: [u32; 3],
    driver: Arc<dyn Driver>,
}

impl Pipeline {
    pub(crate) fn graphics(
        driver: Arc<dyn Driver>,
        handle: PipelineHandle,
        root: RootSignature,
        topology: PrimitiveTopology,
    ) -> Self {
        Pipeline {
            kind: PipelineKind::Graphics,
            handle,
            root,
            primitive: primitive_type(topology),
            threads_per_threadgroup: [1, 1, 1],
            driver,
        }
    }

    pub(crate) fn compute(
        driver: Arc<dyn Driver>,
        handle: PipelineHandle,
        root: RootSignature,
        threads_per_threadgroup: [u32; 3],
    ) -> Self {
        Pipeline {
            kind: PipelineKind::Compute,
            handle,
            root,
            primitive: PrimitiveType::Triangle,
            threads_per_threadgroup,
            driver,
        }
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle
    }

    pub fn root_signature(&self) -> &RootSignature {
        &self.root
    }

    pub fn primitive(&self) -> PrimitiveType {
        self.primitive
    }

    pub fn threads_per_threadgroup(&self) -> [u32; 3] {
        self.threads_per_threadgroup
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.driver.release_pipeline_state(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_maps_to_primitive_type() {
        assert_eq!(primitive_type(PrimitiveTopology::TriangleList), PrimitiveType::Triangle);
        assert_eq!(primitive_type(PrimitiveTopology::LineStrip), PrimitiveType::LineStrip);
        assert_eq!(primitive_type(PrimitiveTopology::PointList) as u32, 0);
    }
}
