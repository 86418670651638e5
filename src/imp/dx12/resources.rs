// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use super::Dx12;
use super::barrier::resource_states;
use super::descriptor_heap::HeapAllocation;
use super::driver::Driver;
use super::native::{CpuDescriptorHandle, PipelineStateHandle, ResourceHandle, ResourceStates};
use super::root_signature::RootSignature;
use crate::backend::{GpuBuffer, GpuSampler, GpuTexture};
use crate::bindings::bind_group::BindingResource;
use crate::bindings::resource_tracking::UsageTracker;
use crate::bindings::usage::ResourceUsage;
use crate::pipeline::{PipelineKind, PrimitiveTopology};
use crate::resources::{BufferDesc, ResourceId, SamplerDesc, TextureDesc};
use std::sync::Arc;

/// A committed buffer and its GPU virtual address.
#[derive(Debug)]
pub struct Buffer {
    id: ResourceId,
    desc: BufferDesc,
    resource: ResourceHandle,
    address: u64,
    tracker: UsageTracker,
    driver: Arc<dyn Driver>,
}

impl Buffer {
    pub(crate) fn new(driver: Arc<dyn Driver>, desc: &BufferDesc, resource: ResourceHandle, address: u64) -> Self {
        let state = resource_states(desc.initial_usage);
        Buffer {
            id: ResourceId::next(),
            desc: desc.clone(),
            resource,
            address,
            tracker: UsageTracker::new(desc.initial_usage, state.bits() as i32),
            driver,
        }
    }

    pub fn resource(&self) -> ResourceHandle {
        self.resource
    }

    pub fn gpu_address(&self) -> u64 {
        self.address
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
        self.driver.release_resource(self.resource);
    }
}

/**
A texture resource with its render-target or depth-stencil view, if its usage asks for one.

The tracker stores the `D3D12_RESOURCE_STATES` bits next to the abstract usage.  Shader views
are created by the bind groups that need them.
*/
#[derive(Debug)]
pub struct Texture {
    id: ResourceId,
    desc: TextureDesc,
    resource: ResourceHandle,
    tracker: UsageTracker,
    rtv: Option<HeapAllocation>,
    dsv: Option<HeapAllocation>,
    /// Swap-chain buffers are released by the swap chain.
    owns_resource: bool,
    driver: Arc<dyn Driver>,
}

impl Texture {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        desc: TextureDesc,
        resource: ResourceHandle,
        rtv: Option<HeapAllocation>,
        dsv: Option<HeapAllocation>,
        owns_resource: bool,
    ) -> Self {
        let state = resource_states(desc.initial_usage);
        let tracker = UsageTracker::new(desc.initial_usage, state.bits() as i32);
        Texture {
            id: ResourceId::next(),
            desc,
            resource,
            tracker,
            rtv,
            dsv,
            owns_resource,
            driver,
        }
    }

    pub fn resource(&self) -> ResourceHandle {
        self.resource
    }

    /// The state the resource will be in after every barrier recorded so far.
    pub fn current_state(&self) -> ResourceStates {
        ResourceStates::from_bits_retain(self.tracker.raw_layout() as u32)
    }

    pub fn rtv(&self) -> Option<CpuDescriptorHandle> {
        self.rtv.as_ref().map(|a| a.cpu(0))
    }

    pub fn dsv(&self) -> Option<CpuDescriptorHandle> {
        self.dsv.as_ref().map(|a| a.cpu(0))
    }

    /// `D3D12CalcSubresource`.
    pub fn subresource_index(&self, mip: u32, layer: u32) -> u32 {
        mip + layer * self.desc.mip_levels
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
        if self.owns_resource {
            self.driver.release_resource(self.resource);
        }
    }
}

/// A sampler descriptor in the CPU-only sampler heap, copied into bind groups on write.
#[derive(Debug)]
pub struct Sampler {
    id: ResourceId,
    desc: SamplerDesc,
    descriptor: HeapAllocation,
}

impl Sampler {
    pub(crate) fn new(desc: &SamplerDesc, descriptor: HeapAllocation) -> Self {
        Sampler {
            id: ResourceId::next(),
            desc: desc.clone(),
            descriptor,
        }
    }

    pub fn descriptor(&self) -> CpuDescriptorHandle {
        self.descriptor.cpu(0)
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

impl<'a> From<&'a Buffer> for BindingResource<'a, Dx12> {
    fn from(buffer: &'a Buffer) -> Self {
        BindingResource::Buffer(buffer)
    }
}

impl<'a> From<&'a Texture> for BindingResource<'a, Dx12> {
    fn from(texture: &'a Texture) -> Self {
        BindingResource::Texture(texture)
    }
}

impl<'a> From<&'a Sampler> for BindingResource<'a, Dx12> {
    fn from(sampler: &'a Sampler) -> Self {
        BindingResource::Sampler(sampler)
    }
}

/// A pipeline state object and the root signature it was built against.
#[derive(Debug)]
pub struct Pipeline {
    kind: PipelineKind,
    handle: PipelineStateHandle,
    root: RootSignature,
    /// Graphics pipelines set their topology on the command list.
    topology: Option<PrimitiveTopology>,
    driver: Arc<dyn Driver>,
}

impl Pipeline {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        kind: PipelineKind,
        handle: PipelineStateHandle,
        root: RootSignature,
        topology: Option<PrimitiveTopology>,
    ) -> Self {
        Pipeline {
            kind,
            handle,
            root,
            topology,
            driver,
        }
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn handle(&self) -> PipelineStateHandle {
        self.handle
    }

    pub fn root_signature(&self) -> &RootSignature {
        &self.root
    }

    pub fn topology(&self) -> Option<PrimitiveTopology> {
        self.topology
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.driver.destroy_pipeline(self.handle);
    }
}
