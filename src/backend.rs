// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The abstract interface every backend implements.

A backend is a zero-sized marker type ([`Vulkan`](crate::Vulkan), [`Dx12`](crate::Dx12),
[`Metal`](crate::Metal)) whose associated types name its concrete objects.  Code written against
`B: Backend` is monomorphised per backend, so nothing dispatches dynamically between backends and
a binary only pays for the backends its cargo features enable.

```
# #[cfg(feature = "backend_vulkan")] {
use rhi::{Backend, Device, Vulkan};
use rhi::resources::{BufferDesc, BufferUsage};

fn make_constants<B: Backend>(device: &B::Device) -> B::Buffer {
    device
        .create_buffer(&BufferDesc::new("constants", 256, BufferUsage::CONSTANT))
        .unwrap()
}

let device = rhi::vulkan::Device::null(Default::default());
let _buffer = make_constants::<Vulkan>(&device);
# }
```
*/

use crate::bindings::bind_group::BindGroup;
use crate::bindings::root_signature_desc::RootSignatureDesc;
use crate::bindings::usage::{QueueType, ResourceUsage};
use crate::commands::CommandList;
use crate::config::RhiConfig;
use crate::error::Error;
use crate::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc};
use crate::resources::{BufferDesc, ResourceId, SamplerDesc, TextureDesc};
use crate::sync::{Fence, Queue, SwapChain, SwapChainDesc};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::fmt::Debug;
use std::sync::Arc;

pub trait GpuBuffer: Debug + Send + Sync {
    fn id(&self) -> ResourceId;
    fn desc(&self) -> &BufferDesc;
    /// Read-only view of the tracked usage.
    fn current_usage(&self) -> ResourceUsage;
}

pub trait GpuTexture: Debug + Send + Sync {
    fn id(&self) -> ResourceId;
    fn desc(&self) -> &TextureDesc;
    /// Read-only view of the tracked usage.
    fn current_usage(&self) -> ResourceUsage;
}

pub trait GpuSampler: Debug + Send + Sync {
    fn id(&self) -> ResourceId;
    fn desc(&self) -> &SamplerDesc;
}

pub trait Backend: Debug + Copy + Send + Sync + 'static {
    const NAME: &'static str;
    type Device: Device<Backend = Self>;
    type Buffer: GpuBuffer + 'static;
    type Texture: GpuTexture + 'static;
    type Sampler: GpuSampler + 'static;
    type RootSignature: Debug + Send + Sync;
    type BindGroup: BindGroup<Backend = Self>;
    type Pipeline: Debug + Send + Sync;
    type CommandList: CommandList<Backend = Self>;
    type Queue: Queue<Backend = Self>;
    type Fence: Fence;
    type Semaphore: Debug + Send + Sync;
    type SwapChain: SwapChain<Backend = Self>;
}

/// Creates every object of a backend.
pub trait Device: Debug + Send + Sync {
    type Backend: Backend<Device = Self>;

    fn config(&self) -> &Arc<RhiConfig>;

    fn create_buffer(&self, desc: &BufferDesc) -> Result<<Self::Backend as Backend>::Buffer, Error>;
    fn create_texture(&self, desc: &TextureDesc) -> Result<<Self::Backend as Backend>::Texture, Error>;
    fn create_sampler(&self, desc: &SamplerDesc) -> Result<<Self::Backend as Backend>::Sampler, Error>;

    /// Validates `desc` and builds the native layout.  Malformed descriptions fail as a whole.
    fn create_root_signature(
        &self,
        desc: &RootSignatureDesc,
    ) -> Result<<Self::Backend as Backend>::RootSignature, Error>;

    /// Allocates a bind group for one register space of `root`.
    fn create_bind_group(
        &self,
        root: &<Self::Backend as Backend>::RootSignature,
        space: u32,
    ) -> Result<<Self::Backend as Backend>::BindGroup, Error>;

    fn create_graphics_pipeline(
        &self,
        root: &<Self::Backend as Backend>::RootSignature,
        desc: &GraphicsPipelineDesc,
    ) -> Result<<Self::Backend as Backend>::Pipeline, Error>;

    fn create_compute_pipeline(
        &self,
        root: &<Self::Backend as Backend>::RootSignature,
        desc: &ComputePipelineDesc,
    ) -> Result<<Self::Backend as Backend>::Pipeline, Error>;

    fn create_command_list(&self, queue: QueueType) -> Result<<Self::Backend as Backend>::CommandList, Error>;

    fn queue(&self, queue: QueueType) -> &<Self::Backend as Backend>::Queue;

    fn create_fence(&self, initial_value: u64) -> Result<<Self::Backend as Backend>::Fence, Error>;
    fn create_semaphore(&self) -> Result<<Self::Backend as Backend>::Semaphore, Error>;

    fn create_swap_chain(
        &self,
        window: RawWindowHandle,
        display: RawDisplayHandle,
        desc: &SwapChainDesc,
    ) -> Result<<Self::Backend as Backend>::SwapChain, Error>;

    /// Blocks until every queue is idle.
    fn wait_idle(&self) -> Result<(), Error>;
}
