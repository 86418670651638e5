// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use super::Dx12;
use super::bind_group::BindGroup;
use super::command_list::CommandList;
use super::descriptor_heap::{DeviceHeaps, HeapAllocation};
use super::driver::{Driver, NullDriver};
use super::native::{ResourceHandle, ViewDesc};
use super::queue::{Fence, Queue, Semaphore, SwapChain};
use super::resources::{Buffer, Pipeline, Sampler, Texture};
use super::root_signature::RootSignature;
use crate::backend;
use crate::bindings::root_signature_desc::RootSignatureDesc;
use crate::bindings::usage::QueueType;
use crate::config::RhiConfig;
use crate::error::Error;
use crate::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc, PipelineKind};
use crate::resources::{BufferDesc, SamplerDesc, TextureDesc, TextureUsage};
use crate::sync::{self, SwapChainDesc};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::sync::Arc;

/**
A D3D12 device: the driver, the configuration, the descriptor heaps and one command queue of
each type.

```
use rhi::Device as _;
use rhi::bindings::usage::QueueType;
let device = rhi::dx12::Device::null(Default::default()).unwrap();
let list = device.create_command_list(QueueType::Graphics).unwrap();
# drop(list);
```
*/
#[derive(Debug)]
pub struct Device {
    driver: Arc<dyn Driver>,
    config: Arc<RhiConfig>,
    heaps: Arc<DeviceHeaps>,
    queues: [Queue; 3],
}

impl Device {
    /// Fails when the driver cannot create the descriptor heaps.
    pub fn new(driver: Arc<dyn Driver>, config: RhiConfig) -> Result<Self, Error> {
        let config = Arc::new(config);
        let heaps = Arc::new(DeviceHeaps::new(&driver, &config.dx12)?);
        let queues = QueueType::ALL.map(|ty| Queue::new(ty, config.clone(), driver.clone()));
        logwise::info_sync!(
            "dx12 device created ({resources} resource and {samplers} sampler descriptors)",
            resources = config.dx12.cbv_srv_uav_heap_size,
            samplers = config.dx12.sampler_heap_size
        );
        Ok(Device {
            driver,
            config,
            heaps,
            queues,
        })
    }

    /// A device backed by a [`NullDriver`].
    pub fn null(config: RhiConfig) -> Result<Self, Error> {
        Self::new(Arc::new(NullDriver::new()), config)
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Descriptors still free in the shader-visible CBV/SRV/UAV heap.
    pub fn free_resource_descriptors(&self) -> u32 {
        self.heaps.shader_resources.free_descriptors()
    }

    fn attachment_view(
        &self,
        resource: ResourceHandle,
        desc: &TextureDesc,
        usage: TextureUsage,
    ) -> Result<Option<HeapAllocation>, Error> {
        if !desc.usage.contains(usage) {
            return Ok(None);
        }
        let (heap, view) = if usage == TextureUsage::DEPTH_STENCIL {
            (&self.heaps.dsv, ViewDesc::DepthStencil { format: desc.format })
        } else {
            (&self.heaps.rtv, ViewDesc::RenderTarget { format: desc.format })
        };
        let allocation = heap.allocate(1)?;
        self.driver.create_view(allocation.cpu(0), Some(resource), &view);
        Ok(Some(allocation))
    }

    fn attachment_views(
        &self,
        resource: ResourceHandle,
        desc: &TextureDesc,
    ) -> Result<(Option<HeapAllocation>, Option<HeapAllocation>), Error> {
        let rtv = self.attachment_view(resource, desc, TextureUsage::RENDER_TARGET)?;
        let dsv = self.attachment_view(resource, desc, TextureUsage::DEPTH_STENCIL)?;
        Ok((rtv, dsv))
    }
}

impl backend::Device for Device {
    type Backend = Dx12;

    fn config(&self) -> &Arc<RhiConfig> {
        &self.config
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Buffer, Error> {
        let (resource, address) = self.driver.create_buffer(desc)?;
        Ok(Buffer::new(self.driver.clone(), desc, resource, address))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Texture, Error> {
        let resource = self.driver.create_texture(desc)?;
        let (rtv, dsv) = match self.attachment_views(resource, desc) {
            Ok(views) => views,
            Err(e) => {
                self.driver.release_resource(resource);
                return Err(e);
            }
        };
        Ok(Texture::new(self.driver.clone(), desc.clone(), resource, rtv, dsv, true))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Sampler, Error> {
        let descriptor = self.heaps.staging_samplers.allocate(1)?;
        self.driver
            .create_view(descriptor.cpu(0), None, &ViewDesc::Sampler(desc.clone()));
        Ok(Sampler::new(desc, descriptor))
    }

    fn create_root_signature(&self, desc: &RootSignatureDesc) -> Result<RootSignature, Error> {
        RootSignature::build(self.driver.clone(), self.config.clone(), desc)
    }

    fn create_bind_group(&self, root: &RootSignature, space: u32) -> Result<BindGroup, Error> {
        BindGroup::new(root, space, self.heaps.clone(), self.driver.clone())
    }

    fn create_graphics_pipeline(&self, root: &RootSignature, desc: &GraphicsPipelineDesc) -> Result<Pipeline, Error> {
        let handle = self.driver.create_graphics_pipeline(root.handle(), desc)?;
        logwise::info_sync!(
            "dx12 graphics pipeline {name} created",
            name = logwise::privacy::LogIt(&desc.debug_name)
        );
        Ok(Pipeline::new(
            self.driver.clone(),
            PipelineKind::Graphics,
            handle,
            root.clone(),
            Some(desc.topology),
        ))
    }

    fn create_compute_pipeline(&self, root: &RootSignature, desc: &ComputePipelineDesc) -> Result<Pipeline, Error> {
        let handle = self.driver.create_compute_pipeline(root.handle(), desc)?;
        logwise::info_sync!(
            "dx12 compute pipeline {name} created",
            name = logwise::privacy::LogIt(&desc.debug_name)
        );
        Ok(Pipeline::new(self.driver.clone(), PipelineKind::Compute, handle, root.clone(), None))
    }

    fn create_command_list(&self, queue: QueueType) -> Result<CommandList, Error> {
        Ok(CommandList::new(queue, self.heaps.shader_visible()))
    }

    fn queue(&self, queue: QueueType) -> &Queue {
        &self.queues[queue.index()]
    }

    fn create_fence(&self, initial_value: u64) -> Result<Fence, Error> {
        Ok(Fence::new(initial_value))
    }

    fn create_semaphore(&self) -> Result<Semaphore, Error> {
        let handle = self.driver.create_semaphore()?;
        Ok(Semaphore::new(self.driver.clone(), handle))
    }

    fn create_swap_chain(
        &self,
        window: RawWindowHandle,
        display: RawDisplayHandle,
        desc: &SwapChainDesc,
    ) -> Result<SwapChain, Error> {
        SwapChain::new(self.driver.clone(), &self.heaps, QueueType::Graphics, window, display, desc)
    }

    fn wait_idle(&self) -> Result<(), Error> {
        for queue in &self.queues {
            sync::Queue::wait_idle(queue)?;
        }
        self.driver.wait_idle()
    }
}
