// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use super::Vulkan;
use super::bind_group::BindGroup;
use super::command_list::CommandList;
use super::descriptor_pool::DescriptorPools;
use super::driver::{Driver, NullDriver};
use super::layout::RootSignature;
use super::queue::{Fence, Queue, Semaphore, SwapChain};
use super::resources::{Buffer, Pipeline, Sampler, Texture};
use crate::backend;
use crate::bindings::root_signature_desc::RootSignatureDesc;
use crate::bindings::usage::QueueType;
use crate::config::RhiConfig;
use crate::error::Error;
use crate::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc, PipelineKind};
use crate::resources::{BufferDesc, SamplerDesc, SubresourceRange, TextureDesc};
use crate::sync::{self, SwapChainDesc};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::sync::Arc;

/**
A Vulkan device: the driver, the configuration, the shared descriptor pools and one queue of
each type.

```
use rhi::Device as _;
use rhi::bindings::usage::QueueType;
let device = rhi::vulkan::Device::null(Default::default());
let list = device.create_command_list(QueueType::Compute).unwrap();
# drop(list);
```
*/
#[derive(Debug)]
pub struct Device {
    driver: Arc<dyn Driver>,
    config: Arc<RhiConfig>,
    pools: Arc<DescriptorPools>,
    queues: [Queue; 3],
}

impl Device {
    pub fn new(driver: Arc<dyn Driver>, config: RhiConfig) -> Self {
        let config = Arc::new(config);
        let pools = Arc::new(DescriptorPools::new(driver.clone(), config.descriptor_pool_sets));
        let queues = QueueType::ALL.map(|ty| Queue::new(ty, config.clone(), driver.clone()));
        logwise::info_sync!(
            "vulkan device created (capabilities {caps})",
            caps = logwise::privacy::LogIt(&config.capabilities)
        );
        Device {
            driver,
            config,
            pools,
            queues,
        }
    }

    /// A device backed by a [`NullDriver`].
    pub fn null(config: RhiConfig) -> Self {
        Self::new(Arc::new(NullDriver::new()), config)
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }
}

impl backend::Device for Device {
    type Backend = Vulkan;

    fn config(&self) -> &Arc<RhiConfig> {
        &self.config
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Buffer, Error> {
        let handle = self.driver.create_buffer(desc)?;
        Ok(Buffer::new(self.driver.clone(), desc, handle))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Texture, Error> {
        let image = self.driver.create_image(desc)?;
        let view = match self.driver.create_image_view(image, desc, &SubresourceRange::all(desc)) {
            Ok(view) => view,
            Err(e) => {
                self.driver.destroy_image(image);
                return Err(e);
            }
        };
        Ok(Texture::new(self.driver.clone(), desc.clone(), image, view, true))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Sampler, Error> {
        let handle = self.driver.create_sampler(desc)?;
        Ok(Sampler::new(self.driver.clone(), desc, handle))
    }

    fn create_root_signature(&self, desc: &RootSignatureDesc) -> Result<RootSignature, Error> {
        RootSignature::build(self.driver.clone(), self.config.clone(), desc)
    }

    fn create_bind_group(&self, root: &RootSignature, space: u32) -> Result<BindGroup, Error> {
        BindGroup::new(root, space, self.pools.clone(), self.driver.clone())
    }

    fn create_graphics_pipeline(&self, root: &RootSignature, desc: &GraphicsPipelineDesc) -> Result<Pipeline, Error> {
        let handle = self.driver.create_graphics_pipeline(root.pipeline_layout(), desc)?;
        logwise::info_sync!(
            "vulkan graphics pipeline {name} created",
            name = logwise::privacy::LogIt(&desc.debug_name)
        );
        Ok(Pipeline::new(self.driver.clone(), PipelineKind::Graphics, handle, root.clone()))
    }

    fn create_compute_pipeline(&self, root: &RootSignature, desc: &ComputePipelineDesc) -> Result<Pipeline, Error> {
        let handle = self.driver.create_compute_pipeline(root.pipeline_layout(), desc)?;
        logwise::info_sync!(
            "vulkan compute pipeline {name} created",
            name = logwise::privacy::LogIt(&desc.debug_name)
        );
        Ok(Pipeline::new(self.driver.clone(), PipelineKind::Compute, handle, root.clone()))
    }

    fn create_command_list(&self, queue: QueueType) -> Result<CommandList, Error> {
        let families = QueueType::ALL.map(|ty| self.driver.queue_family_index(ty));
        Ok(CommandList::new(self.config.clone(), queue, families))
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
        SwapChain::new(self.driver.clone(), window, display, desc)
    }

    fn wait_idle(&self) -> Result<(), Error> {
        for queue in &self.queues {
            sync::Queue::wait_idle(queue)?;
        }
        self.driver.device_wait_idle()
    }
}
