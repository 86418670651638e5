// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use super::Metal;
use super::arena::ArgumentArena;
use super::bind_group::BindGroup;
use super::command_list::CommandList;
use super::driver::{Driver, NullDriver};
use super::layout::RootSignature;
use super::queue::{Fence, Queue, Semaphore, SwapChain};
use super::resources::{Buffer, Pipeline, Sampler, Texture};
use crate::backend;
use crate::bindings::root_signature_desc::RootSignatureDesc;
use crate::bindings::usage::QueueType;
use crate::config::RhiConfig;
use crate::error::Error;
use crate::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc};
use crate::resources::{BufferDesc, SamplerDesc, TextureDesc};
use crate::sync::{self, SwapChainDesc};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::sync::Arc;

/**
An `MTLDevice` with its argument-buffer arena and one command queue per queue type.

```
use rhi::Device as _;
use rhi::bindings::usage::QueueType;
let device = rhi::metal::Device::null(Default::default()).unwrap();
let list = device.create_command_list(QueueType::Compute).unwrap();
# drop(list);
```
*/
#[derive(Debug)]
pub struct Device {
    driver: Arc<dyn Driver>,
    config: Arc<RhiConfig>,
    arena: Arc<ArgumentArena>,
    queues: [Queue; 3],
}

impl Device {
    /// Fails when the driver cannot allocate the argument-buffer arena.
    pub fn new(driver: Arc<dyn Driver>, config: RhiConfig) -> Result<Self, Error> {
        let config = Arc::new(config);
        let arena = ArgumentArena::new(driver.clone(), config.metal.argument_arena_bytes)?;
        let queues = QueueType::ALL.map(|ty| Queue::new(ty, config.clone(), driver.clone()));
        logwise::info_sync!(
            "metal device created ({bytes} byte argument arena)",
            bytes = config.metal.argument_arena_bytes
        );
        Ok(Device {
            driver,
            config,
            arena,
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

    /// Bytes of the argument-buffer arena not held by any bind group.
    pub fn free_argument_bytes(&self) -> u64 {
        self.arena.free_bytes()
    }
}

impl backend::Device for Device {
    type Backend = Metal;

    fn config(&self) -> &Arc<RhiConfig> {
        &self.config
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Buffer, Error> {
        let handle = self.driver.new_buffer(desc)?;
        Ok(Buffer::new(self.driver.clone(), desc, handle))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Texture, Error> {
        let handle = self.driver.new_texture(desc)?;
        Ok(Texture::new(self.driver.clone(), desc.clone(), handle, true))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Sampler, Error> {
        let handle = self.driver.new_sampler_state(desc)?;
        Ok(Sampler::new(self.driver.clone(), desc, handle))
    }

    fn create_root_signature(&self, desc: &RootSignatureDesc) -> Result<RootSignature, Error> {
        RootSignature::build(self.config.clone(), desc)
    }

    fn create_bind_group(&self, root: &RootSignature, space: u32) -> Result<BindGroup, Error> {
        BindGroup::new(root, space, &self.arena, self.driver.clone())
    }

    fn create_graphics_pipeline(&self, root: &RootSignature, desc: &GraphicsPipelineDesc) -> Result<Pipeline, Error> {
        let handle = self.driver.new_render_pipeline_state(desc)?;
        logwise::info_sync!(
            "metal render pipeline {name} created",
            name = logwise::privacy::LogIt(&desc.debug_name)
        );
        Ok(Pipeline::graphics(self.driver.clone(), handle, root.clone(), desc.topology))
    }

    fn create_compute_pipeline(&self, root: &RootSignature, desc: &ComputePipelineDesc) -> Result<Pipeline, Error> {
        let (handle, threads) = self.driver.new_compute_pipeline_state(desc)?;
        logwise::info_sync!(
            "metal compute pipeline {name} created with {threads} threads per threadgroup",
            name = logwise::privacy::LogIt(&desc.debug_name),
            threads = logwise::privacy::LogIt(&threads)
        );
        Ok(Pipeline::compute(self.driver.clone(), handle, root.clone(), threads))
    }

    fn create_command_list(&self, queue: QueueType) -> Result<CommandList, Error> {
        CommandList::new(self.config.clone(), queue, self.driver.clone())
    }

    fn queue(&self, queue: QueueType) -> &Queue {
        &self.queues[queue.index()]
    }

    fn create_fence(&self, initial_value: u64) -> Result<Fence, Error> {
        Ok(Fence::new(initial_value))
    }

    fn create_semaphore(&self) -> Result<Semaphore, Error> {
        let event = self.driver.new_shared_event()?;
        Ok(Semaphore::new(self.driver.clone(), event))
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
        self.driver.wait_until_idle()
    }
}
