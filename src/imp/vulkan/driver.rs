// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The seam between the Vulkan translation layer and a Vulkan device.

use super::native::{Command, DescriptorPoolSize, DescriptorWrite, PushConstantRange, SetLayoutBinding};
use crate::bindings::usage::QueueType;
use crate::error::Error;
use crate::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc};
use crate::resources::{BufferDesc, SamplerDesc, SubresourceRange, TextureDesc};
use crate::sync::{FenceSignal, SwapChainDesc};
use ash::vk;
use ash::vk::Handle;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Everything one `vkQueueSubmit` carries.
#[derive(Debug)]
pub struct Submission<'a> {
    pub command_buffers: Vec<&'a [Command]>,
    pub wait_semaphores: Vec<vk::Semaphore>,
    pub signal_semaphores: Vec<vk::Semaphore>,
    /// Completed by the driver once the submission has executed.
    pub signals: Vec<FenceSignal>,
}

/**
Native Vulkan entry points used by the backend.

Descriptor pools are created with `FREE_DESCRIPTOR_SET`, since bind groups free their sets
individually.  `allocate_descriptor_set` reports a full pool as
[`Error::DescriptorPoolExhausted`] so the caller can move on to another pool.
*/
pub trait Driver: Debug + Send + Sync {
    fn queue_family_index(&self, queue: QueueType) -> u32;

    fn create_buffer(&self, desc: &BufferDesc) -> Result<vk::Buffer, Error>;
    fn destroy_buffer(&self, buffer: vk::Buffer);
    fn create_image(&self, desc: &TextureDesc) -> Result<vk::Image, Error>;
    fn destroy_image(&self, image: vk::Image);
    fn create_image_view(
        &self,
        image: vk::Image,
        desc: &TextureDesc,
        range: &SubresourceRange,
    ) -> Result<vk::ImageView, Error>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_sampler(&self, desc: &SamplerDesc) -> Result<vk::Sampler, Error>;
    fn destroy_sampler(&self, sampler: vk::Sampler);

    fn create_descriptor_set_layout(&self, bindings: &[SetLayoutBinding]) -> Result<vk::DescriptorSetLayout, Error>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[PushConstantRange],
    ) -> Result<vk::PipelineLayout, Error>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    fn create_descriptor_pool(&self, max_sets: u32, sizes: &[DescriptorPoolSize]) -> Result<vk::DescriptorPool, Error>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, Error>;
    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet);
    /// One `vkUpdateDescriptorSets` call.
    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]);

    fn create_graphics_pipeline(
        &self,
        layout: vk::PipelineLayout,
        desc: &GraphicsPipelineDesc,
    ) -> Result<vk::Pipeline, Error>;
    fn create_compute_pipeline(&self, layout: vk::PipelineLayout, desc: &ComputePipelineDesc) -> Result<vk::Pipeline, Error>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    fn create_semaphore(&self) -> Result<vk::Semaphore, Error>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn create_swapchain(
        &self,
        window: RawWindowHandle,
        display: RawDisplayHandle,
        desc: &SwapChainDesc,
    ) -> Result<(vk::SwapchainKHR, Vec<vk::Image>), Error>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    /// `signal` may be null.
    fn acquire_next_image(&self, swapchain: vk::SwapchainKHR, signal: vk::Semaphore) -> Result<u32, Error>;
    fn queue_present(
        &self,
        queue: QueueType,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: &[vk::Semaphore],
    ) -> Result<(), Error>;

    fn queue_submit(&self, queue: QueueType, submission: &Submission<'_>) -> Result<(), Error>;
    fn device_wait_idle(&self) -> Result<(), Error>;
}

/// A call recorded by [`NullDriver`].
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    CreateBuffer { buffer: vk::Buffer, name: String },
    DestroyBuffer(vk::Buffer),
    CreateImage { image: vk::Image, name: String },
    DestroyImage(vk::Image),
    CreateImageView { view: vk::ImageView, image: vk::Image, range: SubresourceRange },
    DestroyImageView(vk::ImageView),
    CreateSampler(vk::Sampler),
    DestroySampler(vk::Sampler),
    CreateDescriptorSetLayout {
        layout: vk::DescriptorSetLayout,
        bindings: Vec<SetLayoutBinding>,
    },
    DestroyDescriptorSetLayout(vk::DescriptorSetLayout),
    CreatePipelineLayout {
        layout: vk::PipelineLayout,
        set_layouts: Vec<vk::DescriptorSetLayout>,
        push_constant_ranges: Vec<PushConstantRange>,
    },
    DestroyPipelineLayout(vk::PipelineLayout),
    CreateDescriptorPool {
        pool: vk::DescriptorPool,
        max_sets: u32,
        sizes: Vec<DescriptorPoolSize>,
    },
    DestroyDescriptorPool(vk::DescriptorPool),
    AllocateDescriptorSet {
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        set: vk::DescriptorSet,
    },
    FreeDescriptorSet { pool: vk::DescriptorPool, set: vk::DescriptorSet },
    UpdateDescriptorSets(Vec<DescriptorWrite>),
    CreatePipeline {
        pipeline: vk::Pipeline,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
    },
    DestroyPipeline(vk::Pipeline),
    CreateSemaphore(vk::Semaphore),
    DestroySemaphore(vk::Semaphore),
    CreateSwapchain { swapchain: vk::SwapchainKHR, images: Vec<vk::Image> },
    DestroySwapchain(vk::SwapchainKHR),
    AcquireNextImage { swapchain: vk::SwapchainKHR, image_index: u32 },
    QueuePresent {
        queue: QueueType,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: Vec<vk::Semaphore>,
    },
    QueueSubmit {
        queue: QueueType,
        command_buffers: Vec<Vec<Command>>,
        wait: Vec<vk::Semaphore>,
        signal: Vec<vk::Semaphore>,
    },
    DeviceWaitIdle,
}

/// A descriptor pool as the null driver accounts for it.
#[derive(Debug)]
struct NullPool {
    max_sets: u32,
    /// Descriptors left per type.
    free: HashMap<vk::DescriptorType, u32>,
    /// Live set -> what it took.
    sets: HashMap<u64, Vec<DescriptorPoolSize>>,
}

/**
A driver that executes nothing.

Handles are distinct non-null integers.  Every call is appended to a log that tests inspect
through [`NullDriver::calls`].  Submissions complete immediately.  Queue families are numbered
0 (graphics), 1 (compute) and 2 (copy).  Descriptor pools are accounted per set and per
descriptor type, so a set that does not fit fails with [`Error::DescriptorPoolExhausted`].
*/
#[derive(Debug)]
pub struct NullDriver {
    next_handle: AtomicU64,
    calls: Mutex<Vec<DriverCall>>,
    pools: Mutex<HashMap<u64, NullPool>>,
    /// set layout -> descriptors per type
    set_layouts: Mutex<HashMap<u64, Vec<DescriptorPoolSize>>>,
    /// swapchain -> (image count, next image)
    swapchains: Mutex<HashMap<u64, (u32, u32)>>,
}

impl Default for NullDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl NullDriver {
    pub fn new() -> Self {
        NullDriver {
            next_handle: AtomicU64::new(0x1000),
            calls: Mutex::new(Vec::new()),
            pools: Mutex::new(HashMap::new()),
            set_layouts: Mutex::new(HashMap::new()),
            swapchains: Mutex::new(HashMap::new()),
        }
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// The batches passed to `update_descriptor_sets`, in order.
    pub fn descriptor_updates(&self) -> Vec<Vec<DescriptorWrite>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                DriverCall::UpdateDescriptorSets(writes) => Some(writes.clone()),
                _ => None,
            })
            .collect()
    }

    fn handle<H: Handle>(&self) -> H {
        H::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn record(&self, call: DriverCall) {
        logwise::trace_sync!("vulkan null driver: {call}", call = logwise::privacy::LogIt(&call));
        self.calls.lock().unwrap().push(call);
    }
}

impl Driver for NullDriver {
    fn queue_family_index(&self, queue: QueueType) -> u32 {
        queue.index() as u32
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<vk::Buffer, Error> {
        let buffer = self.handle();
        self.record(DriverCall::CreateBuffer {
            buffer,
            name: desc.debug_name.clone(),
        });
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.record(DriverCall::DestroyBuffer(buffer));
    }

    fn create_image(&self, desc: &TextureDesc) -> Result<vk::Image, Error> {
        let image = self.handle();
        self.record(DriverCall::CreateImage {
            image,
            name: desc.debug_name.clone(),
        });
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        self.record(DriverCall::DestroyImage(image));
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        _desc: &TextureDesc,
        range: &SubresourceRange,
    ) -> Result<vk::ImageView, Error> {
        let view = self.handle();
        self.record(DriverCall::CreateImageView {
            view,
            image,
            range: *range,
        });
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.record(DriverCall::DestroyImageView(view));
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> Result<vk::Sampler, Error> {
        let sampler = self.handle();
        self.record(DriverCall::CreateSampler(sampler));
        Ok(sampler)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.record(DriverCall::DestroySampler(sampler));
    }

    fn create_descriptor_set_layout(&self, bindings: &[SetLayoutBinding]) -> Result<vk::DescriptorSetLayout, Error> {
        let layout: vk::DescriptorSetLayout = self.handle();
        let mut counts: Vec<DescriptorPoolSize> = Vec::new();
        for binding in bindings {
            match counts.iter_mut().find(|c| c.ty == binding.descriptor_type) {
                Some(count) => count.descriptor_count += binding.descriptor_count,
                None => counts.push(DescriptorPoolSize {
                    ty: binding.descriptor_type,
                    descriptor_count: binding.descriptor_count,
                }),
            }
        }
        self.set_layouts.lock().unwrap().insert(layout.as_raw(), counts);
        self.record(DriverCall::CreateDescriptorSetLayout {
            layout,
            bindings: bindings.to_vec(),
        });
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.record(DriverCall::DestroyDescriptorSetLayout(layout));
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[PushConstantRange],
    ) -> Result<vk::PipelineLayout, Error> {
        let layout = self.handle();
        self.record(DriverCall::CreatePipelineLayout {
            layout,
            set_layouts: set_layouts.to_vec(),
            push_constant_ranges: push_constant_ranges.to_vec(),
        });
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.record(DriverCall::DestroyPipelineLayout(layout));
    }

    fn create_descriptor_pool(&self, max_sets: u32, sizes: &[DescriptorPoolSize]) -> Result<vk::DescriptorPool, Error> {
        let pool: vk::DescriptorPool = self.handle();
        self.pools.lock().unwrap().insert(
            pool.as_raw(),
            NullPool {
                max_sets,
                free: sizes.iter().map(|s| (s.ty, s.descriptor_count)).collect(),
                sets: HashMap::new(),
            },
        );
        self.record(DriverCall::CreateDescriptorPool {
            pool,
            max_sets,
            sizes: sizes.to_vec(),
        });
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.pools.lock().unwrap().remove(&pool.as_raw());
        self.record(DriverCall::DestroyDescriptorPool(pool));
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, Error> {
        let counts = self
            .set_layouts
            .lock()
            .unwrap()
            .get(&layout.as_raw())
            .cloned()
            .unwrap_or_default();
        let set: vk::DescriptorSet = self.handle();
        {
            let mut pools = self.pools.lock().unwrap();
            let Some(entry) = pools.get_mut(&pool.as_raw()) else {
                return Err(Error::Driver(format!("unknown descriptor pool {pool:?}")));
            };
            if entry.sets.len() as u32 >= entry.max_sets {
                return Err(Error::DescriptorPoolExhausted);
            }
            let fits = counts
                .iter()
                .all(|c| entry.free.get(&c.ty).copied().unwrap_or(0) >= c.descriptor_count);
            if !fits {
                return Err(Error::DescriptorPoolExhausted);
            }
            for c in &counts {
                if let Some(free) = entry.free.get_mut(&c.ty) {
                    *free -= c.descriptor_count;
                }
            }
            entry.sets.insert(set.as_raw(), counts);
        }
        self.record(DriverCall::AllocateDescriptorSet { pool, layout, set });
        Ok(set)
    }

    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet) {
        if let Some(entry) = self.pools.lock().unwrap().get_mut(&pool.as_raw()) {
            for c in entry.sets.remove(&set.as_raw()).unwrap_or_default() {
                *entry.free.entry(c.ty).or_insert(0) += c.descriptor_count;
            }
        }
        self.record(DriverCall::FreeDescriptorSet { pool, set });
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) {
        self.record(DriverCall::UpdateDescriptorSets(writes.to_vec()));
    }

    fn create_graphics_pipeline(
        &self,
        layout: vk::PipelineLayout,
        _desc: &GraphicsPipelineDesc,
    ) -> Result<vk::Pipeline, Error> {
        let pipeline = self.handle();
        self.record(DriverCall::CreatePipeline {
            pipeline,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            layout,
        });
        Ok(pipeline)
    }

    fn create_compute_pipeline(&self, layout: vk::PipelineLayout, _desc: &ComputePipelineDesc) -> Result<vk::Pipeline, Error> {
        let pipeline = self.handle();
        self.record(DriverCall::CreatePipeline {
            pipeline,
            bind_point: vk::PipelineBindPoint::COMPUTE,
            layout,
        });
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.record(DriverCall::DestroyPipeline(pipeline));
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore, Error> {
        let semaphore = self.handle();
        self.record(DriverCall::CreateSemaphore(semaphore));
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.record(DriverCall::DestroySemaphore(semaphore));
    }

    fn create_swapchain(
        &self,
        _window: RawWindowHandle,
        _display: RawDisplayHandle,
        desc: &SwapChainDesc,
    ) -> Result<(vk::SwapchainKHR, Vec<vk::Image>), Error> {
        let swapchain: vk::SwapchainKHR = self.handle();
        let images: Vec<vk::Image> = (0..desc.image_count).map(|_| self.handle()).collect();
        self.swapchains
            .lock()
            .unwrap()
            .insert(swapchain.as_raw(), (desc.image_count, 0));
        self.record(DriverCall::CreateSwapchain {
            swapchain,
            images: images.clone(),
        });
        Ok((swapchain, images))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.swapchains.lock().unwrap().remove(&swapchain.as_raw());
        self.record(DriverCall::DestroySwapchain(swapchain));
    }

    fn acquire_next_image(&self, swapchain: vk::SwapchainKHR, _signal: vk::Semaphore) -> Result<u32, Error> {
        let image_index = {
            let mut swapchains = self.swapchains.lock().unwrap();
            let Some((count, next)) = swapchains.get_mut(&swapchain.as_raw()) else {
                return Err(Error::Driver(format!("unknown swapchain {swapchain:?}")));
            };
            let index = *next;
            *next = (*next + 1) % (*count).max(1);
            index
        };
        self.record(DriverCall::AcquireNextImage { swapchain, image_index });
        Ok(image_index)
    }

    fn queue_present(
        &self,
        queue: QueueType,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: &[vk::Semaphore],
    ) -> Result<(), Error> {
        self.record(DriverCall::QueuePresent {
            queue,
            swapchain,
            image_index,
            wait: wait.to_vec(),
        });
        Ok(())
    }

    fn queue_submit(&self, queue: QueueType, submission: &Submission<'_>) -> Result<(), Error> {
        self.record(DriverCall::QueueSubmit {
            queue,
            command_buffers: submission.command_buffers.iter().map(|c| c.to_vec()).collect(),
            wait: submission.wait_semaphores.clone(),
            signal: submission.signal_semaphores.clone(),
        });
        for signal in &submission.signals {
            signal.complete();
        }
        Ok(())
    }

    fn device_wait_idle(&self) -> Result<(), Error> {
        self.record(DriverCall::DeviceWaitIdle);
        Ok(())
    }
}
