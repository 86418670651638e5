// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use super::driver::Driver;
use super::layout::RootSignature;
use super::Vulkan;
use crate::backend::{GpuBuffer, GpuSampler, GpuTexture};
use crate::bindings::bind_group::BindingResource;
use crate::bindings::resource_tracking::UsageTracker;
use crate::bindings::usage::ResourceUsage;
use crate::pipeline::PipelineKind;
use crate::resources::{BufferDesc, ResourceId, SamplerDesc, TextureDesc};
use ash::vk;
use std::sync::Arc;

#[derive(Debug)]
pub struct Buffer {
    id: ResourceId,
    desc: BufferDesc,
    handle: vk::Buffer,
    tracker: UsageTracker,
    driver: Arc<dyn Driver>,
}

impl Buffer {
    pub(crate) fn new(driver: Arc<dyn Driver>, desc: &BufferDesc, handle: vk::Buffer) -> Self {
        Buffer {
            id: ResourceId::next(),
            desc: desc.clone(),
            handle,
            tracker: UsageTracker::new(desc.initial_usage, 0),
            driver,
        }
    }

    pub fn handle(&self) -> vk::Buffer {
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
        self.driver.destroy_buffer(self.handle);
    }
}

/**
A Vulkan image together with a view of all of it.

Alongside the usage, the tracker records the image layout, which starts out `UNDEFINED`.
*/
#[derive(Debug)]
pub struct Texture {
    id: ResourceId,
    desc: TextureDesc,
    image: vk::Image,
    view: vk::ImageView,
    tracker: UsageTracker,
    /// Swap-chain images belong to the swap chain.
    owns_image: bool,
    driver: Arc<dyn Driver>,
}

impl Texture {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        desc: TextureDesc,
        image: vk::Image,
        view: vk::ImageView,
        owns_image: bool,
    ) -> Self {
        let tracker = UsageTracker::new(desc.initial_usage, vk::ImageLayout::UNDEFINED.as_raw());
        Texture {
            id: ResourceId::next(),
            desc,
            image,
            view,
            tracker,
            owns_image,
            driver,
        }
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// The layout the image will be in after every barrier recorded so far.
    pub fn current_layout(&self) -> vk::ImageLayout {
        vk::ImageLayout::from_raw(self.tracker.raw_layout())
    }

    pub(crate) fn tracker(&self) -> &UsageTracker {
        &self.tracker
    }

    pub(crate) fn aspect(&self) -> vk::ImageAspectFlags {
        let format = self.desc.format;
        if format.has_stencil() {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else if format.is_depth() {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        }
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
        self.driver.destroy_image_view(self.view);
        if self.owns_image {
            self.driver.destroy_image(self.image);
        }
    }
}

#[derive(Debug)]
pub struct Sampler {
    id: ResourceId,
    desc: SamplerDesc,
    handle: vk::Sampler,
    driver: Arc<dyn Driver>,
}

impl Sampler {
    pub(crate) fn new(driver: Arc<dyn Driver>, desc: &SamplerDesc, handle: vk::Sampler) -> Self {
        Sampler {
            id: ResourceId::next(),
            desc: desc.clone(),
            handle,
            driver,
        }
    }

    pub fn handle(&self) -> vk::Sampler {
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
        self.driver.destroy_sampler(self.handle);
    }
}

impl<'a> From<&'a Buffer> for BindingResource<'a, Vulkan> {
    fn from(buffer: &'a Buffer) -> Self {
        BindingResource::Buffer(buffer)
    }
}

impl<'a> From<&'a Texture> for BindingResource<'a, Vulkan> {
    fn from(texture: &'a Texture) -> Self {
        BindingResource::Texture(texture)
    }
}

impl<'a> From<&'a Sampler> for BindingResource<'a, Vulkan> {
    fn from(sampler: &'a Sampler) -> Self {
        BindingResource::Sampler(sampler)
    }
}

/// A compiled pipeline and the root signature it was built against.
#[derive(Debug)]
pub struct Pipeline {
    kind: PipelineKind,
    handle: vk::Pipeline,
    root: RootSignature,
    driver: Arc<dyn Driver>,
}

impl Pipeline {
    pub(crate) fn new(driver: Arc<dyn Driver>, kind: PipelineKind, handle: vk::Pipeline, root: RootSignature) -> Self {
        Pipeline {
            kind,
            handle,
            root,
            driver,
        }
    }

    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    pub fn root_signature(&self) -> &RootSignature {
        &self.root
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.driver.destroy_pipeline(self.handle);
    }
}
