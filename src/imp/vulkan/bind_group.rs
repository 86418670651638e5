// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use super::Vulkan;
use super::descriptor_pool::{DescriptorAllocation, DescriptorPools};
use super::driver::Driver;
use super::layout::{binding_range, descriptor_type, RootSignature, RootSignatureInner};
use super::native::{DescriptorInfo, DescriptorWrite, PushConstantRange};
use crate::backend::GpuTexture;
use crate::bindings::bind_group::{self, BindGroupCore, BindingKey, BindingResource};
use crate::bindings::slot::ResourceType;
use crate::error::{reject, Error};
use crate::resources::ResourceId;
use ash::vk;
use std::collections::HashMap;
use std::sync::Arc;

/**
A descriptor set for one register space.

Groups for the root-constant space have no descriptor set; they only carry push-constant data.
*/
#[derive(Debug)]
pub struct BindGroup {
    core: BindGroupCore<DescriptorWrite>,
    root: Arc<RootSignatureInner>,
    allocation: Option<DescriptorAllocation>,
    /// Views created for subresource bindings, one per committed element.
    views: HashMap<BindingKey, vk::ImageView>,
    /// Views of the open transaction, not yet visible.
    pending_views: HashMap<BindingKey, vk::ImageView>,
    pools: Arc<DescriptorPools>,
    driver: Arc<dyn Driver>,
}

/// What a command list keeps of a bind group at bind time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GroupBinding {
    pub(crate) set: Option<vk::DescriptorSet>,
    pub(crate) push_constants: Vec<(PushConstantRange, Vec<u8>)>,
}

impl BindGroup {
    pub(crate) fn new(
        root: &RootSignature,
        space: u32,
        pools: Arc<DescriptorPools>,
        driver: Arc<dyn Driver>,
    ) -> Result<Self, Error> {
        let core = BindGroupCore::new(root.inner.layout.clone(), space, format!("vulkan set {space}"))?;
        let allocation = match root.inner.set_layout(space) {
            Some(set_layout) => Some(pools.allocate(set_layout.handle, &set_layout.pool_sizes())?),
            None => None,
        };
        Ok(BindGroup {
            core,
            root: root.inner.clone(),
            allocation,
            views: HashMap::new(),
            pending_views: HashMap::new(),
            pools,
            driver,
        })
    }

    pub fn descriptor_set(&self) -> Option<vk::DescriptorSet> {
        self.allocation.map(|a| a.set)
    }

    pub(crate) fn snapshot(&self) -> GroupBinding {
        let push_constants = self
            .core
            .root_constants()
            .iter()
            .filter_map(|(binding, data)| {
                self.root
                    .push_constant(*binding)
                    .map(|p| (p.range, data.clone()))
            })
            .collect();
        GroupBinding {
            set: self.descriptor_set(),
            push_constants,
        }
    }

    /// The descriptor for `resource`, and the view created for it if it binds a subresource.
    fn descriptor_info(
        &self,
        ty: ResourceType,
        resource: &BindingResource<'_, Vulkan>,
    ) -> Result<(DescriptorInfo, Option<vk::ImageView>), Error> {
        if let Some((buffer, offset, size)) = resource.buffer() {
            let info = DescriptorInfo::Buffer {
                buffer: buffer.handle(),
                offset,
                range: size,
            };
            return Ok((info, None));
        }
        if let Some((texture, range)) = resource.texture() {
            let (image_view, created) = if range.covers(texture.desc()) {
                (texture.view(), None)
            } else {
                let view = self.driver.create_image_view(texture.image(), texture.desc(), &range)?;
                (view, Some(view))
            };
            let image_layout = if ty == ResourceType::UnorderedAccess {
                vk::ImageLayout::GENERAL
            } else {
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            };
            let info = DescriptorInfo::Image {
                sampler: vk::Sampler::null(),
                image_view,
                image_layout,
            };
            return Ok((info, created));
        }
        match resource.sampler() {
            Some(sampler) => Ok((
                DescriptorInfo::Image {
                    sampler: sampler.handle(),
                    image_view: vk::ImageView::null(),
                    image_layout: vk::ImageLayout::UNDEFINED,
                },
                None,
            )),
            None => Err(Error::Driver("binding resource is neither buffer, texture nor sampler".to_string())),
        }
    }
}

impl bind_group::BindGroup for BindGroup {
    type Backend = Vulkan;

    fn space(&self) -> u32 {
        self.core.space()
    }

    fn begin_update(&mut self) {
        self.core.begin_update();
        for (_, view) in self.pending_views.drain() {
            self.driver.destroy_image_view(view);
        }
    }

    fn write(
        &mut self,
        ty: ResourceType,
        binding: u32,
        first_element: u32,
        resources: &[BindingResource<'_, Vulkan>],
    ) -> Result<(), Error> {
        let slot = self.core.check(ty, binding, first_element, resources)?.clone();
        let Some(allocation) = self.allocation else {
            return Err(reject(Error::SlotNotFound {
                ty,
                binding,
                space: self.core.space(),
            }));
        };
        let (dst_binding, _) = binding_range(
            &self.root.config.binding_shift,
            ty,
            binding,
            self.core.space(),
            slot.array_size,
        )?;
        let descriptor_type = descriptor_type(&slot);
        let mut writes: Vec<(BindingKey, ResourceId, DescriptorWrite)> = Vec::with_capacity(resources.len());
        let mut created: Vec<(BindingKey, Option<vk::ImageView>)> = Vec::with_capacity(resources.len());
        for (i, resource) in resources.iter().enumerate() {
            let element = first_element + i as u32;
            let key = BindingKey { ty, binding, element };
            let info = match self.descriptor_info(ty, resource) {
                Ok((info, view)) => {
                    created.push((key, view));
                    info
                }
                Err(e) => {
                    // nothing of this write is staged, so neither are its views
                    for view in created.into_iter().filter_map(|(_, v)| v) {
                        self.driver.destroy_image_view(view);
                    }
                    return Err(e);
                }
            };
            writes.push((
                key,
                resource.id(),
                DescriptorWrite {
                    dst_set: allocation.set,
                    dst_binding,
                    dst_array_element: element,
                    descriptor_type,
                    info,
                },
            ));
        }
        for (key, id, write) in writes {
            self.core.stage(key, id, write);
        }
        // a restaged element drops the view of its earlier write
        for (key, view) in created {
            let replaced = match view {
                Some(view) => self.pending_views.insert(key, view),
                None => self.pending_views.remove(&key),
            };
            if let Some(old) = replaced {
                self.driver.destroy_image_view(old);
            }
        }
        Ok(())
    }

    fn end_update(&mut self) -> Result<(), Error> {
        let staged = self.core.end_update();
        if !staged.is_empty() {
            let writes: Vec<DescriptorWrite> = staged.iter().map(|s| s.write).collect();
            self.driver.update_descriptor_sets(&writes);
            logwise::trace_sync!(
                "{label}: {count} descriptor writes flushed",
                label = logwise::privacy::LogIt(&self.core.label()),
                count = writes.len()
            );
        }
        for entry in &staged {
            let replaced = match self.pending_views.remove(&entry.key) {
                Some(view) => self.views.insert(entry.key, view),
                None => self.views.remove(&entry.key),
            };
            if let Some(old) = replaced {
                self.driver.destroy_image_view(old);
            }
        }
        self.core.commit(staged);
        Ok(())
    }

    fn set_root_constants(&mut self, binding: u32, data: &[u8]) -> Result<(), Error> {
        self.core.set_root_constants(binding, data)
    }

    fn root_constants(&self, binding: u32) -> Option<&[u8]> {
        self.core.root_constant_data(binding)
    }

    fn bound_resource(&self, ty: ResourceType, binding: u32, element: u32) -> Option<ResourceId> {
        self.core.bound_resource(ty, binding, element)
    }
}

impl Drop for BindGroup {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.pools.free(allocation);
        }
        for (_, view) in self.views.drain().chain(self.pending_views.drain()) {
            self.driver.destroy_image_view(view);
        }
    }
}
