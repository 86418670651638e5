// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use super::Metal;
use super::arena::{ArgumentAllocation, ArgumentArena};
use super::driver::Driver;
use super::layout::{RootSignature, RootSignatureInner};
use super::native::{ArgumentValue, ArgumentWrite, BufferHandle, RenderStages, ResidentResource, TextureHandle};
use crate::backend::GpuTexture;
use crate::bindings::bind_group::{self, BindGroupCore, BindingKey, BindingResource};
use crate::bindings::slot::{ResourceType, ShaderStages};
use crate::error::{reject, Error};
use crate::resources::ResourceId;
use std::collections::BTreeSet;
use std::sync::Arc;

/// The render stages that see a binding visible to `stages`.
pub fn render_stages(stages: ShaderStages) -> RenderStages {
    let mut render = RenderStages::empty();
    if stages.intersects(ShaderStages::VERTEX | ShaderStages::HULL | ShaderStages::DOMAIN | ShaderStages::GEOMETRY) {
        render |= RenderStages::VERTEX;
    }
    if stages.contains(ShaderStages::PIXEL) {
        render |= RenderStages::FRAGMENT;
    }
    if stages.contains(ShaderStages::AMPLIFICATION) {
        render |= RenderStages::OBJECT;
    }
    if stages.contains(ShaderStages::MESH) {
        render |= RenderStages::MESH;
    }
    render
}

/**
An argument buffer for one register space.

The argument buffer is a range of the device's arena.  Groups for the root-constant space, and
spaces holding only static samplers, have none.
*/
#[derive(Debug)]
pub struct BindGroup {
    core: BindGroupCore<ArgumentWrite>,
    root: Arc<RootSignatureInner>,
    allocation: Option<ArgumentAllocation>,
    /// Views created for subresource bindings, released with the group.
    views: Vec<TextureHandle>,
    driver: Arc<dyn Driver>,
}

/// What a command list keeps of a bind group at bind time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GroupBinding {
    /// (buffer index, arena buffer, offset)
    pub(crate) argument_buffer: Option<(u32, BufferHandle, u64)>,
    pub(crate) stages: RenderStages,
    /// (offset in the root-constant block, data)
    pub(crate) root_constants: Vec<(u32, Vec<u8>)>,
    pub(crate) read: Vec<ResidentResource>,
    pub(crate) read_write: Vec<ResidentResource>,
}

impl BindGroup {
    pub(crate) fn new(
        root: &RootSignature,
        space: u32,
        arena: &Arc<ArgumentArena>,
        driver: Arc<dyn Driver>,
    ) -> Result<Self, Error> {
        let core = BindGroupCore::new(root.inner.layout.clone(), space, format!("metal argument buffer {space}"))?;
        let allocation = match root.inner.argument_buffer(space) {
            Some(layout) if layout.encoded_length > 0 => Some(arena.allocate(layout.encoded_length)?),
            _ => None,
        };
        Ok(BindGroup {
            core,
            root: root.inner.clone(),
            allocation,
            views: Vec::new(),
            driver,
        })
    }

    /// The arena buffer and offset of this group's argument buffer.
    pub fn argument_buffer(&self) -> Option<(BufferHandle, u64)> {
        self.allocation.as_ref().map(|a| (a.buffer(), a.offset()))
    }

    pub(crate) fn snapshot(&self) -> GroupBinding {
        let argument_buffer = match (&self.allocation, self.root.argument_buffer(self.core.space())) {
            (Some(allocation), Some(layout)) => Some((layout.buffer_index, allocation.buffer(), allocation.offset())),
            _ => None,
        };
        let mut stages = self
            .core
            .space_layout()
            .map(|space| {
                space
                    .slots
                    .iter()
                    .fold(RenderStages::empty(), |acc, slot| acc | render_stages(slot.stages))
            })
            .unwrap_or(RenderStages::empty());
        if stages.is_empty() {
            stages = RenderStages::VERTEX | RenderStages::FRAGMENT;
        }
        let root_constants = self
            .core
            .root_constants()
            .iter()
            .filter_map(|(binding, data)| {
                self.root
                    .layout
                    .root_constant(*binding)
                    .map(|range| (range.offset, data.clone()))
            })
            .collect();
        let mut read = BTreeSet::new();
        let mut read_write = BTreeSet::new();
        for staged in self.core.bound() {
            let resident = match staged.write.value {
                ArgumentValue::Buffer { buffer, .. } => ResidentResource::Buffer(buffer),
                ArgumentValue::Texture(texture) => ResidentResource::Texture(texture),
                ArgumentValue::Sampler(_) => continue,
            };
            if staged.key.ty == ResourceType::UnorderedAccess {
                read_write.insert(resident);
            } else {
                read.insert(resident);
            }
        }
        let read = read.difference(&read_write).copied().collect();
        GroupBinding {
            argument_buffer,
            stages,
            root_constants,
            read,
            read_write: read_write.into_iter().collect(),
        }
    }

    fn argument_value(&mut self, resource: &BindingResource<'_, Metal>) -> Result<ArgumentValue, Error> {
        if let Some((buffer, offset, _)) = resource.buffer() {
            return Ok(ArgumentValue::Buffer {
                buffer: buffer.handle(),
                offset,
            });
        }
        if let Some((texture, range)) = resource.texture() {
            if range.covers(texture.desc()) {
                return Ok(ArgumentValue::Texture(texture.handle()));
            }
            let view = self.driver.new_texture_view(texture.handle(), texture.desc(), &range)?;
            self.views.push(view);
            return Ok(ArgumentValue::Texture(view));
        }
        match resource.sampler() {
            Some(sampler) => Ok(ArgumentValue::Sampler(sampler.handle())),
            None => Err(Error::Driver("binding resource is neither buffer, texture nor sampler".to_string())),
        }
    }
}

impl bind_group::BindGroup for BindGroup {
    type Backend = Metal;

    fn space(&self) -> u32 {
        self.core.space()
    }

    fn begin_update(&mut self) {
        self.core.begin_update();
    }

    fn write(
        &mut self,
        ty: ResourceType,
        binding: u32,
        first_element: u32,
        resources: &[BindingResource<'_, Metal>],
    ) -> Result<(), Error> {
        self.core.check(ty, binding, first_element, resources)?;
        let space = self.core.space();
        let (argument_buffer, base_offset) = match &self.allocation {
            Some(allocation) => (allocation.buffer(), allocation.offset()),
            None => return Err(reject(Error::SlotNotFound { ty, binding, space })),
        };
        let Some(first_id) = self
            .root
            .argument_buffer(space)
            .and_then(|layout| layout.argument(ty, binding))
            .map(|argument| argument.descriptor.index)
        else {
            return Err(reject(Error::SlotNotFound { ty, binding, space }));
        };
        let mut writes: Vec<(BindingKey, ResourceId, ArgumentWrite)> = Vec::with_capacity(resources.len());
        for (i, resource) in resources.iter().enumerate() {
            let element = first_element + i as u32;
            let value = self.argument_value(resource)?;
            writes.push((
                BindingKey { ty, binding, element },
                resource.id(),
                ArgumentWrite {
                    argument_buffer,
                    base_offset,
                    id: first_id + element,
                    value,
                },
            ));
        }
        for (key, id, write) in writes {
            self.core.stage(key, id, write);
        }
        Ok(())
    }

    fn end_update(&mut self) -> Result<(), Error> {
        let staged = self.core.end_update();
        if !staged.is_empty() {
            let writes: Vec<ArgumentWrite> = staged.iter().map(|s| s.write).collect();
            self.driver.encode_arguments(&writes);
            logwise::trace_sync!(
                "{label}: {count} arguments encoded",
                label = logwise::privacy::LogIt(&self.core.label()),
                count = writes.len()
            );
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
        self.allocation.take();
        for view in self.views.drain(..) {
            self.driver.release_texture(view);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Device as _;
    use crate::bindings::bind_group::BindGroup as _;
    use crate::bindings::root_signature_desc::{RootConstantRange, RootSignatureDesc};
    use crate::bindings::slot::{BindingDimension, ResourceBindingSlot};
    use crate::config::RhiConfig;
    use crate::imp::metal::{Device, DriverCall, NullDriver};
    use crate::resources::{BufferDesc, BufferUsage, Format, SubresourceRange, TextureDesc, TextureUsage};

    fn device() -> (Arc<NullDriver>, Device) {
        let driver = Arc::new(NullDriver::new());
        let device = Device::new(driver.clone(), RhiConfig::default()).unwrap();
        (driver, device)
    }

    #[test]
    fn update_encodes_once_with_dense_ids() {
        let (driver, device) = device();
        let root = device
            .create_root_signature(
                &RootSignatureDesc::new()
                    .slot(ResourceBindingSlot::new(ResourceType::ConstantBuffer, 0, 0))
                    .slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 0).with_array_size(4)),
            )
            .unwrap();
        let buffer = device
            .create_buffer(&BufferDesc::new("constants", 256, BufferUsage::CONSTANT))
            .unwrap();
        let textures: Vec<_> = (0..2)
            .map(|i| {
                device
                    .create_texture(&TextureDesc::new_2d(
                        &format!("t{i}"),
                        4,
                        4,
                        Format::Rgba8Unorm,
                        TextureUsage::SHADER_RESOURCE,
                    ))
                    .unwrap()
            })
            .collect();
        let mut group = device.create_bind_group(&root, 0).unwrap();
        driver.clear_calls();
        group.begin_update();
        group.cbv(0, &buffer).unwrap();
        group.srv_array_index(0, 2, &textures[1]).unwrap();
        group.srv_array_index(0, 3, &textures[0]).unwrap();
        group.end_update().unwrap();
        let encodes = driver.argument_encodes();
        assert_eq!(encodes.len(), 1);
        let ids: Vec<u32> = encodes[0].iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![0, 3, 4]);
        assert_eq!(
            encodes[0][1].value,
            ArgumentValue::Texture(textures[1].handle())
        );
    }

    #[test]
    fn residency_follows_register_type() {
        let (_driver, device) = device();
        let root = device
            .create_root_signature(
                &RootSignatureDesc::new()
                    .slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 0).with_dimension(BindingDimension::Buffer))
                    .slot(ResourceBindingSlot::new(ResourceType::UnorderedAccess, 0, 0).with_dimension(BindingDimension::Buffer))
                    .slot(ResourceBindingSlot::new(ResourceType::Sampler, 0, 0)),
            )
            .unwrap();
        let input = device
            .create_buffer(&BufferDesc::new("input", 64, BufferUsage::SHADER_RESOURCE | BufferUsage::UNORDERED_ACCESS))
            .unwrap();
        let output = device
            .create_buffer(&BufferDesc::new("output", 64, BufferUsage::SHADER_RESOURCE | BufferUsage::UNORDERED_ACCESS))
            .unwrap();
        let sampler = device.create_sampler(&Default::default()).unwrap();
        let mut group = device.create_bind_group(&root, 0).unwrap();
        group.begin_update();
        group.srv(0, &input).unwrap();
        group.uav(0, &output).unwrap();
        group.sampler(0, &sampler).unwrap();
        group.end_update().unwrap();
        let snapshot = group.snapshot();
        assert_eq!(snapshot.read, vec![ResidentResource::Buffer(input.handle())]);
        assert_eq!(snapshot.read_write, vec![ResidentResource::Buffer(output.handle())]);
        assert_eq!(snapshot.argument_buffer.map(|(index, _, _)| index), Some(16));
    }

    #[test]
    fn subresource_binding_creates_and_releases_a_view() {
        let (driver, device) = device();
        let root = device
            .create_root_signature(&RootSignatureDesc::new().slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 0)))
            .unwrap();
        let texture = device
            .create_texture(
                &TextureDesc::new_2d("mips", 16, 16, Format::Rgba8Unorm, TextureUsage::SHADER_RESOURCE).with_mip_levels(4),
            )
            .unwrap();
        let mut group = device.create_bind_group(&root, 0).unwrap();
        group.begin_update();
        group
            .srv(
                0,
                BindingResource::TextureView {
                    texture: &texture,
                    range: SubresourceRange::mip(2),
                },
            )
            .unwrap();
        group.end_update().unwrap();
        let view = driver.calls().iter().find_map(|c| match c {
            DriverCall::NewTextureView { view, .. } => Some(*view),
            _ => None,
        });
        let view = view.unwrap();
        drop(group);
        assert!(driver.calls().contains(&DriverCall::ReleaseTexture(view)));
    }

    #[test]
    fn root_constant_group_has_no_argument_buffer() {
        let (_driver, device) = device();
        let root = device
            .create_root_signature(
                &RootSignatureDesc::new()
                    .slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 0))
                    .root_constant(RootConstantRange::new(0, 0, 8))
                    .root_constant(RootConstantRange::new(1, 8, 4)),
            )
            .unwrap();
        let mut group = device.create_bind_group(&root, 999).unwrap();
        assert!(group.argument_buffer().is_none());
        group.set_root_constants(1, &[1, 2, 3, 4]).unwrap();
        let snapshot = group.snapshot();
        assert_eq!(snapshot.argument_buffer, None);
        assert_eq!(snapshot.root_constants, vec![(8, vec![1, 2, 3, 4])]);
    }

    #[test]
    fn dropping_a_group_returns_its_range() {
        let (_driver, device) = device();
        let root = device
            .create_root_signature(&RootSignatureDesc::new().slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 0)))
            .unwrap();
        let before = device.free_argument_bytes();
        let group = device.create_bind_group(&root, 0).unwrap();
        assert!(device.free_argument_bytes() < before);
        drop(group);
        assert_eq!(device.free_argument_bytes(), before);
    }

    #[test]
    fn stages_come_from_slot_visibility() {
        assert_eq!(render_stages(ShaderStages::PIXEL), RenderStages::FRAGMENT);
        assert_eq!(
            render_stages(ShaderStages::VERTEX | ShaderStages::GEOMETRY | ShaderStages::PIXEL),
            RenderStages::VERTEX | RenderStages::FRAGMENT
        );
        assert!(render_stages(ShaderStages::COMPUTE).is_empty());
    }
}
