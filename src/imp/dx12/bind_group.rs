// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Bind groups as ranges of the shader-visible descriptor heaps.

A group owns one range in the CBV/SRV/UAV heap and one in the sampler heap, sized from its
space's descriptor tables.  Writes create views in a CPU-only staging heap; `end_update` copies
the whole batch into the group's ranges with one `CopyDescriptors` call and then releases the
staging descriptors.  A space lowered to an inline root CBV has no table and just records the
buffer's GPU address.
*/

use super::Dx12;
use super::descriptor_heap::{DeviceHeaps, HeapAllocation};
use super::driver::Driver;
use super::native::{
    CONSTANT_BUFFER_DATA_PLACEMENT_ALIGNMENT, CpuDescriptorHandle, DescriptorCopy, DescriptorHeapType,
    GpuDescriptorHandle, ResourceHandle, ViewDesc,
};
use super::resources::{Buffer, Texture};
use super::root_signature::{RootSignature, RootSignatureInner, SpaceParameters};
use crate::backend::{GpuBuffer, GpuTexture};
use crate::bindings::bind_group::{self, BindGroupCore, BindingKey, BindingResource};
use crate::bindings::slot::{ResourceBindingSlot, ResourceType};
use crate::error::{reject, Error};
use crate::resources::{ResourceId, SubresourceRange};
use std::sync::Arc;

/// The native payload of one staged write.
#[derive(Debug)]
pub(crate) enum Dx12Write {
    Descriptor {
        dst: CpuDescriptorHandle,
        src: CpuDescriptorHandle,
        heap_type: DescriptorHeapType,
        /// Released once the descriptor has been copied.
        staging: Option<HeapAllocation>,
    },
    RootCbv {
        address: u64,
    },
}

/// What a command list keeps of a bind group at bind time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GroupBinding {
    /// `(root parameter, table start)`.
    pub(crate) tables: Vec<(u32, GpuDescriptorHandle)>,
    /// `(root parameter, GPU address)`.
    pub(crate) root_cbv: Option<(u32, u64)>,
    /// `(root parameter, 32-bit values)`.
    pub(crate) root_constants: Vec<(u32, Vec<u32>)>,
}

/// A validated element write, before any descriptor is created.
enum Source {
    View { resource: ResourceHandle, view: ViewDesc },
    Sampler(CpuDescriptorHandle),
    RootCbv(u64),
}

/**
The descriptors of one register space.

Groups for the root-constant space own no table; they only carry `SetRoot32BitConstants` data.
*/
#[derive(Debug)]
pub struct BindGroup {
    core: BindGroupCore<Dx12Write>,
    root: Arc<RootSignatureInner>,
    params: SpaceParameters,
    resource_table: Option<HeapAllocation>,
    sampler_table: Option<HeapAllocation>,
    root_cbv: Option<u64>,
    heaps: Arc<DeviceHeaps>,
    driver: Arc<dyn Driver>,
}

fn misaligned_cbv(slot: &ResourceBindingSlot, name: &str) -> Error {
    reject(Error::DescriptorTypeMismatch {
        ty: slot.ty,
        binding: slot.binding,
        resource: name.to_string(),
        reason: "constant buffer offset must be a multiple of 256",
    })
}

fn buffer_view(slot: &ResourceBindingSlot, buffer: &Buffer, offset: u64, size: u64) -> Result<ViewDesc, Error> {
    let name = &buffer.desc().debug_name;
    if slot.ty == ResourceType::ConstantBuffer {
        if offset % CONSTANT_BUFFER_DATA_PLACEMENT_ALIGNMENT != 0 {
            return Err(misaligned_cbv(slot, name));
        }
        return Ok(ViewDesc::Cbv {
            location: buffer.gpu_address() + offset,
            size_in_bytes: size.next_multiple_of(CONSTANT_BUFFER_DATA_PLACEMENT_ALIGNMENT) as u32,
        });
    }
    let stride = buffer.desc().stride;
    // structured views count elements, raw views count 32-bit words
    let unit = if stride > 0 { stride as u64 } else { 4 };
    if offset % unit != 0 {
        return Err(reject(Error::DescriptorTypeMismatch {
            ty: slot.ty,
            binding: slot.binding,
            resource: name.to_string(),
            reason: "buffer view offset is not a multiple of the element size",
        }));
    }
    let first_element = offset / unit;
    let num_elements = (size / unit) as u32;
    Ok(match slot.ty {
        ResourceType::UnorderedAccess => ViewDesc::BufferUav {
            first_element,
            num_elements,
            stride,
        },
        _ => ViewDesc::BufferSrv {
            first_element,
            num_elements,
            stride,
        },
    })
}

fn texture_view(ty: ResourceType, texture: &Texture, range: SubresourceRange) -> ViewDesc {
    let format = texture.desc().format;
    match ty {
        ResourceType::UnorderedAccess => ViewDesc::TextureUav {
            format,
            mip: range.base_mip,
            first_layer: range.base_layer,
            layers: range.layer_count,
        },
        _ => ViewDesc::TextureSrv { format, range },
    }
}

impl BindGroup {
    pub(crate) fn new(
        root: &RootSignature,
        space: u32,
        heaps: Arc<DeviceHeaps>,
        driver: Arc<dyn Driver>,
    ) -> Result<Self, Error> {
        let core = BindGroupCore::new(root.inner.layout.clone(), space, format!("dx12 space {space}"))?;
        let params = root.space(space).cloned().unwrap_or_default();
        let resource_table = match params.resource_descriptors {
            0 => None,
            n => Some(heaps.shader_resources.allocate(n)?),
        };
        let sampler_table = match params.sampler_descriptors {
            0 => None,
            n => Some(heaps.shader_samplers.allocate(n)?),
        };
        Ok(BindGroup {
            core,
            root: root.inner.clone(),
            params,
            resource_table,
            sampler_table,
            root_cbv: None,
            heaps,
            driver,
        })
    }

    /// The start of the CBV/SRV/UAV table in the shader-visible heap.
    pub fn resource_table(&self) -> Option<GpuDescriptorHandle> {
        self.resource_table.as_ref().and_then(|t| t.gpu(0))
    }

    pub fn sampler_table(&self) -> Option<GpuDescriptorHandle> {
        self.sampler_table.as_ref().and_then(|t| t.gpu(0))
    }

    /// The CPU handle of the shader-visible descriptor for one slot element.
    pub fn descriptor(&self, ty: ResourceType, binding: u32, element: u32) -> Option<CpuDescriptorHandle> {
        let offset = *self.params.offsets.get(&(ty, binding))?;
        let table = match ty {
            ResourceType::Sampler => self.sampler_table.as_ref()?,
            _ => self.resource_table.as_ref()?,
        };
        Some(table.cpu(offset + element))
    }

    pub fn root_cbv_address(&self) -> Option<u64> {
        self.root_cbv
    }

    fn table_entry(&self, ty: ResourceType, binding: u32, element: u32) -> Result<CpuDescriptorHandle, Error> {
        self.descriptor(ty, binding, element).ok_or_else(|| {
            reject(Error::SlotNotFound {
                ty,
                binding,
                space: self.core.space(),
            })
        })
    }

    pub(crate) fn snapshot(&self) -> GroupBinding {
        let mut tables = Vec::new();
        if let (Some(param), Some(base)) = (self.params.resource_table, self.resource_table()) {
            tables.push((param, base));
        }
        if let (Some(param), Some(base)) = (self.params.sampler_table, self.sampler_table()) {
            tables.push((param, base));
        }
        let root_constants = self
            .core
            .root_constants()
            .iter()
            .filter_map(|(binding, data)| {
                let param = *self.root.plan.root_constants.get(binding)?;
                let values = data
                    .chunks_exact(4)
                    .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
                    .collect();
                Some((param, values))
            })
            .collect();
        GroupBinding {
            tables,
            root_cbv: self.params.inline_cbv.zip(self.root_cbv),
            root_constants,
        }
    }

    fn source(&self, slot: &ResourceBindingSlot, resource: &BindingResource<'_, Dx12>) -> Result<Source, Error> {
        if let Some((buffer, offset, size)) = resource.buffer() {
            if self.params.inline_cbv.is_some() {
                if offset % CONSTANT_BUFFER_DATA_PLACEMENT_ALIGNMENT != 0 {
                    return Err(misaligned_cbv(slot, &buffer.desc().debug_name));
                }
                return Ok(Source::RootCbv(buffer.gpu_address() + offset));
            }
            return Ok(Source::View {
                resource: buffer.resource(),
                view: buffer_view(slot, buffer, offset, size)?,
            });
        }
        if let Some((texture, range)) = resource.texture() {
            return Ok(Source::View {
                resource: texture.resource(),
                view: texture_view(slot.ty, texture, range),
            });
        }
        match resource.sampler() {
            Some(sampler) => Ok(Source::Sampler(sampler.descriptor())),
            None => Err(Error::Driver("binding resource is neither buffer, texture nor sampler".to_string())),
        }
    }
}

impl bind_group::BindGroup for BindGroup {
    type Backend = Dx12;

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
        resources: &[BindingResource<'_, Dx12>],
    ) -> Result<(), Error> {
        let slot = self.core.check(ty, binding, first_element, resources)?.clone();
        // every element is validated before a staging descriptor is created
        let mut sources = Vec::with_capacity(resources.len());
        for resource in resources {
            sources.push((resource.id(), self.source(&slot, resource)?));
        }
        let mut writes: Vec<(BindingKey, ResourceId, Dx12Write)> = Vec::with_capacity(sources.len());
        for (i, (id, source)) in sources.into_iter().enumerate() {
            let element = first_element + i as u32;
            let write = match source {
                Source::RootCbv(address) => Dx12Write::RootCbv { address },
                Source::Sampler(src) => Dx12Write::Descriptor {
                    dst: self.table_entry(ty, binding, element)?,
                    src,
                    heap_type: DescriptorHeapType::Sampler,
                    staging: None,
                },
                Source::View { resource, view } => {
                    let dst = self.table_entry(ty, binding, element)?;
                    let staging = self.heaps.staging_resources.allocate(1)?;
                    let src = staging.cpu(0);
                    self.driver.create_view(src, Some(resource), &view);
                    Dx12Write::Descriptor {
                        dst,
                        src,
                        heap_type: staging.heap_type(),
                        staging: Some(staging),
                    }
                }
            };
            writes.push((BindingKey { ty, binding, element }, id, write));
        }
        for (key, id, write) in writes {
            self.core.stage(key, id, write);
        }
        Ok(())
    }

    fn end_update(&mut self) -> Result<(), Error> {
        let mut staged = self.core.end_update();
        let mut copies = Vec::new();
        let mut released = Vec::new();
        for entry in &mut staged {
            match &mut entry.write {
                Dx12Write::Descriptor {
                    dst,
                    src,
                    heap_type,
                    staging,
                } => {
                    copies.push(DescriptorCopy {
                        dst: *dst,
                        src: *src,
                        heap_type: *heap_type,
                    });
                    released.extend(staging.take());
                }
                Dx12Write::RootCbv { address } => self.root_cbv = Some(*address),
            }
        }
        if !copies.is_empty() {
            self.driver.copy_descriptors(&copies);
            logwise::trace_sync!(
                "{label}: {count} descriptors copied",
                label = logwise::privacy::LogIt(&self.core.label()),
                count = copies.len()
            );
        }
        // staging descriptors are dead once copied
        drop(released);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::bind_group::BindGroup as _;
    use crate::bindings::root_signature_desc::{RootConstantRange, RootSignatureDesc};
    use crate::bindings::slot::ResourceBindingSlot;
    use crate::config::RhiConfig;
    use crate::imp::dx12::driver::NullDriver;
    use crate::resources::{BufferDesc, BufferUsage, Format, TextureDesc, TextureUsage};

    struct Fixture {
        driver: Arc<NullDriver>,
        heaps: Arc<DeviceHeaps>,
        root: RootSignature,
    }

    impl Fixture {
        fn new(desc: RootSignatureDesc) -> Self {
            let driver = Arc::new(NullDriver::new());
            let dyn_driver: Arc<dyn Driver> = driver.clone();
            let config = Arc::new(RhiConfig::default());
            let heaps = Arc::new(DeviceHeaps::new(&dyn_driver, &config.dx12).unwrap());
            let root = RootSignature::build(dyn_driver, config, &desc).unwrap();
            Fixture { driver, heaps, root }
        }

        fn group(&self, space: u32) -> BindGroup {
            BindGroup::new(&self.root, space, self.heaps.clone(), self.driver.clone()).unwrap()
        }

        fn constant_buffer(&self) -> Buffer {
            let desc = BufferDesc::new("constants", 512, BufferUsage::CONSTANT);
            Buffer::new(self.driver.clone(), &desc, ResourceHandle(0x50), 0x1_0000_0000)
        }

        fn texture(&self, name: &str) -> Texture {
            let desc = TextureDesc::new_2d(name, 4, 4, Format::Rgba8Unorm, TextureUsage::SHADER_RESOURCE);
            Texture::new(self.driver.clone(), desc, ResourceHandle(0x60), None, None, false)
        }
    }

    fn table_space() -> RootSignatureDesc {
        RootSignatureDesc::new()
            .slot(ResourceBindingSlot::new(ResourceType::ConstantBuffer, 0, 0))
            .slot(ResourceBindingSlot::new(ResourceType::ShaderResource, 0, 0).with_array_size(2))
    }

    #[test]
    fn one_copy_per_update_and_staging_released() {
        let fixture = Fixture::new(table_space());
        let mut group = fixture.group(0);
        let buffer = fixture.constant_buffer();
        let (a, b) = (fixture.texture("a"), fixture.texture("b"));
        let free = fixture.heaps.staging_resources.free_descriptors();

        group.begin_update();
        group.cbv(0, &buffer).unwrap();
        group.srv_array(0, &[(&a).into(), (&b).into()]).unwrap();
        assert_eq!(fixture.heaps.staging_resources.free_descriptors(), free - 3);
        assert!(fixture.driver.descriptor_copies().is_empty());
        group.end_update().unwrap();

        let copies = fixture.driver.descriptor_copies();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].len(), 3);
        assert_eq!(fixture.heaps.staging_resources.free_descriptors(), free);

        let cbv_slot = group.descriptor(ResourceType::ConstantBuffer, 0, 0).unwrap();
        let cbv = copies[0].iter().find(|c| c.dst == cbv_slot).unwrap();
        assert_eq!(
            fixture.driver.view_at(cbv.src),
            Some((
                Some(ResourceHandle(0x50)),
                ViewDesc::Cbv {
                    location: 0x1_0000_0000,
                    size_in_bytes: 512
                }
            ))
        );
        assert_eq!(group.bound_resource(ResourceType::ShaderResource, 0, 1), Some(b.id()));
    }

    #[test]
    fn misaligned_constant_buffer_offset_is_rejected() {
        let fixture = Fixture::new(table_space());
        let mut group = fixture.group(0);
        let buffer = fixture.constant_buffer();
        let free = fixture.heaps.staging_resources.free_descriptors();

        group.begin_update();
        let err = group
            .cbv(
                0,
                BindingResource::BufferRange {
                    buffer: &buffer,
                    offset: 128,
                    size: 128,
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::DescriptorTypeMismatch { binding: 0, .. }));
        group.end_update().unwrap();
        assert_eq!(fixture.heaps.staging_resources.free_descriptors(), free);
        assert!(fixture.driver.descriptor_copies().is_empty());
        assert_eq!(group.bound_resource(ResourceType::ConstantBuffer, 0, 0), None);
    }

    #[test]
    fn lone_constant_buffer_space_records_an_address() {
        let fixture = Fixture::new(
            RootSignatureDesc::new().slot(ResourceBindingSlot::new(ResourceType::ConstantBuffer, 0, 1)),
        );
        let mut group = fixture.group(1);
        let buffer = fixture.constant_buffer();
        group.begin_update();
        group
            .cbv(
                0,
                BindingResource::BufferRange {
                    buffer: &buffer,
                    offset: 256,
                    size: 256,
                },
            )
            .unwrap();
        group.end_update().unwrap();

        let param = fixture.root.space(1).and_then(|s| s.inline_cbv).unwrap();
        assert_eq!(group.root_cbv_address(), Some(0x1_0000_0100));
        let binding = group.snapshot();
        assert_eq!(binding.root_cbv, Some((param, 0x1_0000_0100)));
        assert!(binding.tables.is_empty());
        assert!(fixture.driver.descriptor_copies().is_empty());
    }

    #[test]
    fn root_constants_become_32_bit_values() {
        let fixture = Fixture::new(RootSignatureDesc::new().root_constant(RootConstantRange::new(0, 0, 8)));
        let space = fixture.root.layout().root_constant_space();
        let mut group = fixture.group(space);
        group.set_root_constants(0, &[1, 0, 0, 0, 2, 0, 0, 0]).unwrap();
        let param = fixture.root.root_constant_parameter(0).unwrap();
        assert_eq!(group.snapshot().root_constants, vec![(param, vec![1, 2])]);
    }
}
