// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Bind groups: the resources bound to one register space of a layout.

Updates are transactional.  Writes issued between [`BindGroup::begin_update`] and
[`BindGroup::end_update`] are validated immediately and staged; `end_update` hands the whole
batch to the backend in a single native call (one `vkUpdateDescriptorSets`, one batch of D3D12
descriptor copies, one argument-buffer encode) and only then makes it visible to
[`BindGroup::bound_resource`].

```
# #[cfg(feature = "backend_vulkan")] {
use rhi::{BindGroup, Device};
use rhi::bindings::root_signature_desc::RootSignatureDesc;
use rhi::bindings::slot::{ResourceBindingSlot, ResourceType};
use rhi::resources::{BufferDesc, BufferUsage};

let device = rhi::vulkan::Device::null(Default::default());
let root = device
    .create_root_signature(
        &RootSignatureDesc::new().slot(ResourceBindingSlot::new(ResourceType::ConstantBuffer, 0, 0)),
    )
    .unwrap();
let buffer = device
    .create_buffer(&BufferDesc::new("constants", 256, BufferUsage::CONSTANT))
    .unwrap();
let mut group = device.create_bind_group(&root, 0).unwrap();
group.begin_update();
group.cbv(0, &buffer).unwrap();
group.end_update().unwrap();
assert_eq!(
    group.bound_resource(ResourceType::ConstantBuffer, 0, 0),
    Some(rhi::GpuBuffer::id(&buffer))
);
# }
```
*/

use crate::backend::{Backend, GpuBuffer, GpuSampler, GpuTexture};
use crate::bindings::layout::{SpaceLayout, ValidatedLayout};
use crate::bindings::slot::{BindingDimension, ResourceBindingSlot, ResourceType};
use crate::error::{fatal, reject, Error};
use crate::resources::{BufferUsage, ResourceId, SubresourceRange, TextureUsage};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A resource handed to a bind-group write.
#[derive(Debug)]
pub enum BindingResource<'a, B: Backend> {
    Buffer(&'a B::Buffer),
    /// A byte range of a buffer.
    BufferRange {
        buffer: &'a B::Buffer,
        offset: u64,
        size: u64,
    },
    Texture(&'a B::Texture),
    /// A mip/layer range of a texture.
    TextureView {
        texture: &'a B::Texture,
        range: SubresourceRange,
    },
    Sampler(&'a B::Sampler),
}

impl<B: Backend> Clone for BindingResource<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<B: Backend> Copy for BindingResource<'_, B> {}

impl<'a, B: Backend> BindingResource<'a, B> {
    pub fn id(&self) -> ResourceId {
        match self {
            BindingResource::Buffer(b) | BindingResource::BufferRange { buffer: b, .. } => b.id(),
            BindingResource::Texture(t) | BindingResource::TextureView { texture: t, .. } => t.id(),
            BindingResource::Sampler(s) => s.id(),
        }
    }

    pub fn name(&self) -> &'a str {
        match *self {
            BindingResource::Buffer(b) | BindingResource::BufferRange { buffer: b, .. } => &b.desc().debug_name,
            BindingResource::Texture(t) | BindingResource::TextureView { texture: t, .. } => &t.desc().debug_name,
            BindingResource::Sampler(s) => &s.desc().debug_name,
        }
    }

    /// The buffer and the `(offset, size)` this resource views, if it is a buffer.
    pub fn buffer(&self) -> Option<(&'a B::Buffer, u64, u64)> {
        match *self {
            BindingResource::Buffer(b) => Some((b, 0, b.desc().size)),
            BindingResource::BufferRange { buffer, offset, size } => Some((buffer, offset, size)),
            _ => None,
        }
    }

    /// The texture and subresource range this resource views, if it is a texture.
    pub fn texture(&self) -> Option<(&'a B::Texture, SubresourceRange)> {
        match *self {
            BindingResource::Texture(t) => Some((t, SubresourceRange::all(t.desc()))),
            BindingResource::TextureView { texture, range } => Some((texture, range)),
            _ => None,
        }
    }

    pub fn sampler(&self) -> Option<&'a B::Sampler> {
        match *self {
            BindingResource::Sampler(s) => Some(s),
            _ => None,
        }
    }
}

/// Checks that `resource` can be written into `slot`, returning the reason if it cannot.
pub(crate) fn descriptor_kind_mismatch<B: Backend>(
    slot: &ResourceBindingSlot,
    resource: &BindingResource<'_, B>,
) -> Option<&'static str> {
    if let Some((buffer, offset, size)) = resource.buffer() {
        if offset.checked_add(size).is_none_or(|end| end > buffer.desc().size) {
            return Some("buffer range exceeds the buffer");
        }
        let usage = buffer.desc().usage;
        return match (slot.ty, slot.dimension) {
            (ResourceType::ConstantBuffer, _) if usage.contains(BufferUsage::CONSTANT) => None,
            (ResourceType::ConstantBuffer, _) => Some("buffer was not created with CONSTANT usage"),
            (ResourceType::ShaderResource, BindingDimension::Buffer)
                if usage.contains(BufferUsage::SHADER_RESOURCE) =>
            {
                None
            }
            (ResourceType::UnorderedAccess, BindingDimension::Buffer)
                if usage.contains(BufferUsage::UNORDERED_ACCESS) =>
            {
                None
            }
            (ResourceType::ShaderResource | ResourceType::UnorderedAccess, BindingDimension::Buffer) => {
                Some("buffer usage does not allow this view")
            }
            (ResourceType::Sampler, _) => Some("slot expects a sampler"),
            (_, BindingDimension::Texture) => Some("slot expects a texture"),
        };
    }
    if let Some((texture, range)) = resource.texture() {
        if !range.within(texture.desc()) {
            return Some("subresource range is outside the texture");
        }
        let usage = texture.desc().usage;
        return match (slot.ty, slot.dimension) {
            (ResourceType::ShaderResource, BindingDimension::Texture)
                if usage.contains(TextureUsage::SHADER_RESOURCE) =>
            {
                None
            }
            (ResourceType::UnorderedAccess, BindingDimension::Texture)
                if usage.contains(TextureUsage::UNORDERED_ACCESS) =>
            {
                None
            }
            (ResourceType::ShaderResource | ResourceType::UnorderedAccess, BindingDimension::Texture) => {
                Some("texture usage does not allow this view")
            }
            (ResourceType::ConstantBuffer, _) => Some("slot expects a constant buffer"),
            (ResourceType::Sampler, _) => Some("slot expects a sampler"),
            (_, BindingDimension::Buffer) => Some("slot expects a buffer"),
        };
    }
    match slot.ty {
        ResourceType::Sampler => None,
        ResourceType::ConstantBuffer => Some("slot expects a constant buffer"),
        _ => Some("samplers can only be bound to sampler slots"),
    }
}

/// Where a staged or committed write lives: register class, binding and array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingKey {
    pub ty: ResourceType,
    pub binding: u32,
    pub element: u32,
}

/// One validated write with the backend's native payload.
#[derive(Debug, Clone)]
pub(crate) struct Staged<W> {
    pub(crate) key: BindingKey,
    pub(crate) resource: ResourceId,
    pub(crate) write: W,
}

/**
Transaction bookkeeping shared by every backend's bind group.

`W` is the backend's native write payload (a descriptor write, a CPU descriptor handle, an
argument-buffer entry).  Pending writes are keyed by [`BindingKey`], so writing the same element
twice within one update keeps the last write.
*/
#[derive(Debug)]
pub(crate) struct BindGroupCore<W> {
    layout: Arc<ValidatedLayout>,
    space: u32,
    label: String,
    updating: bool,
    pending: BTreeMap<BindingKey, Staged<W>>,
    bound: BTreeMap<BindingKey, Staged<W>>,
    root_constants: BTreeMap<u32, Vec<u8>>,
}

impl<W> BindGroupCore<W> {
    pub(crate) fn new(layout: Arc<ValidatedLayout>, space: u32, label: String) -> Result<Self, Error> {
        if layout.space(space).is_none() && space != layout.root_constant_space() {
            return Err(reject(Error::UnknownSpace { space }));
        }
        Ok(BindGroupCore {
            layout,
            space,
            label,
            updating: false,
            pending: BTreeMap::new(),
            bound: BTreeMap::new(),
            root_constants: BTreeMap::new(),
        })
    }

    pub(crate) fn space(&self) -> u32 {
        self.space
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn space_layout(&self) -> Option<&SpaceLayout> {
        self.layout.space(self.space)
    }

    pub(crate) fn begin_update(&mut self) {
        if self.updating {
            fatal!("begin_update on bind group '{}' while an update is already open", self.label);
        }
        self.updating = true;
        self.pending.clear();
    }

    /// Validates a write of `resources` into consecutive elements starting at `first`.
    pub(crate) fn check<B: Backend>(
        &self,
        ty: ResourceType,
        binding: u32,
        first: u32,
        resources: &[BindingResource<'_, B>],
    ) -> Result<&ResourceBindingSlot, Error> {
        if !self.updating {
            fatal!(
                "{}{} written on bind group '{}' outside begin_update/end_update",
                ty.register_letter(),
                binding,
                self.label
            );
        }
        let Some(slot) = self.layout.slot(ty, binding, self.space) else {
            return Err(reject(Error::SlotNotFound {
                ty,
                binding,
                space: self.space,
            }));
        };
        let last = first as u64 + resources.len().max(1) as u64 - 1;
        if last >= slot.array_size as u64 {
            return Err(reject(Error::ArrayIndexOutOfRange {
                binding,
                index: last.min(u32::MAX as u64) as u32,
                array_size: slot.array_size,
            }));
        }
        for resource in resources {
            if let Some(reason) = descriptor_kind_mismatch(slot, resource) {
                return Err(reject(Error::DescriptorTypeMismatch {
                    ty,
                    binding,
                    resource: resource.name().to_string(),
                    reason,
                }));
            }
        }
        Ok(slot)
    }

    pub(crate) fn stage(&mut self, key: BindingKey, resource: ResourceId, write: W) {
        self.pending.insert(key, Staged { key, resource, write });
    }

    /// Closes the transaction and hands back the batch to flush.
    pub(crate) fn end_update(&mut self) -> Vec<Staged<W>> {
        if !self.updating {
            fatal!("end_update on bind group '{}' without begin_update", self.label);
        }
        self.updating = false;
        std::mem::take(&mut self.pending).into_values().collect()
    }

    /// Makes a flushed batch visible.
    pub(crate) fn commit(&mut self, staged: Vec<Staged<W>>) {
        for entry in staged {
            self.bound.insert(entry.key, entry);
        }
    }

    pub(crate) fn set_root_constants(&mut self, binding: u32, data: &[u8]) -> Result<(), Error> {
        let Some(range) = self.layout.root_constant(binding) else {
            return Err(reject(Error::UnknownRootConstant { binding }));
        };
        if data.len() > range.size as usize {
            return Err(reject(Error::RootConstantOverflow {
                binding,
                len: data.len(),
                size: range.size,
            }));
        }
        let mut bytes = vec![0u8; range.size as usize];
        bytes[..data.len()].copy_from_slice(data);
        self.root_constants.insert(binding, bytes);
        Ok(())
    }

    /// Root-constant blocks written so far, by binding.
    pub(crate) fn root_constants(&self) -> &BTreeMap<u32, Vec<u8>> {
        &self.root_constants
    }

    pub(crate) fn root_constant_data(&self, binding: u32) -> Option<&[u8]> {
        self.root_constants.get(&binding).map(Vec::as_slice)
    }

    pub(crate) fn bound_resource(&self, ty: ResourceType, binding: u32, element: u32) -> Option<ResourceId> {
        self.bound
            .get(&BindingKey { ty, binding, element })
            .map(|s| s.resource)
    }

    pub(crate) fn bound(&self) -> impl Iterator<Item = &Staged<W>> {
        self.bound.values()
    }

    pub(crate) fn layout(&self) -> &Arc<ValidatedLayout> {
        &self.layout
    }
}

/**
The application-facing bind-group surface.

Only [`write`](BindGroup::write) is backend specific; the typed helpers below all funnel into
it.  Every write is validated against the slot it targets.  A rejected write is logged, returns
an error and leaves the group exactly as it was.

Writing outside a `begin_update`/`end_update` pair, nesting `begin_update`, and calling
`end_update` without a matching `begin_update` are sequencing errors and panic.
*/
pub trait BindGroup: std::fmt::Debug + Send + Sync {
    type Backend: Backend;

    /// The register space this group binds.
    fn space(&self) -> u32;

    fn begin_update(&mut self);

    /// Stages `resources` into consecutive array elements of `ty` register `binding`, starting
    /// at `first_element`.  Either every element is staged or none is.
    fn write(
        &mut self,
        ty: ResourceType,
        binding: u32,
        first_element: u32,
        resources: &[BindingResource<'_, Self::Backend>],
    ) -> Result<(), Error>;

    /// Flushes the staged batch in one native call and makes it visible.
    fn end_update(&mut self) -> Result<(), Error>;

    /// Copies `data` into the inline block for root-constant register `binding`.
    ///
    /// Bytes past `data.len()` are zero.  May be called at any time; the block is pushed the
    /// next time the group is bound.
    fn set_root_constants(&mut self, binding: u32, data: &[u8]) -> Result<(), Error>;

    fn root_constants(&self, binding: u32) -> Option<&[u8]>;

    /// The resource `end_update` last made visible at the given element, if any.
    fn bound_resource(&self, ty: ResourceType, binding: u32, element: u32) -> Option<ResourceId>;

    fn cbv<'a>(&mut self, binding: u32, resource: impl Into<BindingResource<'a, Self::Backend>>) -> Result<(), Error>
    {
        self.write(ResourceType::ConstantBuffer, binding, 0, &[resource.into()])
    }

    fn srv<'a>(&mut self, binding: u32, resource: impl Into<BindingResource<'a, Self::Backend>>) -> Result<(), Error>
    {
        self.write(ResourceType::ShaderResource, binding, 0, &[resource.into()])
    }

    fn uav<'a>(&mut self, binding: u32, resource: impl Into<BindingResource<'a, Self::Backend>>) -> Result<(), Error>
    {
        self.write(ResourceType::UnorderedAccess, binding, 0, &[resource.into()])
    }

    fn sampler<'a>(
        &mut self,
        binding: u32,
        resource: impl Into<BindingResource<'a, Self::Backend>>,
    ) -> Result<(), Error>
    {
        self.write(ResourceType::Sampler, binding, 0, &[resource.into()])
    }

    /// Writes the whole array starting at element 0.
    fn srv_array(&mut self, binding: u32, resources: &[BindingResource<'_, Self::Backend>]) -> Result<(), Error> {
        self.write(ResourceType::ShaderResource, binding, 0, resources)
    }

    /// Writes one element, leaving the others untouched.
    fn srv_array_index<'a>(
        &mut self,
        binding: u32,
        index: u32,
        resource: impl Into<BindingResource<'a, Self::Backend>>,
    ) -> Result<(), Error>
    {
        self.write(ResourceType::ShaderResource, binding, index, &[resource.into()])
    }
}
