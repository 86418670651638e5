// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Root signatures.

Parameters are laid out in a fixed order so that two layouts with the same slots always produce
the same root signature:

1. one 32-bit-constants parameter per root-constant range, by binding;
2. per register space, ascending:
   * an inline root CBV when the space holds nothing but one non-array constant buffer (and
     [`Dx12Config::inline_root_descriptors`](crate::config::Dx12Config) is on), otherwise
   * a CBV/SRV/UAV table whose ranges follow `(type, binding)` order, then
   * a sampler table if the space has sampler slots.

Static samplers are baked into the signature and take no parameter.  The whole signature must
fit D3D12's 64-DWORD budget.
*/

use super::driver::Driver;
use super::native::{
    DescriptorRange, DescriptorRangeType, RootParameter, RootSignatureHandle, RootSignatureLayout, ShaderVisibility,
    StaticSampler,
};
use crate::bindings::layout::{SpaceLayout, ValidatedLayout};
use crate::bindings::root_signature_desc::RootSignatureDesc;
use crate::bindings::slot::{ResourceType, ShaderStages};
use crate::config::{Dx12Config, RhiConfig};
use crate::error::{reject, Error};
use std::collections::BTreeMap;
use std::sync::Arc;

/// `D3D12_MAX_ROOT_COST`.
pub const MAX_ROOT_DWORDS: u32 = 64;

pub fn range_type(ty: ResourceType) -> DescriptorRangeType {
    match ty {
        ResourceType::ConstantBuffer => DescriptorRangeType::Cbv,
        ResourceType::ShaderResource => DescriptorRangeType::Srv,
        ResourceType::UnorderedAccess => DescriptorRangeType::Uav,
        ResourceType::Sampler => DescriptorRangeType::Sampler,
    }
}

/// A single stage gets its own visibility; anything else is visible to all.
pub fn shader_visibility(stages: ShaderStages) -> ShaderVisibility {
    const SINGLE: [(ShaderStages, ShaderVisibility); 7] = [
        (ShaderStages::VERTEX, ShaderVisibility::Vertex),
        (ShaderStages::HULL, ShaderVisibility::Hull),
        (ShaderStages::DOMAIN, ShaderVisibility::Domain),
        (ShaderStages::GEOMETRY, ShaderVisibility::Geometry),
        (ShaderStages::PIXEL, ShaderVisibility::Pixel),
        (ShaderStages::AMPLIFICATION, ShaderVisibility::Amplification),
        (ShaderStages::MESH, ShaderVisibility::Mesh),
    ];
    SINGLE
        .iter()
        .find(|(stage, _)| *stage == stages)
        .map(|(_, visibility)| *visibility)
        .unwrap_or(ShaderVisibility::All)
}

/// Where one register space lives in the root signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpaceParameters {
    pub resource_table: Option<u32>,
    pub sampler_table: Option<u32>,
    pub inline_cbv: Option<u32>,
    /// Descriptors in the CBV/SRV/UAV table.
    pub resource_descriptors: u32,
    pub sampler_descriptors: u32,
    /// Offset of each slot's first descriptor within its table.
    pub offsets: BTreeMap<(ResourceType, u32), u32>,
}

/// The parameter layout of a root signature and the lookups bind groups need.
#[derive(Debug, Clone, PartialEq)]
pub struct RootSignaturePlan {
    pub layout: RootSignatureLayout,
    pub spaces: BTreeMap<u32, SpaceParameters>,
    /// Root-constant binding to parameter index.
    pub root_constants: BTreeMap<u32, u32>,
}

fn inlinable(space: &SpaceLayout) -> bool {
    matches!(
        space.slots.as_slice(),
        [slot] if slot.ty == ResourceType::ConstantBuffer && slot.array_size == 1
    )
}

/// Lays out the parameters of `layout`.
pub fn plan(layout: &ValidatedLayout, dx12: &Dx12Config) -> Result<RootSignaturePlan, Error> {
    let mut parameters = Vec::new();
    let mut root_constants = BTreeMap::new();
    for range in layout.root_constants() {
        root_constants.insert(range.binding, parameters.len() as u32);
        parameters.push(RootParameter::Constants {
            shader_register: range.binding,
            register_space: layout.root_constant_space(),
            num_32bit_values: range.dwords(),
            visibility: shader_visibility(range.stages),
        });
    }

    let mut spaces = BTreeMap::new();
    let mut static_samplers = Vec::new();
    for space in layout.spaces() {
        let mut params = SpaceParameters::default();
        if dx12.inline_root_descriptors && inlinable(space) {
            let slot = &space.slots[0];
            params.inline_cbv = Some(parameters.len() as u32);
            parameters.push(RootParameter::Cbv {
                shader_register: slot.binding,
                register_space: space.space,
                visibility: shader_visibility(slot.stages),
            });
        } else {
            // (is_sampler) -> (ranges, stages, running offset)
            let mut tables: [(Vec<DescriptorRange>, ShaderStages, u32); 2] =
                [(Vec::new(), ShaderStages::empty(), 0), (Vec::new(), ShaderStages::empty(), 0)];
            for slot in &space.slots {
                let table = &mut tables[(slot.ty == ResourceType::Sampler) as usize];
                params.offsets.insert((slot.ty, slot.binding), table.2);
                table.0.push(DescriptorRange {
                    range_type: range_type(slot.ty),
                    num_descriptors: slot.array_size,
                    base_shader_register: slot.binding,
                    register_space: space.space,
                    offset_in_descriptors_from_table_start: table.2,
                });
                table.1 |= slot.stages;
                table.2 += slot.array_size;
            }
            let [(resource_ranges, resource_stages, resource_count), (sampler_ranges, sampler_stages, sampler_count)] =
                tables;
            if !resource_ranges.is_empty() {
                params.resource_table = Some(parameters.len() as u32);
                params.resource_descriptors = resource_count;
                parameters.push(RootParameter::DescriptorTable {
                    ranges: resource_ranges,
                    visibility: shader_visibility(resource_stages),
                });
            }
            if !sampler_ranges.is_empty() {
                params.sampler_table = Some(parameters.len() as u32);
                params.sampler_descriptors = sampler_count;
                parameters.push(RootParameter::DescriptorTable {
                    ranges: sampler_ranges,
                    visibility: shader_visibility(sampler_stages),
                });
            }
        }
        for sampler in &space.static_samplers {
            static_samplers.push(StaticSampler {
                sampler: sampler.sampler.clone(),
                shader_register: sampler.binding,
                register_space: sampler.space,
                visibility: shader_visibility(sampler.stages),
            });
        }
        spaces.insert(space.space, params);
    }

    let dwords: u32 = parameters.iter().map(RootParameter::dwords).sum();
    if dwords > MAX_ROOT_DWORDS {
        return Err(reject(Error::RootSignatureTooLarge {
            dwords,
            limit: MAX_ROOT_DWORDS,
        }));
    }
    Ok(RootSignaturePlan {
        layout: RootSignatureLayout {
            parameters,
            static_samplers,
            allow_input_assembler: true,
        },
        spaces,
        root_constants,
    })
}

#[derive(Debug)]
pub(crate) struct RootSignatureInner {
    pub(crate) layout: Arc<ValidatedLayout>,
    pub(crate) config: Arc<RhiConfig>,
    pub(crate) plan: RootSignaturePlan,
    pub(crate) handle: RootSignatureHandle,
    driver: Arc<dyn Driver>,
}

impl Drop for RootSignatureInner {
    fn drop(&mut self) {
        self.driver.destroy_root_signature(self.handle);
    }
}

/// An `ID3D12RootSignature` and its parameter plan.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct RootSignature {
    pub(crate) inner: Arc<RootSignatureInner>,
}

impl RootSignature {
    pub(crate) fn build(driver: Arc<dyn Driver>, config: Arc<RhiConfig>, desc: &RootSignatureDesc) -> Result<Self, Error> {
        let layout = Arc::new(ValidatedLayout::new(desc, &config)?);
        let plan = plan(&layout, &config.dx12)?;
        let handle = driver.create_root_signature(&plan.layout)?;
        logwise::info_sync!(
            "dx12 root signature: {params} parameters, {samplers} static samplers",
            params = plan.layout.parameters.len(),
            samplers = plan.layout.static_samplers.len()
        );
        Ok(RootSignature {
            inner: Arc::new(RootSignatureInner {
                layout,
                config,
                plan,
                handle,
                driver,
            }),
        })
    }

    pub fn layout(&self) -> &ValidatedLayout {
        &self.inner.layout
    }

    pub fn handle(&self) -> RootSignatureHandle {
        self.inner.handle
    }

    pub fn parameters(&self) -> &[RootParameter] {
        &self.inner.plan.layout.parameters
    }

    pub fn space(&self, space: u32) -> Option<&SpaceParameters> {
        self.inner.plan.spaces.get(&space)
    }

    /// The parameter index of root-constant register `binding`.
    pub fn root_constant_parameter(&self, binding: u32) -> Option<u32> {
        self.inner.plan.root_constants.get(&binding).copied()
    }
}
