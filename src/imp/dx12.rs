// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The DirectX 12 backend.

Each register type has its own namespace, so HLSL registers pass through unchanged.  A root
signature holds the root constants first, then per space a CBV/SRV/UAV descriptor table and a
sampler table; a space holding a single constant buffer is lowered to an inline root CBV.
Descriptors are sub-allocated from one shader-visible heap per type and bind groups fill their
ranges with `CopyDescriptors`.

Barriers are `D3D12_RESOURCE_STATES` transitions.  The render encoder is a render pass, and
transitions inside one end the pass; the next draw begins it again with `PRESERVE` access.

All native calls go through [`Driver`].  [`NullDriver`] records them instead of executing them.
*/

mod barrier;
mod bind_group;
mod command_list;
mod descriptor_heap;
mod device;
mod driver;
mod native;
mod queue;
mod resources;
mod root_signature;

pub use barrier::{queue_states, resource_states};
pub use bind_group::BindGroup;
pub use command_list::CommandList;
pub use device::Device;
pub use driver::{Driver, DriverCall, NullDriver, Submission};
pub use native::*;
pub use queue::{Fence, Queue, Semaphore, SwapChain};
pub use resources::{Buffer, Pipeline, Sampler, Texture};
pub use root_signature::{
    plan, range_type, shader_visibility, RootSignature, RootSignaturePlan, SpaceParameters, MAX_ROOT_DWORDS,
};

/// Marker type selecting the DirectX 12 backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dx12;

impl crate::backend::Backend for Dx12 {
    const NAME: &'static str = "dx12";
    type Device = Device;
    type Buffer = Buffer;
    type Texture = Texture;
    type Sampler = Sampler;
    type RootSignature = RootSignature;
    type BindGroup = BindGroup;
    type Pipeline = Pipeline;
    type CommandList = CommandList;
    type Queue = Queue;
    type Fence = Fence;
    type Semaphore = Semaphore;
    type SwapChain = SwapChain;
}
