// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The Metal backend.

Every register space is a tier 2 argument buffer at buffer index
`argument_buffer_base_index + space`, with argument ids assigned densely in (type, binding)
order.  Argument buffers are sub-allocated from one arena per device, and bind groups encode
their batch with a single `encode_arguments` call.  Static samplers are not bound at all; they
are reported as `constexpr` samplers.  Root constants of every range share one `set*Bytes` block.

Metal tracks no usage state, so barriers reduce to ordering: a memory barrier inside the current
render or compute encoder when it can absorb the hazard, otherwise an `MTLFence` between the
encoder that ends and the next one.  Each encoder begins with nothing bound, so the binding
cache re-issues the pipeline, argument buffers, residency and root constants after every switch.

All native calls go through [`Driver`].  [`NullDriver`] records them instead of executing them.
*/

mod arena;
mod barrier;
mod bind_group;
mod command_list;
mod device;
mod driver;
mod layout;
mod native;
mod queue;
mod resources;

pub use barrier::{encoder_absorbs, usage_stages, Transition};
pub use bind_group::{render_stages, BindGroup};
pub use command_list::CommandList;
pub use device::Device;
pub use driver::{Driver, DriverCall, NullDriver, Submission};
pub use layout::{access, data_type, ArgumentBufferLayout, ArgumentSlot, RootSignature};
pub use native::*;
pub use queue::{Fence, Queue, Semaphore, SwapChain};
pub use resources::{primitive_type, Buffer, Pipeline, Sampler, Texture};

/// Marker type selecting the Metal backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Metal;

impl crate::backend::Backend for Metal {
    const NAME: &'static str = "metal";
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
