// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The Vulkan backend.

Register spaces become descriptor sets (set index = space), and register types share one binding
namespace per set, separated by the [`BindingShift`](crate::config::BindingShift) constants.
Root constants become push constants.  Barriers are derived from the tracked usage into explicit
access masks, stage masks and image layouts.

Vulkan has no typed encoders, so only the render encoder has a native counterpart
(`vkCmdBeginRendering`/`vkCmdEndRendering`).  Vulkan also does not allow general barriers inside
a rendering instance, so any barrier recorded while rendering ends the instance; the next graphics
operation resumes it.

All native calls go through [`Driver`].  [`NullDriver`] records them instead of executing them.
*/

mod barrier;
mod bind_group;
mod command_list;
mod descriptor_pool;
mod device;
mod driver;
mod layout;
mod native;
mod queue;
mod resources;

pub use barrier::{access_flags, image_layout, pipeline_stages};
pub use bind_group::BindGroup;
pub use command_list::CommandList;
pub use device::Device;
pub use driver::{Driver, DriverCall, NullDriver, Submission};
pub use layout::{descriptor_type, shader_stages, shifted_binding, RootSignature, SetLayout};
pub use native::*;
pub use queue::{Fence, Queue, Semaphore, SwapChain};
pub use resources::{Buffer, Pipeline, Sampler, Texture};

/// Marker type selecting the Vulkan backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Vulkan;

impl crate::backend::Backend for Vulkan {
    const NAME: &'static str = "vulkan";
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
