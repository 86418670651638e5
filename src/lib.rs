// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! rhi is a cross-backend GPU command and resource layer.

You describe GPU work once (root signatures, bind groups, command lists, barriers) and execute it
on Vulkan, DirectX 12 or Metal.  The three APIs disagree about almost everything that matters here:

| Concern              | Vulkan                              | DirectX 12                               | Metal                                     |
|----------------------|-------------------------------------|------------------------------------------|-------------------------------------------|
| Binding model        | descriptor sets + push constants    | descriptor heaps + root signatures       | argument buffers + `setBytes`             |
| Binding namespace    | one per set, so register types are shifted apart | one per register type        | one per argument buffer                   |
| Synchronization      | explicit access/stage/layout barriers | resource-state transitions             | encoder fences and memory barriers        |
| Recording            | one command buffer, render passes scoped | one command list, render passes scoped | one typed encoder at a time          |

This crate owns the translation between those models and keeps one contract across them:
bindings are validated against the layout before they reach the driver, every resource's usage
state is tracked so barriers never guess, and a command list behaves the same whichever encoder
restrictions the backend has.

# Layout

* [`bindings`]: the slot model, root-signature descriptions and their validation, usage states,
  the resource-state tracker and the bind-group transaction core.
* [`commands`] and [`encoder`]: the command-list surface and the encoder state machine every
  backend runs.
* [`sync`]: queues, fences, semaphores and swap chains.
* [`vulkan`], [`dx12`], [`metal`]: the backends, each behind its own cargo feature.

# Backends

A backend is a marker type implementing [`Backend`].  Code generic over `B: Backend` is
monomorphised per backend, and a build only contains the backends its features enable.
[`PlatformBackend`] names the natural one for the target.

Each backend reaches its native API through a `Driver` trait.  Every backend also ships a
`NullDriver`, which hands out fake handles, records each call and completes fences at submit.
That is what `Device::null` uses and what the tests run against.

# Debugging

Set `RHI_DUMP_COMMANDS=1` (or [`RhiConfig::with_dump_commands`]) to log every submitted native
command stream at info level.
*/

pub mod backend;
pub mod bindings;
pub mod commands;
pub mod config;
pub mod encoder;
pub mod error;
mod imp;
pub mod pipeline;
mod range_allocator;
pub mod resources;
pub mod sync;

pub use backend::{Backend, Device, GpuBuffer, GpuSampler, GpuTexture};
pub use bindings::bind_group::{BindGroup, BindingResource};
pub use commands::CommandList;
pub use config::RhiConfig;
pub use error::Error;
pub use sync::{Fence, Queue, SwapChain};

#[cfg(feature = "backend_dx12")]
pub use imp::dx12;
#[cfg(feature = "backend_dx12")]
pub use imp::dx12::Dx12;
#[cfg(feature = "backend_metal")]
pub use imp::metal;
#[cfg(feature = "backend_metal")]
pub use imp::metal::Metal;
#[cfg(feature = "backend_vulkan")]
pub use imp::vulkan;
#[cfg(feature = "backend_vulkan")]
pub use imp::vulkan::Vulkan;

pub use imp::PlatformBackend;
