// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The seam between the Metal translation layer and an `MTLDevice`.

use super::native::{
    ArgumentWrite, BufferHandle, Command, DrawableHandle, EventHandle, FenceHandle, LayerHandle, PipelineHandle,
    SamplerHandle, TextureHandle,
};
use crate::bindings::usage::QueueType;
use crate::error::Error;
use crate::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc};
use crate::resources::{BufferDesc, SamplerDesc, SubresourceRange, TextureDesc};
use crate::sync::{FenceSignal, SwapChainDesc};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Everything one committed `MTLCommandBuffer` carries.
#[derive(Debug)]
pub struct Submission<'a> {
    pub command_buffers: Vec<&'a [Command]>,
    /// `encodeWaitForEvent:value:` before the first command buffer.
    pub wait_events: Vec<(EventHandle, u64)>,
    /// `encodeSignalEvent:value:` after the last command buffer.
    pub signal_events: Vec<(EventHandle, u64)>,
    /// Completed by the driver from the completion handler.
    pub signals: Vec<FenceSignal>,
}

/**
Native Metal entry points used by the backend.

Resources are created with untracked hazard tracking; ordering between encoders is expressed
with fences and memory barriers recorded by the command list.  Sampler states are created with
`supportArgumentBuffers` set.
*/
pub trait Driver: Debug + Send + Sync {
    fn new_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle, Error>;
    /// A shared-storage buffer holding every argument buffer of the device.
    fn new_argument_arena(&self, length: u64) -> Result<BufferHandle, Error>;
    fn release_buffer(&self, buffer: BufferHandle);
    fn new_texture(&self, desc: &TextureDesc) -> Result<TextureHandle, Error>;
    fn new_texture_view(
        &self,
        texture: TextureHandle,
        desc: &TextureDesc,
        range: &SubresourceRange,
    ) -> Result<TextureHandle, Error>;
    fn release_texture(&self, texture: TextureHandle);
    fn new_sampler_state(&self, desc: &SamplerDesc) -> Result<SamplerHandle, Error>;
    fn release_sampler_state(&self, sampler: SamplerHandle);

    /// Writes resource ids and GPU addresses into argument buffers.
    fn encode_arguments(&self, writes: &[ArgumentWrite]);

    fn new_render_pipeline_state(&self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle, Error>;
    /// Also returns the threadgroup size reflected from the kernel.
    fn new_compute_pipeline_state(&self, desc: &ComputePipelineDesc) -> Result<(PipelineHandle, [u32; 3]), Error>;
    fn release_pipeline_state(&self, pipeline: PipelineHandle);

    fn new_fence(&self) -> Result<FenceHandle, Error>;
    fn release_fence(&self, fence: FenceHandle);
    fn new_shared_event(&self) -> Result<EventHandle, Error>;
    fn release_shared_event(&self, event: EventHandle);

    fn new_layer(
        &self,
        window: RawWindowHandle,
        display: RawDisplayHandle,
        desc: &SwapChainDesc,
    ) -> Result<LayerHandle, Error>;
    fn release_layer(&self, layer: LayerHandle);
    /// `nextDrawable`, with the drawable's texture.
    fn next_drawable(&self, layer: LayerHandle) -> Result<(DrawableHandle, TextureHandle), Error>;
    /// Commits a command buffer holding only the event waits and `presentDrawable:`.
    fn present_drawable(
        &self,
        queue: QueueType,
        drawable: DrawableHandle,
        wait_events: &[(EventHandle, u64)],
    ) -> Result<(), Error>;

    fn commit(&self, queue: QueueType, submission: &Submission<'_>) -> Result<(), Error>;
    fn wait_until_idle(&self) -> Result<(), Error>;
}

/// A call recorded by [`NullDriver`].
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    NewBuffer { buffer: BufferHandle, name: String },
    NewArgumentArena { buffer: BufferHandle, length: u64 },
    ReleaseBuffer(BufferHandle),
    NewTexture { texture: TextureHandle, name: String },
    NewTextureView { view: TextureHandle, texture: TextureHandle, range: SubresourceRange },
    ReleaseTexture(TextureHandle),
    NewSamplerState(SamplerHandle),
    ReleaseSamplerState(SamplerHandle),
    EncodeArguments(Vec<ArgumentWrite>),
    NewRenderPipelineState { pipeline: PipelineHandle, name: String },
    NewComputePipelineState { pipeline: PipelineHandle, name: String },
    ReleasePipelineState(PipelineHandle),
    NewFence(FenceHandle),
    ReleaseFence(FenceHandle),
    NewSharedEvent(EventHandle),
    ReleaseSharedEvent(EventHandle),
    NewLayer { layer: LayerHandle, drawables: Vec<TextureHandle> },
    ReleaseLayer(LayerHandle),
    NextDrawable { layer: LayerHandle, drawable: DrawableHandle, texture: TextureHandle },
    PresentDrawable {
        queue: QueueType,
        drawable: DrawableHandle,
        wait: Vec<(EventHandle, u64)>,
    },
    Commit {
        queue: QueueType,
        command_buffers: Vec<Vec<Command>>,
        wait: Vec<(EventHandle, u64)>,
        signal: Vec<(EventHandle, u64)>,
    },
    WaitUntilIdle,
}

/**
A driver that executes nothing.

Handles are distinct non-null integers and every call is logged for [`NullDriver::calls`].
Command buffers complete as soon as they are committed.  A layer cycles through
`image_count` drawable textures; every kernel reports a threadgroup size of
[`NullDriver::THREADS_PER_THREADGROUP`].
*/
#[derive(Debug)]
pub struct NullDriver {
    next_handle: AtomicU64,
    calls: Mutex<Vec<DriverCall>>,
    /// layer -> (drawable textures, next drawable)
    layers: Mutex<HashMap<LayerHandle, (Vec<TextureHandle>, usize)>>,
}

impl Default for NullDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl NullDriver {
    pub const THREADS_PER_THREADGROUP: [u32; 3] = [8, 8, 1];

    pub fn new() -> Self {
        NullDriver {
            next_handle: AtomicU64::new(0x1000),
            calls: Mutex::new(Vec::new()),
            layers: Mutex::new(HashMap::new()),
        }
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// The batches passed to `encode_arguments`, in order.
    pub fn argument_encodes(&self) -> Vec<Vec<ArgumentWrite>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                DriverCall::EncodeArguments(writes) => Some(writes.clone()),
                _ => None,
            })
            .collect()
    }

    fn next(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn record(&self, call: DriverCall) {
        logwise::trace_sync!("metal null driver: {call}", call = logwise::privacy::LogIt(&call));
        self.calls.lock().unwrap().push(call);
    }
}

impl Driver for NullDriver {
    fn new_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle, Error> {
        let buffer = BufferHandle(self.next());
        self.record(DriverCall::NewBuffer {
            buffer,
            name: desc.debug_name.clone(),
        });
        Ok(buffer)
    }

    fn new_argument_arena(&self, length: u64) -> Result<BufferHandle, Error> {
        let buffer = BufferHandle(self.next());
        self.record(DriverCall::NewArgumentArena { buffer, length });
        Ok(buffer)
    }

    fn release_buffer(&self, buffer: BufferHandle) {
        self.record(DriverCall::ReleaseBuffer(buffer));
    }

    fn new_texture(&self, desc: &TextureDesc) -> Result<TextureHandle, Error> {
        let texture = TextureHandle(self.next());
        self.record(DriverCall::NewTexture {
            texture,
            name: desc.debug_name.clone(),
        });
        Ok(texture)
    }

    fn new_texture_view(
        &self,
        texture: TextureHandle,
        _desc: &TextureDesc,
        range: &SubresourceRange,
    ) -> Result<TextureHandle, Error> {
        let view = TextureHandle(self.next());
        self.record(DriverCall::NewTextureView {
            view,
            texture,
            range: *range,
        });
        Ok(view)
    }

    fn release_texture(&self, texture: TextureHandle) {
        self.record(DriverCall::ReleaseTexture(texture));
    }

    fn new_sampler_state(&self, _desc: &SamplerDesc) -> Result<SamplerHandle, Error> {
        let sampler = SamplerHandle(self.next());
        self.record(DriverCall::NewSamplerState(sampler));
        Ok(sampler)
    }

    fn release_sampler_state(&self, sampler: SamplerHandle) {
        self.record(DriverCall::ReleaseSamplerState(sampler));
    }

    fn encode_arguments(&self, writes: &[ArgumentWrite]) {
        self.record(DriverCall::EncodeArguments(writes.to_vec()));
    }

    fn new_render_pipeline_state(&self, desc: &GraphicsPipelineDesc) -> Result<PipelineHandle, Error> {
        let pipeline = PipelineHandle(self.next());
        self.record(DriverCall::NewRenderPipelineState {
            pipeline,
            name: desc.debug_name.clone(),
        });
        Ok(pipeline)
    }

    fn new_compute_pipeline_state(&self, desc: &ComputePipelineDesc) -> Result<(PipelineHandle, [u32; 3]), Error> {
        let pipeline = PipelineHandle(self.next());
        self.record(DriverCall::NewComputePipelineState {
            pipeline,
            name: desc.debug_name.clone(),
        });
        Ok((pipeline, Self::THREADS_PER_THREADGROUP))
    }

    fn release_pipeline_state(&self, pipeline: PipelineHandle) {
        self.record(DriverCall::ReleasePipelineState(pipeline));
    }

    fn new_fence(&self) -> Result<FenceHandle, Error> {
        let fence = FenceHandle(self.next());
        self.record(DriverCall::NewFence(fence));
        Ok(fence)
    }

    fn release_fence(&self, fence: FenceHandle) {
        self.record(DriverCall::ReleaseFence(fence));
    }

    fn new_shared_event(&self) -> Result<EventHandle, Error> {
        let event = EventHandle(self.next());
        self.record(DriverCall::NewSharedEvent(event));
        Ok(event)
    }

    fn release_shared_event(&self, event: EventHandle) {
        self.record(DriverCall::ReleaseSharedEvent(event));
    }

    fn new_layer(
        &self,
        _window: RawWindowHandle,
        _display: RawDisplayHandle,
        desc: &SwapChainDesc,
    ) -> Result<LayerHandle, Error> {
        let layer = LayerHandle(self.next());
        let drawables: Vec<TextureHandle> = (0..desc.image_count.max(1)).map(|_| TextureHandle(self.next())).collect();
        self.layers.lock().unwrap().insert(layer, (drawables.clone(), 0));
        self.record(DriverCall::NewLayer { layer, drawables });
        Ok(layer)
    }

    fn release_layer(&self, layer: LayerHandle) {
        self.layers.lock().unwrap().remove(&layer);
        self.record(DriverCall::ReleaseLayer(layer));
    }

    fn next_drawable(&self, layer: LayerHandle) -> Result<(DrawableHandle, TextureHandle), Error> {
        let texture = {
            let mut layers = self.layers.lock().unwrap();
            let Some((textures, next)) = layers.get_mut(&layer) else {
                return Err(Error::Driver(format!("unknown layer {layer:?}")));
            };
            let texture = textures[*next];
            *next = (*next + 1) % textures.len();
            texture
        };
        let drawable = DrawableHandle(self.next());
        self.record(DriverCall::NextDrawable {
            layer,
            drawable,
            texture,
        });
        Ok((drawable, texture))
    }

    fn present_drawable(
        &self,
        queue: QueueType,
        drawable: DrawableHandle,
        wait_events: &[(EventHandle, u64)],
    ) -> Result<(), Error> {
        self.record(DriverCall::PresentDrawable {
            queue,
            drawable,
            wait: wait_events.to_vec(),
        });
        Ok(())
    }

    fn commit(&self, queue: QueueType, submission: &Submission<'_>) -> Result<(), Error> {
        self.record(DriverCall::Commit {
            queue,
            command_buffers: submission.command_buffers.iter().map(|c| c.to_vec()).collect(),
            wait: submission.wait_events.clone(),
            signal: submission.signal_events.clone(),
        });
        for signal in &submission.signals {
            signal.complete();
        }
        Ok(())
    }

    fn wait_until_idle(&self) -> Result<(), Error> {
        self.record(DriverCall::WaitUntilIdle);
        Ok(())
    }
}
