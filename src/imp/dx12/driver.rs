// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The seam between the D3D12 translation layer and an `ID3D12Device`.

use super::native::{
    Command, CpuDescriptorHandle, DescriptorCopy, DescriptorHeapType, GpuDescriptorHandle, HeapHandle, HeapInfo,
    PipelineStateHandle, ResourceHandle, RootSignatureHandle, RootSignatureLayout, SemaphoreHandle, SwapChainHandle,
    ViewDesc,
};
use crate::bindings::usage::QueueType;
use crate::error::Error;
use crate::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc};
use crate::resources::{BufferDesc, TextureDesc};
use crate::sync::{FenceSignal, SwapChainDesc};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Everything one `ExecuteCommandLists` carries, with the fence waits and signals around it.
#[derive(Debug)]
pub struct Submission<'a> {
    pub command_lists: Vec<&'a [Command]>,
    /// `ID3D12CommandQueue::Wait` before executing.
    pub wait_semaphores: Vec<SemaphoreHandle>,
    /// `ID3D12CommandQueue::Signal` after executing.
    pub signal_semaphores: Vec<SemaphoreHandle>,
    pub signals: Vec<FenceSignal>,
}

/**
Native D3D12 entry points used by the backend.

Descriptor heaps are created once per device and sub-allocated by the backend; the driver only
creates views into CPU descriptor handles and copies them.
*/
pub trait Driver: Debug + Send + Sync {
    /// Creates a committed buffer, returning it with its GPU virtual address.
    fn create_buffer(&self, desc: &BufferDesc) -> Result<(ResourceHandle, u64), Error>;
    fn create_texture(&self, desc: &TextureDesc) -> Result<ResourceHandle, Error>;
    fn release_resource(&self, resource: ResourceHandle);

    fn create_descriptor_heap(
        &self,
        ty: DescriptorHeapType,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<HeapInfo, Error>;
    fn destroy_descriptor_heap(&self, heap: HeapHandle);
    /// Writes a descriptor for `resource` viewed as `view` at `dst`.
    fn create_view(&self, dst: CpuDescriptorHandle, resource: Option<ResourceHandle>, view: &ViewDesc);
    fn copy_descriptors(&self, copies: &[DescriptorCopy]);

    fn create_root_signature(&self, layout: &RootSignatureLayout) -> Result<RootSignatureHandle, Error>;
    fn destroy_root_signature(&self, root_signature: RootSignatureHandle);
    fn create_graphics_pipeline(
        &self,
        root_signature: RootSignatureHandle,
        desc: &GraphicsPipelineDesc,
    ) -> Result<PipelineStateHandle, Error>;
    fn create_compute_pipeline(
        &self,
        root_signature: RootSignatureHandle,
        desc: &ComputePipelineDesc,
    ) -> Result<PipelineStateHandle, Error>;
    fn destroy_pipeline(&self, pipeline: PipelineStateHandle);

    fn create_semaphore(&self) -> Result<SemaphoreHandle, Error>;
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    fn create_swap_chain(
        &self,
        queue: QueueType,
        window: RawWindowHandle,
        display: RawDisplayHandle,
        desc: &SwapChainDesc,
    ) -> Result<(SwapChainHandle, Vec<ResourceHandle>), Error>;
    fn destroy_swap_chain(&self, swap_chain: SwapChainHandle);
    /// `IDXGISwapChain3::GetCurrentBackBufferIndex`.
    fn current_back_buffer_index(&self, swap_chain: SwapChainHandle) -> Result<u32, Error>;
    fn present(
        &self,
        queue: QueueType,
        swap_chain: SwapChainHandle,
        sync_interval: u32,
        wait: &[SemaphoreHandle],
    ) -> Result<(), Error>;

    fn execute_command_lists(&self, queue: QueueType, submission: &Submission<'_>) -> Result<(), Error>;
    fn wait_idle(&self) -> Result<(), Error>;
}

/// A call recorded by [`NullDriver`].
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    CreateBuffer { resource: ResourceHandle, address: u64, name: String },
    CreateTexture { resource: ResourceHandle, name: String },
    ReleaseResource(ResourceHandle),
    CreateDescriptorHeap { heap: HeapInfo, ty: DescriptorHeapType, capacity: u32 },
    DestroyDescriptorHeap(HeapHandle),
    CreateView { dst: CpuDescriptorHandle, resource: Option<ResourceHandle>, view: ViewDesc },
    CopyDescriptors(Vec<DescriptorCopy>),
    CreateRootSignature { root_signature: RootSignatureHandle, layout: RootSignatureLayout },
    DestroyRootSignature(RootSignatureHandle),
    CreatePipeline { pipeline: PipelineStateHandle, root_signature: RootSignatureHandle, name: String },
    DestroyPipeline(PipelineStateHandle),
    CreateSemaphore(SemaphoreHandle),
    DestroySemaphore(SemaphoreHandle),
    CreateSwapChain { swap_chain: SwapChainHandle, buffers: Vec<ResourceHandle> },
    DestroySwapChain(SwapChainHandle),
    Present { queue: QueueType, swap_chain: SwapChainHandle, sync_interval: u32, wait: Vec<SemaphoreHandle> },
    ExecuteCommandLists {
        queue: QueueType,
        command_lists: Vec<Vec<Command>>,
        wait: Vec<SemaphoreHandle>,
        signal: Vec<SemaphoreHandle>,
    },
    WaitIdle,
}

const fn descriptor_increment(ty: DescriptorHeapType) -> u32 {
    match ty {
        DescriptorHeapType::CbvSrvUav => 32,
        DescriptorHeapType::Sampler => 32,
        DescriptorHeapType::Rtv | DescriptorHeapType::Dsv => 8,
    }
}

/**
A driver that executes nothing.

Object handles are distinct non-zero integers.  Buffers get 64 KiB aligned GPU virtual addresses,
descriptor heaps get disjoint CPU (and GPU) handle ranges.  Every call is logged for
[`NullDriver::calls`], and submissions complete immediately.
*/
#[derive(Debug)]
pub struct NullDriver {
    next_handle: AtomicU64,
    next_address: AtomicU64,
    next_cpu_descriptor: AtomicU64,
    next_gpu_descriptor: AtomicU64,
    calls: Mutex<Vec<DriverCall>>,
    /// swap chain -> (buffer count, presents so far)
    swap_chains: Mutex<HashMap<SwapChainHandle, (u32, u32)>>,
}

impl Default for NullDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl NullDriver {
    pub fn new() -> Self {
        NullDriver {
            next_handle: AtomicU64::new(0x1000),
            next_address: AtomicU64::new(0x1_0000_0000),
            next_cpu_descriptor: AtomicU64::new(0x10_0000),
            next_gpu_descriptor: AtomicU64::new(0x8000_0000_0000),
            calls: Mutex::new(Vec::new()),
            swap_chains: Mutex::new(HashMap::new()),
        }
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// The batches passed to `copy_descriptors`, in order.
    pub fn descriptor_copies(&self) -> Vec<Vec<DescriptorCopy>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                DriverCall::CopyDescriptors(copies) => Some(copies.clone()),
                _ => None,
            })
            .collect()
    }

    /// The view written at `dst` most recently.
    pub fn view_at(&self, dst: CpuDescriptorHandle) -> Option<(Option<ResourceHandle>, ViewDesc)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|call| match call {
                DriverCall::CreateView { dst: at, resource, view } if *at == dst => Some((*resource, view.clone())),
                _ => None,
            })
    }

    fn handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn record(&self, call: DriverCall) {
        logwise::trace_sync!("dx12 null driver: {call}", call = logwise::privacy::LogIt(&call));
        self.calls.lock().unwrap().push(call);
    }
}

impl Driver for NullDriver {
    fn create_buffer(&self, desc: &BufferDesc) -> Result<(ResourceHandle, u64), Error> {
        let resource = ResourceHandle(self.handle());
        let size = desc.size.max(1).next_multiple_of(0x1_0000);
        let address = self.next_address.fetch_add(size, Ordering::Relaxed);
        self.record(DriverCall::CreateBuffer {
            resource,
            address,
            name: desc.debug_name.clone(),
        });
        Ok((resource, address))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<ResourceHandle, Error> {
        let resource = ResourceHandle(self.handle());
        self.record(DriverCall::CreateTexture {
            resource,
            name: desc.debug_name.clone(),
        });
        Ok(resource)
    }

    fn release_resource(&self, resource: ResourceHandle) {
        self.record(DriverCall::ReleaseResource(resource));
    }

    fn create_descriptor_heap(
        &self,
        ty: DescriptorHeapType,
        capacity: u32,
        shader_visible: bool,
    ) -> Result<HeapInfo, Error> {
        let increment = descriptor_increment(ty);
        let span = capacity as u64 * increment as u64;
        let heap = HeapInfo {
            handle: HeapHandle(self.handle()),
            cpu_start: CpuDescriptorHandle(self.next_cpu_descriptor.fetch_add(span, Ordering::Relaxed)),
            gpu_start: shader_visible
                .then(|| GpuDescriptorHandle(self.next_gpu_descriptor.fetch_add(span, Ordering::Relaxed))),
            increment,
        };
        self.record(DriverCall::CreateDescriptorHeap { heap, ty, capacity });
        Ok(heap)
    }

    fn destroy_descriptor_heap(&self, heap: HeapHandle) {
        self.record(DriverCall::DestroyDescriptorHeap(heap));
    }

    fn create_view(&self, dst: CpuDescriptorHandle, resource: Option<ResourceHandle>, view: &ViewDesc) {
        self.record(DriverCall::CreateView {
            dst,
            resource,
            view: view.clone(),
        });
    }

    fn copy_descriptors(&self, copies: &[DescriptorCopy]) {
        self.record(DriverCall::CopyDescriptors(copies.to_vec()));
    }

    fn create_root_signature(&self, layout: &RootSignatureLayout) -> Result<RootSignatureHandle, Error> {
        let root_signature = RootSignatureHandle(self.handle());
        self.record(DriverCall::CreateRootSignature {
            root_signature,
            layout: layout.clone(),
        });
        Ok(root_signature)
    }

    fn destroy_root_signature(&self, root_signature: RootSignatureHandle) {
        self.record(DriverCall::DestroyRootSignature(root_signature));
    }

    fn create_graphics_pipeline(
        &self,
        root_signature: RootSignatureHandle,
        desc: &GraphicsPipelineDesc,
    ) -> Result<PipelineStateHandle, Error> {
        let pipeline = PipelineStateHandle(self.handle());
        self.record(DriverCall::CreatePipeline {
            pipeline,
            root_signature,
            name: desc.debug_name.clone(),
        });
        Ok(pipeline)
    }

    fn create_compute_pipeline(
        &self,
        root_signature: RootSignatureHandle,
        desc: &ComputePipelineDesc,
    ) -> Result<PipelineStateHandle, Error> {
        let pipeline = PipelineStateHandle(self.handle());
        self.record(DriverCall::CreatePipeline {
            pipeline,
            root_signature,
            name: desc.debug_name.clone(),
        });
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: PipelineStateHandle) {
        self.record(DriverCall::DestroyPipeline(pipeline));
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle, Error> {
        let semaphore = SemaphoreHandle(self.handle());
        self.record(DriverCall::CreateSemaphore(semaphore));
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        self.record(DriverCall::DestroySemaphore(semaphore));
    }

    fn create_swap_chain(
        &self,
        _queue: QueueType,
        _window: RawWindowHandle,
        _display: RawDisplayHandle,
        desc: &SwapChainDesc,
    ) -> Result<(SwapChainHandle, Vec<ResourceHandle>), Error> {
        let swap_chain = SwapChainHandle(self.handle());
        let buffers: Vec<ResourceHandle> = (0..desc.image_count).map(|_| ResourceHandle(self.handle())).collect();
        self.swap_chains
            .lock()
            .unwrap()
            .insert(swap_chain, (desc.image_count.max(1), 0));
        self.record(DriverCall::CreateSwapChain {
            swap_chain,
            buffers: buffers.clone(),
        });
        Ok((swap_chain, buffers))
    }

    fn destroy_swap_chain(&self, swap_chain: SwapChainHandle) {
        self.swap_chains.lock().unwrap().remove(&swap_chain);
        self.record(DriverCall::DestroySwapChain(swap_chain));
    }

    fn current_back_buffer_index(&self, swap_chain: SwapChainHandle) -> Result<u32, Error> {
        let swap_chains = self.swap_chains.lock().unwrap();
        let Some((count, presents)) = swap_chains.get(&swap_chain) else {
            return Err(Error::Driver(format!("unknown swap chain {swap_chain:?}")));
        };
        Ok(presents % count)
    }

    fn present(
        &self,
        queue: QueueType,
        swap_chain: SwapChainHandle,
        sync_interval: u32,
        wait: &[SemaphoreHandle],
    ) -> Result<(), Error> {
        if let Some((_, presents)) = self.swap_chains.lock().unwrap().get_mut(&swap_chain) {
            *presents += 1;
        }
        self.record(DriverCall::Present {
            queue,
            swap_chain,
            sync_interval,
            wait: wait.to_vec(),
        });
        Ok(())
    }

    fn execute_command_lists(&self, queue: QueueType, submission: &Submission<'_>) -> Result<(), Error> {
        self.record(DriverCall::ExecuteCommandLists {
            queue,
            command_lists: submission.command_lists.iter().map(|c| c.to_vec()).collect(),
            wait: submission.wait_semaphores.clone(),
            signal: submission.signal_semaphores.clone(),
        });
        for signal in &submission.signals {
            signal.complete();
        }
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), Error> {
        self.record(DriverCall::WaitIdle);
        Ok(())
    }
}
