// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use super::Dx12;
use super::command_list::CommandList;
use super::descriptor_heap::DeviceHeaps;
use super::driver::{Driver, Submission};
use super::native::{SemaphoreHandle, SwapChainHandle, ViewDesc};
use super::resources::Texture;
use crate::bindings::usage::QueueType;
use crate::config::RhiConfig;
use crate::error::Error;
use crate::resources::{TextureDesc, TextureUsage};
use crate::sync::{self, check_presentable, FenceCore, FenceSignal, QueueCore, SubmitDesc, SwapChainDesc};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// An `ID3D12CommandQueue`.
#[derive(Debug)]
pub struct Queue {
    core: QueueCore,
    config: Arc<RhiConfig>,
    driver: Arc<dyn Driver>,
}

impl Queue {
    pub(crate) fn new(ty: QueueType, config: Arc<RhiConfig>, driver: Arc<dyn Driver>) -> Self {
        Queue {
            core: QueueCore::new(ty),
            config,
            driver,
        }
    }
}

impl sync::Queue for Queue {
    type Backend = Dx12;

    fn queue_type(&self) -> QueueType {
        self.core.queue_type()
    }

    fn submit(&self, submit: &SubmitDesc<'_, Dx12>) -> Result<(), Error> {
        self.core.check_submission(&submit.command_lists);
        if self.config.dump_commands {
            for (i, list) in submit.command_lists.iter().enumerate() {
                logwise::info_sync!(
                    "dx12 {queue} list {i}: {commands}",
                    queue = logwise::privacy::LogIt(&self.core.queue_type()),
                    i = i,
                    commands = logwise::privacy::LogIt(&list.commands())
                );
            }
        }
        let idle = self.core.next_idle_signal();
        let mut signals: Vec<FenceSignal> = submit
            .signal_fence
            .iter()
            .map(|(fence, value)| fence.signal_at(*value))
            .collect();
        signals.push(idle.clone());
        let submission = Submission {
            command_lists: submit.command_lists.iter().map(|list| list.commands()).collect(),
            wait_semaphores: submit.wait_semaphores.iter().map(|s| s.handle()).collect(),
            signal_semaphores: submit.signal_semaphores.iter().map(|s| s.handle()).collect(),
            signals,
        };
        if let Err(e) = self.driver.execute_command_lists(self.core.queue_type(), &submission) {
            idle.complete();
            return Err(e);
        }
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), Error> {
        self.core.wait_idle();
        Ok(())
    }
}

/// An `ID3D12Fence` used as a timeline.
#[derive(Debug)]
pub struct Fence {
    core: Arc<FenceCore>,
}

impl Fence {
    pub(crate) fn new(initial_value: u64) -> Self {
        Fence {
            core: Arc::new(FenceCore::new("dx12 fence", initial_value)),
        }
    }

    pub(crate) fn signal_at(&self, value: u64) -> FenceSignal {
        FenceSignal::new(self.core.clone(), value)
    }
}

impl sync::Fence for Fence {
    fn completed_value(&self) -> u64 {
        self.core.completed_value()
    }

    fn wait(&self, value: u64) -> Result<(), Error> {
        self.core.wait(value);
        Ok(())
    }

    fn wait_timeout(&self, value: u64, timeout: Duration) -> Result<bool, Error> {
        Ok(self.core.wait_timeout(value, timeout))
    }

    fn completion(&self, value: u64) -> impl Future<Output = ()> {
        self.core.completion(value)
    }
}

/// A fence signalled by one queue and waited on by another, standing in for a binary semaphore.
#[derive(Debug)]
pub struct Semaphore {
    handle: SemaphoreHandle,
    driver: Arc<dyn Driver>,
}

impl Semaphore {
    pub(crate) fn new(driver: Arc<dyn Driver>, handle: SemaphoreHandle) -> Self {
        Semaphore { handle, driver }
    }

    pub fn handle(&self) -> SemaphoreHandle {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.driver.destroy_semaphore(self.handle);
    }
}

/**
An `IDXGISwapChain3` and a texture per back buffer.

DXGI picks the back buffer; [`acquire_next_image`](sync::SwapChain::acquire_next_image) only
asks which one is current.  Signalling a semaphore on acquire is not needed in D3D12 and is
ignored.
*/
#[derive(Debug)]
pub struct SwapChain {
    desc: SwapChainDesc,
    handle: SwapChainHandle,
    textures: Vec<Texture>,
    current: u32,
    driver: Arc<dyn Driver>,
}

impl SwapChain {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        heaps: &DeviceHeaps,
        queue: QueueType,
        window: RawWindowHandle,
        display: RawDisplayHandle,
        desc: &SwapChainDesc,
    ) -> Result<Self, Error> {
        let (handle, buffers) = driver.create_swap_chain(queue, window, display, desc)?;
        let mut textures = Vec::with_capacity(buffers.len());
        for (i, buffer) in buffers.into_iter().enumerate() {
            let texture_desc = TextureDesc::new_2d(
                &format!("swapchain image {i}"),
                desc.width,
                desc.height,
                desc.format,
                TextureUsage::RENDER_TARGET | TextureUsage::PRESENT | TextureUsage::COPY_DST,
            );
            let rtv = match heaps.rtv.allocate(1) {
                Ok(rtv) => rtv,
                Err(e) => {
                    drop(textures);
                    driver.destroy_swap_chain(handle);
                    return Err(e);
                }
            };
            driver.create_view(rtv.cpu(0), Some(buffer), &ViewDesc::RenderTarget { format: desc.format });
            textures.push(Texture::new(driver.clone(), texture_desc, buffer, Some(rtv), None, false));
        }
        logwise::info_sync!(
            "dx12 swap chain {width}x{height} with {count} buffers",
            width = desc.width,
            height = desc.height,
            count = textures.len()
        );
        Ok(SwapChain {
            desc: *desc,
            handle,
            textures,
            current: 0,
            driver,
        })
    }

    pub fn handle(&self) -> SwapChainHandle {
        self.handle
    }

    pub fn textures(&self) -> &[Texture] {
        &self.textures
    }
}

impl sync::SwapChain for SwapChain {
    type Backend = Dx12;

    fn desc(&self) -> &SwapChainDesc {
        &self.desc
    }

    fn acquire_next_image(&mut self, _signal: Option<&Semaphore>) -> Result<u32, Error> {
        self.current = self.driver.current_back_buffer_index(self.handle)?;
        Ok(self.current)
    }

    fn current_image(&self) -> u32 {
        self.current
    }

    fn current_texture(&self) -> &Texture {
        &self.textures[self.current as usize]
    }

    fn present(&mut self, queue: &Queue, wait: &[&Semaphore]) -> Result<(), Error> {
        check_presentable(&self.textures[self.current as usize])?;
        let wait: Vec<SemaphoreHandle> = wait.iter().map(|s| s.handle()).collect();
        let sync_interval = self.desc.vsync as u32;
        self.driver
            .present(sync::Queue::queue_type(queue), self.handle, sync_interval, &wait)
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        self.textures.clear();
        self.driver.destroy_swap_chain(self.handle);
    }
}
