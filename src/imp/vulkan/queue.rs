// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use super::Vulkan;
use super::command_list::CommandList;
use super::driver::{Driver, Submission};
use super::resources::Texture;
use crate::bindings::usage::QueueType;
use crate::config::RhiConfig;
use crate::error::Error;
use crate::resources::{SubresourceRange, TextureDesc, TextureUsage};
use crate::sync::{self, check_presentable, FenceCore, FenceSignal, QueueCore, SubmitDesc, SwapChainDesc};
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

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

    fn dump(&self, lists: &[&CommandList]) {
        for (i, list) in lists.iter().enumerate() {
            for command in list.commands() {
                logwise::info_sync!(
                    "vulkan {queue} list {i}: {command}",
                    queue = logwise::privacy::LogIt(&self.core.queue_type()),
                    i = i,
                    command = logwise::privacy::LogIt(command)
                );
            }
        }
    }
}

impl sync::Queue for Queue {
    type Backend = Vulkan;

    fn queue_type(&self) -> QueueType {
        self.core.queue_type()
    }

    fn submit(&self, submit: &SubmitDesc<'_, Vulkan>) -> Result<(), Error> {
        self.core.check_submission(&submit.command_lists);
        if self.config.dump_commands {
            self.dump(&submit.command_lists);
        }
        let idle = self.core.next_idle_signal();
        let mut signals: Vec<FenceSignal> = submit
            .signal_fence
            .iter()
            .map(|(fence, value)| fence.signal_at(*value))
            .collect();
        signals.push(idle.clone());
        let submission = Submission {
            command_buffers: submit.command_lists.iter().map(|list| list.commands()).collect(),
            wait_semaphores: submit.wait_semaphores.iter().map(|s| s.handle()).collect(),
            signal_semaphores: submit.signal_semaphores.iter().map(|s| s.handle()).collect(),
            signals,
        };
        if let Err(e) = self.driver.queue_submit(self.core.queue_type(), &submission) {
            // nothing will signal the idle fence for a rejected submission
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

/// A timeline fence.
#[derive(Debug)]
pub struct Fence {
    core: Arc<FenceCore>,
}

impl Fence {
    pub(crate) fn new(initial_value: u64) -> Self {
        Fence {
            core: Arc::new(FenceCore::new("vulkan fence", initial_value)),
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

/// A binary semaphore ordering work across queues and the presentation engine.
#[derive(Debug)]
pub struct Semaphore {
    handle: vk::Semaphore,
    driver: Arc<dyn Driver>,
}

impl Semaphore {
    pub(crate) fn new(driver: Arc<dyn Driver>, handle: vk::Semaphore) -> Self {
        Semaphore { handle, driver }
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.driver.destroy_semaphore(self.handle);
    }
}

/**
A `VkSwapchainKHR` and a texture per image.

The images belong to the swap chain, so the textures only own their views.  Each image starts
out `UNDEFINED` and must be transitioned to `PRESENT` before [`present`](sync::SwapChain::present).
*/
#[derive(Debug)]
pub struct SwapChain {
    desc: SwapChainDesc,
    handle: vk::SwapchainKHR,
    textures: Vec<Texture>,
    current: u32,
    driver: Arc<dyn Driver>,
}

impl SwapChain {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        window: RawWindowHandle,
        display: RawDisplayHandle,
        desc: &SwapChainDesc,
    ) -> Result<Self, Error> {
        let (handle, images) = driver.create_swapchain(window, display, desc)?;
        let mut textures = Vec::with_capacity(images.len());
        for (i, image) in images.into_iter().enumerate() {
            let texture_desc = TextureDesc::new_2d(
                &format!("swapchain image {i}"),
                desc.width,
                desc.height,
                desc.format,
                TextureUsage::RENDER_TARGET | TextureUsage::PRESENT | TextureUsage::COPY_DST,
            );
            let view = match driver.create_image_view(image, &texture_desc, &SubresourceRange::all(&texture_desc)) {
                Ok(view) => view,
                Err(e) => {
                    drop(textures);
                    driver.destroy_swapchain(handle);
                    return Err(e);
                }
            };
            textures.push(Texture::new(driver.clone(), texture_desc, image, view, false));
        }
        logwise::info_sync!(
            "vulkan swap chain {width}x{height} with {count} images",
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

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn textures(&self) -> &[Texture] {
        &self.textures
    }
}

impl sync::SwapChain for SwapChain {
    type Backend = Vulkan;

    fn desc(&self) -> &SwapChainDesc {
        &self.desc
    }

    fn acquire_next_image(&mut self, signal: Option<&Semaphore>) -> Result<u32, Error> {
        let signal = signal.map(|s| s.handle()).unwrap_or(vk::Semaphore::null());
        self.current = self.driver.acquire_next_image(self.handle, signal)?;
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
        let wait: Vec<vk::Semaphore> = wait.iter().map(|s| s.handle()).collect();
        self.driver
            .queue_present(sync::Queue::queue_type(queue), self.handle, self.current, &wait)
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        self.textures.clear();
        self.driver.destroy_swapchain(self.handle);
    }
}
