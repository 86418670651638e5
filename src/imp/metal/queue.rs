// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use super::Metal;
use super::command_list::CommandList;
use super::driver::{Driver, Submission};
use super::native::{DrawableHandle, EventHandle, LayerHandle};
use super::resources::Texture;
use crate::bindings::usage::QueueType;
use crate::config::RhiConfig;
use crate::error::{fatal, Error};
use crate::resources::{TextureDesc, TextureUsage};
use crate::sync::{self, check_presentable, FenceCore, FenceSignal, QueueCore, SubmitDesc, SwapChainDesc};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// An `MTLCommandQueue`.  Each submission is committed as one command buffer.
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
                    "metal {queue} list {i}: {command}",
                    queue = logwise::privacy::LogIt(&self.core.queue_type()),
                    i = i,
                    command = logwise::privacy::LogIt(command)
                );
            }
        }
    }
}

impl sync::Queue for Queue {
    type Backend = Metal;

    fn queue_type(&self) -> QueueType {
        self.core.queue_type()
    }

    fn submit(&self, submit: &SubmitDesc<'_, Metal>) -> Result<(), Error> {
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
            wait_events: submit.wait_semaphores.iter().map(|s| s.wait_value()).collect(),
            signal_events: submit.signal_semaphores.iter().map(|s| s.next_signal_value()).collect(),
            signals,
        };
        if let Err(e) = self.driver.commit(self.core.queue_type(), &submission) {
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

/// A CPU-visible timeline, completed from command-buffer completion handlers.
#[derive(Debug)]
pub struct Fence {
    core: Arc<FenceCore>,
}

impl Fence {
    pub(crate) fn new(initial_value: u64) -> Self {
        Fence {
            core: Arc::new(FenceCore::new("metal fence", initial_value)),
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

/**
A binary semaphore expressed as an `MTLSharedEvent`.

Each signal bumps the event to a new value; a wait waits for the most recent one.
*/
#[derive(Debug)]
pub struct Semaphore {
    event: EventHandle,
    value: AtomicU64,
    driver: Arc<dyn Driver>,
}

impl Semaphore {
    pub(crate) fn new(driver: Arc<dyn Driver>, event: EventHandle) -> Self {
        Semaphore {
            event,
            value: AtomicU64::new(0),
            driver,
        }
    }

    pub fn event(&self) -> EventHandle {
        self.event
    }

    pub(crate) fn next_signal_value(&self) -> (EventHandle, u64) {
        (self.event, self.value.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub(crate) fn wait_value(&self) -> (EventHandle, u64) {
        (self.event, self.value.load(Ordering::Acquire))
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.driver.release_shared_event(self.event);
    }
}

/**
A `CAMetalLayer`.

Drawables are handed out by the layer, so their textures are registered the first time each one
is seen and never released by the swap chain.  Acquisition blocks in `nextDrawable` instead of
signalling a semaphore.
*/
#[derive(Debug)]
pub struct SwapChain {
    desc: SwapChainDesc,
    layer: LayerHandle,
    textures: Vec<Texture>,
    current: Option<usize>,
    drawable: Option<DrawableHandle>,
    driver: Arc<dyn Driver>,
}

impl SwapChain {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        window: RawWindowHandle,
        display: RawDisplayHandle,
        desc: &SwapChainDesc,
    ) -> Result<Self, Error> {
        let layer = driver.new_layer(window, display, desc)?;
        logwise::info_sync!(
            "metal layer {width}x{height}, up to {count} drawables",
            width = desc.width,
            height = desc.height,
            count = desc.image_count
        );
        Ok(SwapChain {
            desc: *desc,
            layer,
            textures: Vec::new(),
            current: None,
            drawable: None,
            driver,
        })
    }

    pub fn layer(&self) -> LayerHandle {
        self.layer
    }

    /// Drawable textures seen so far.
    pub fn textures(&self) -> &[Texture] {
        &self.textures
    }
}

impl sync::SwapChain for SwapChain {
    type Backend = Metal;

    fn desc(&self) -> &SwapChainDesc {
        &self.desc
    }

    fn acquire_next_image(&mut self, signal: Option<&Semaphore>) -> Result<u32, Error> {
        if signal.is_some() {
            logwise::trace_sync!("metal acquire ignores its semaphore; nextDrawable blocks instead");
        }
        let (drawable, handle) = self.driver.next_drawable(self.layer)?;
        let index = match self.textures.iter().position(|t| t.handle() == handle) {
            Some(index) => index,
            None => {
                let index = self.textures.len();
                let desc = TextureDesc::new_2d(
                    &format!("drawable {index}"),
                    self.desc.width,
                    self.desc.height,
                    self.desc.format,
                    TextureUsage::RENDER_TARGET | TextureUsage::PRESENT | TextureUsage::COPY_DST,
                );
                self.textures.push(Texture::new(self.driver.clone(), desc, handle, false));
                index
            }
        };
        self.current = Some(index);
        self.drawable = Some(drawable);
        Ok(index as u32)
    }

    fn current_image(&self) -> u32 {
        self.current.unwrap_or(0) as u32
    }

    fn current_texture(&self) -> &Texture {
        let Some(index) = self.current else {
            fatal!("current_texture before the first acquire_next_image");
        };
        &self.textures[index]
    }

    fn present(&mut self, queue: &Queue, wait: &[&Semaphore]) -> Result<(), Error> {
        let (Some(index), Some(drawable)) = (self.current, self.drawable) else {
            fatal!("present without an acquired drawable");
        };
        check_presentable(&self.textures[index])?;
        let wait: Vec<(EventHandle, u64)> = wait.iter().map(|s| s.wait_value()).collect();
        self.driver
            .present_drawable(sync::Queue::queue_type(queue), drawable, &wait)?;
        self.drawable = None;
        Ok(())
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        self.textures.clear();
        self.driver.release_layer(self.layer);
    }
}
