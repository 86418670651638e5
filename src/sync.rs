// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Queues, fences, semaphores and swap chains.

These are thin: the backends hand submissions to their driver, and the driver signals fences
when the GPU gets there.  Fences are value based (timeline) on every backend.

Waiting comes in two flavours.  [`Fence::wait`] blocks the calling thread with no timeout,
matching the native blocking waits; callers that need to stay responsive poll
[`Fence::completed_value`] or await [`Fence::completion`] instead.

```
# #[cfg(feature = "backend_vulkan")] {
use rhi::{Device, Fence};
let device = rhi::vulkan::Device::null(Default::default());
let fence = device.create_fence(0).unwrap();
assert_eq!(fence.completed_value(), 0);
# }
```
*/

use crate::backend::{Backend, GpuTexture};
use crate::bindings::usage::{QueueType, ResourceUsage};
use crate::error::{reject, Error};
use crate::resources::Format;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/**
Completion state shared between a fence and whoever signals it.

Signals only move the value forward.  Futures waiting on a value are woken when it is reached,
or when the core is dropped, so no continuation is ever abandoned.
*/
pub(crate) struct FenceCore {
    label: String,
    completed: AtomicU64,
    waiters: Mutex<Vec<(u64, r#continue::Sender<()>)>>,
    condvar: Condvar,
}

impl FenceCore {
    pub(crate) fn new(label: &str, initial_value: u64) -> Self {
        FenceCore {
            label: label.to_string(),
            completed: AtomicU64::new(initial_value),
            waiters: Mutex::new(Vec::new()),
            condvar: Condvar::new(),
        }
    }

    pub(crate) fn completed_value(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    pub(crate) fn signal(&self, value: u64) {
        let mut waiters = self.waiters.lock().unwrap();
        let previous = self.completed.fetch_max(value, Ordering::AcqRel);
        if value <= previous {
            return;
        }
        logwise::trace_sync!(
            "fence {label} reached {value}",
            label = logwise::privacy::LogIt(&self.label),
            value = value
        );
        let mut i = 0;
        while i < waiters.len() {
            if waiters[i].0 <= value {
                let (_, sender) = waiters.swap_remove(i);
                sender.send(());
            } else {
                i += 1;
            }
        }
        self.condvar.notify_all();
    }

    pub(crate) fn wait(&self, value: u64) {
        let mut guard = self.waiters.lock().unwrap();
        while self.completed_value() < value {
            guard = self.condvar.wait(guard).unwrap();
        }
    }

    /// Returns whether `value` was reached before `timeout` elapsed.
    pub(crate) fn wait_timeout(&self, value: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.waiters.lock().unwrap();
        while self.completed_value() < value {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self.condvar.wait_timeout(guard, deadline - now).unwrap().0;
        }
        true
    }

    pub(crate) fn completion(&self, value: u64) -> impl Future<Output = ()> + use<> {
        let (sender, future) = r#continue::continuation();
        let mut waiters = self.waiters.lock().unwrap();
        if self.completed_value() >= value {
            sender.send(());
        } else {
            waiters.push((value, sender));
        }
        future
    }
}

impl Drop for FenceCore {
    fn drop(&mut self) {
        let waiters = std::mem::take(self.waiters.get_mut().unwrap_or_else(|e| e.into_inner()));
        for (_, sender) in waiters {
            sender.send(());
        }
    }
}

impl Debug for FenceCore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FenceCore")
            .field("label", &self.label)
            .field("completed", &self.completed_value())
            .finish()
    }
}

/**
A fence value a driver must signal once the submission carrying it completes.

Drivers receive these with every submission and call [`FenceSignal::complete`] when the GPU
reaches that point (the null drivers do so immediately).
*/
#[derive(Debug, Clone)]
pub struct FenceSignal {
    core: Arc<FenceCore>,
    value: u64,
}

impl FenceSignal {
    pub(crate) fn new(core: Arc<FenceCore>, value: u64) -> Self {
        FenceSignal { core, value }
    }
    pub fn value(&self) -> u64 {
        self.value
    }
    pub fn complete(&self) {
        self.core.signal(self.value);
    }
}

pub trait Fence: Debug + Send + Sync {
    /// The highest value the GPU has signalled.
    fn completed_value(&self) -> u64;
    /// Blocks until the fence reaches `value`.
    fn wait(&self, value: u64) -> Result<(), Error>;
    /// Blocks until the fence reaches `value` or `timeout` elapses; returns whether it was reached.
    fn wait_timeout(&self, value: u64, timeout: Duration) -> Result<bool, Error>;
    /// Resolves once the fence reaches `value`.
    fn completion(&self, value: u64) -> impl Future<Output = ()>;
}

/// Bookkeeping every queue needs for `wait_idle`: an internal fence signalled by each submission.
#[derive(Debug)]
pub(crate) struct QueueCore {
    ty: QueueType,
    idle: Arc<FenceCore>,
    next_value: AtomicU64,
}

impl QueueCore {
    pub(crate) fn new(ty: QueueType) -> Self {
        QueueCore {
            ty,
            idle: Arc::new(FenceCore::new("queue idle", 0)),
            next_value: AtomicU64::new(1),
        }
    }

    pub(crate) fn queue_type(&self) -> QueueType {
        self.ty
    }

    /// The idle-fence signal the next submission carries.
    pub(crate) fn next_idle_signal(&self) -> FenceSignal {
        FenceSignal::new(self.idle.clone(), self.next_value.fetch_add(1, Ordering::AcqRel))
    }

    pub(crate) fn wait_idle(&self) {
        let last = self.next_value.load(Ordering::Acquire) - 1;
        self.idle.wait(last);
    }

    /// Sequencing checks shared by every backend's `submit`.
    pub(crate) fn check_submission<L: crate::commands::CommandList>(&self, lists: &[&L]) {
        for list in lists {
            if list.is_recording() {
                crate::error::fatal!("submitting a command list that is still recording");
            }
            if list.queue_type() != self.ty {
                crate::error::fatal!(
                    "command list recorded for the {:?} queue submitted to the {:?} queue",
                    list.queue_type(),
                    self.ty
                );
            }
        }
    }
}

/// What one `submit` call executes and signals.
#[derive(Debug)]
pub struct SubmitDesc<'a, B: Backend> {
    pub command_lists: Vec<&'a B::CommandList>,
    pub wait_semaphores: Vec<&'a B::Semaphore>,
    pub signal_semaphores: Vec<&'a B::Semaphore>,
    pub signal_fence: Option<(&'a B::Fence, u64)>,
}

impl<'a, B: Backend> Default for SubmitDesc<'a, B> {
    fn default() -> Self {
        SubmitDesc {
            command_lists: Vec::new(),
            wait_semaphores: Vec::new(),
            signal_semaphores: Vec::new(),
            signal_fence: None,
        }
    }
}

impl<'a, B: Backend> SubmitDesc<'a, B> {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn command_list(mut self, list: &'a B::CommandList) -> Self {
        self.command_lists.push(list);
        self
    }
    pub fn wait(mut self, semaphore: &'a B::Semaphore) -> Self {
        self.wait_semaphores.push(semaphore);
        self
    }
    pub fn signal(mut self, semaphore: &'a B::Semaphore) -> Self {
        self.signal_semaphores.push(semaphore);
        self
    }
    pub fn signal_fence(mut self, fence: &'a B::Fence, value: u64) -> Self {
        self.signal_fence = Some((fence, value));
        self
    }
}

pub trait Queue: Debug + Send + Sync {
    type Backend: Backend;

    fn queue_type(&self) -> QueueType;

    /// Submits closed command lists in order.  Cross-queue ordering comes only from the
    /// semaphores waited on and signalled here.
    fn submit(&self, submit: &SubmitDesc<'_, Self::Backend>) -> Result<(), Error>;

    /// Blocks until everything submitted to this queue has completed.
    fn wait_idle(&self) -> Result<(), Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapChainDesc {
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub image_count: u32,
    pub vsync: bool,
}

impl SwapChainDesc {
    pub fn new(width: u32, height: u32) -> Self {
        SwapChainDesc {
            width,
            height,
            format: Format::Bgra8Unorm,
            image_count: 3,
            vsync: true,
        }
    }
}

pub trait SwapChain: Debug + Send + Sync {
    type Backend: Backend;

    fn desc(&self) -> &SwapChainDesc;
    /// Acquires the next image, signalling `signal` when it is ready to be rendered to.
    fn acquire_next_image(&mut self, signal: Option<&<Self::Backend as Backend>::Semaphore>) -> Result<u32, Error>;
    fn current_image(&self) -> u32;
    fn current_texture(&self) -> &<Self::Backend as Backend>::Texture;
    /// Presents the current image.  The image must have been transitioned to `PRESENT`.
    fn present(
        &mut self,
        queue: &<Self::Backend as Backend>::Queue,
        wait: &[&<Self::Backend as Backend>::Semaphore],
    ) -> Result<(), Error>;
}

pub(crate) fn check_presentable<T: GpuTexture>(texture: &T) -> Result<(), Error> {
    let usage = texture.current_usage();
    if !usage.contains(ResourceUsage::PRESENT) {
        return Err(reject(Error::NotPresentable {
            usage: usage.to_string(),
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_moves_forward_only() {
        let core = FenceCore::new("t", 3);
        core.signal(2);
        assert_eq!(core.completed_value(), 3);
        core.signal(5);
        assert_eq!(core.completed_value(), 5);
    }

    #[test]
    fn blocking_wait_across_threads() {
        let core = Arc::new(FenceCore::new("t", 0));
        let signaller = core.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            signaller.signal(1);
        });
        core.wait(1);
        assert_eq!(core.completed_value(), 1);
        handle.join().unwrap();
    }

    #[test]
    fn timeout_expires() {
        let core = FenceCore::new("t", 0);
        assert!(!core.wait_timeout(1, Duration::from_millis(5)));
        assert!(core.wait_timeout(0, Duration::from_millis(5)));
    }

    #[test]
    fn completion_future() {
        let core = FenceCore::new("t", 0);
        let ready = core.completion(0);
        test_executors::spin_on(ready);
        let later = core.completion(2);
        core.signal(2);
        test_executors::spin_on(later);
    }

    #[test]
    fn dropping_core_wakes_waiters() {
        let core = FenceCore::new("t", 0);
        let pending = core.completion(10);
        drop(core);
        test_executors::spin_on(pending);
    }

    #[test]
    fn queue_idle_tracks_submissions() {
        let queue = QueueCore::new(QueueType::Graphics);
        let signal = queue.next_idle_signal();
        assert_eq!(signal.value(), 1);
        signal.complete();
        queue.wait_idle();
    }
}
