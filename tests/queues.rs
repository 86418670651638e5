// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Submission, fences, semaphores and swap chains against each backend's null driver.
#![cfg(any(feature = "backend_vulkan", feature = "backend_dx12", feature = "backend_metal"))]

use raw_window_handle::{RawDisplayHandle, RawWindowHandle, Win32WindowHandle, WindowsDisplayHandle};
use rhi::bindings::usage::{QueueType, ResourceUsage};
use rhi::commands::{PipelineBarrierDesc, TextureBarrier};
use rhi::error::Error;
use rhi::sync::{SubmitDesc, SwapChainDesc};
use rhi::{Backend, CommandList, Device, Fence, GpuTexture, Queue, SwapChain};
use std::num::NonZeroIsize;
use std::time::Duration;

fn window() -> (RawWindowHandle, RawDisplayHandle) {
    let hwnd = NonZeroIsize::new(7).unwrap();
    (
        RawWindowHandle::Win32(Win32WindowHandle::new(hwnd)),
        RawDisplayHandle::Windows(WindowsDisplayHandle::new()),
    )
}

fn recorded<D: Device>(device: &D, queue: QueueType) -> <D::Backend as Backend>::CommandList {
    let mut list = device.create_command_list(queue).unwrap();
    list.begin();
    list.end();
    list
}

fn fence_follows_submissions<D: Device>(device: &D) {
    let fence = device.create_fence(0).unwrap();
    assert_eq!(fence.completed_value(), 0);
    let queue = device.queue(QueueType::Compute);
    assert_eq!(queue.queue_type(), QueueType::Compute);
    let list = recorded(device, QueueType::Compute);

    queue
        .submit(&SubmitDesc::new().command_list(&list).signal_fence(&fence, 1))
        .unwrap();
    fence.wait(1).unwrap();
    assert_eq!(fence.completed_value(), 1);

    queue
        .submit(&SubmitDesc::new().command_list(&list).signal_fence(&fence, 5))
        .unwrap();
    test_executors::spin_on(fence.completion(5));
    assert_eq!(fence.completed_value(), 5);

    assert!(!fence.wait_timeout(6, Duration::from_millis(10)).unwrap());
    assert!(fence.wait_timeout(4, Duration::from_millis(10)).unwrap());
    queue.wait_idle().unwrap();
    device.wait_idle().unwrap();
}

fn initial_value_is_already_complete<D: Device>(device: &D) {
    let fence = device.create_fence(3).unwrap();
    assert_eq!(fence.completed_value(), 3);
    test_executors::spin_on(fence.completion(2));
    fence.wait(3).unwrap();
}

fn semaphores_chain_queues<D: Device>(device: &D) {
    let produced = device.create_semaphore().unwrap();
    let fence = device.create_fence(0).unwrap();
    let compute = recorded(device, QueueType::Compute);
    let graphics = recorded(device, QueueType::Graphics);
    device
        .queue(QueueType::Compute)
        .submit(&SubmitDesc::new().command_list(&compute).signal(&produced))
        .unwrap();
    device
        .queue(QueueType::Graphics)
        .submit(
            &SubmitDesc::new()
                .command_list(&graphics)
                .wait(&produced)
                .signal_fence(&fence, 1),
        )
        .unwrap();
    fence.wait(1).unwrap();
}

fn present_needs_present_usage<D: Device>(device: &D) {
    let (window, display) = window();
    let desc = SwapChainDesc::new(32, 32);
    let mut swap_chain = device.create_swap_chain(window, display, &desc).unwrap();
    assert_eq!(swap_chain.desc(), &desc);
    let index = swap_chain.acquire_next_image(None).unwrap();
    assert_eq!(swap_chain.current_image(), index);
    let queue = device.queue(QueueType::Graphics);
    assert!(matches!(
        swap_chain.present(queue, &[]),
        Err(Error::NotPresentable { .. })
    ));

    let mut list = device.create_command_list(QueueType::Graphics).unwrap();
    list.begin();
    list.pipeline_barrier(
        &PipelineBarrierDesc::new()
            .texture(TextureBarrier::new(swap_chain.current_texture(), ResourceUsage::PRESENT)),
    );
    list.end();
    assert_eq!(swap_chain.current_texture().current_usage(), ResourceUsage::PRESENT);
    queue.submit(&SubmitDesc::new().command_list(&list)).unwrap();
    swap_chain.present(queue, &[]).unwrap();
}

fn submit_while_recording<D: Device>(device: &D) {
    let mut list = device.create_command_list(QueueType::Graphics).unwrap();
    list.begin();
    let _ = device
        .queue(QueueType::Graphics)
        .submit(&SubmitDesc::new().command_list(&list));
}

fn submit_to_the_wrong_queue<D: Device>(device: &D) {
    let list = recorded(device, QueueType::Copy);
    let _ = device
        .queue(QueueType::Graphics)
        .submit(&SubmitDesc::new().command_list(&list));
}

#[cfg(feature = "backend_vulkan")]
mod vulkan {
    use super::*;
    use rhi::config::RhiConfig;
    use rhi::vulkan::{Device, DriverCall, NullDriver};
    use std::sync::Arc;

    fn device() -> Device {
        Device::null(RhiConfig::default())
    }

    #[test]
    fn fence_follows_submissions() {
        super::fence_follows_submissions(&device());
    }

    #[test]
    fn initial_value_is_already_complete() {
        super::initial_value_is_already_complete(&device());
    }

    #[test]
    fn semaphores_chain_queues() {
        let driver = Arc::new(NullDriver::new());
        let device = Device::new(driver.clone(), RhiConfig::default());
        super::semaphores_chain_queues(&device);
        let submits: Vec<(QueueType, usize, usize)> = driver
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::QueueSubmit { queue, wait, signal, .. } => Some((queue, wait.len(), signal.len())),
                _ => None,
            })
            .collect();
        assert_eq!(submits, vec![(QueueType::Compute, 0, 1), (QueueType::Graphics, 1, 0)]);
    }

    #[test]
    fn present_needs_present_usage() {
        super::present_needs_present_usage(&device());
    }

    #[test]
    #[should_panic(expected = "still recording")]
    fn submit_while_recording() {
        super::submit_while_recording(&device());
    }

    #[test]
    #[should_panic(expected = "submitted to the Graphics queue")]
    fn submit_to_the_wrong_queue() {
        super::submit_to_the_wrong_queue(&device());
    }
}

#[cfg(feature = "backend_dx12")]
mod dx12 {
    use super::*;
    use rhi::config::RhiConfig;
    use rhi::dx12::{Device, DriverCall, NullDriver};
    use std::sync::Arc;

    fn device() -> Device {
        Device::null(RhiConfig::default()).unwrap()
    }

    #[test]
    fn fence_follows_submissions() {
        super::fence_follows_submissions(&device());
    }

    #[test]
    fn initial_value_is_already_complete() {
        super::initial_value_is_already_complete(&device());
    }

    #[test]
    fn semaphores_chain_queues() {
        let driver = Arc::new(NullDriver::new());
        let device = Device::new(driver.clone(), RhiConfig::default()).unwrap();
        super::semaphores_chain_queues(&device);
        let submits: Vec<(QueueType, usize, usize)> = driver
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::ExecuteCommandLists { queue, wait, signal, .. } => Some((queue, wait.len(), signal.len())),
                _ => None,
            })
            .collect();
        assert_eq!(submits, vec![(QueueType::Compute, 0, 1), (QueueType::Graphics, 1, 0)]);
    }

    #[test]
    fn present_needs_present_usage() {
        super::present_needs_present_usage(&device());
    }

    #[test]
    #[should_panic(expected = "still recording")]
    fn submit_while_recording() {
        super::submit_while_recording(&device());
    }

    #[test]
    #[should_panic(expected = "submitted to the Graphics queue")]
    fn submit_to_the_wrong_queue() {
        super::submit_to_the_wrong_queue(&device());
    }
}

#[cfg(feature = "backend_metal")]
mod metal {
    use super::*;
    use rhi::config::RhiConfig;
    use rhi::metal::{Device, DriverCall, NullDriver};
    use std::sync::Arc;
    use rhi::Device as _;

    fn device() -> Device {
        Device::null(RhiConfig::default()).unwrap()
    }

    #[test]
    fn fence_follows_submissions() {
        super::fence_follows_submissions(&device());
    }

    #[test]
    fn initial_value_is_already_complete() {
        super::initial_value_is_already_complete(&device());
    }

    #[test]
    fn semaphores_chain_queues() {
        let driver = Arc::new(NullDriver::new());
        let device = Device::new(driver.clone(), RhiConfig::default()).unwrap();
        super::semaphores_chain_queues(&device);
        let commits: Vec<(QueueType, Vec<u64>, Vec<u64>)> = driver
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Commit { queue, wait, signal, .. } => Some((
                    queue,
                    wait.iter().map(|(_, v)| *v).collect(),
                    signal.iter().map(|(_, v)| *v).collect(),
                )),
                _ => None,
            })
            .collect();
        assert_eq!(
            commits,
            vec![
                (QueueType::Compute, vec![], vec![1]),
                (QueueType::Graphics, vec![1], vec![]),
            ]
        );
    }

    #[test]
    fn present_needs_present_usage() {
        super::present_needs_present_usage(&device());
    }

    #[test]
    #[should_panic(expected = "still recording")]
    fn submit_while_recording() {
        super::submit_while_recording(&device());
    }

    #[test]
    #[should_panic(expected = "submitted to the Graphics queue")]
    fn submit_to_the_wrong_queue() {
        super::submit_to_the_wrong_queue(&device());
    }

    #[test]
    #[should_panic(expected = "before the first acquire_next_image")]
    fn texture_before_acquire() {
        let device = device();
        let (window, display) = window();
        let swap_chain = device
            .create_swap_chain(window, display, &SwapChainDesc::new(32, 32))
            .unwrap();
        let _ = swap_chain.current_texture();
    }

    #[test]
    fn drawables_are_registered_once() {
        let device = device();
        let (window, display) = window();
        let mut swap_chain = device
            .create_swap_chain(window, display, &SwapChainDesc::new(32, 32))
            .unwrap();
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(swap_chain.acquire_next_image(None).unwrap());
        }
        assert_eq!(swap_chain.textures().len(), 3);
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2]);
    }
}
