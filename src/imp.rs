// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Backend implementations, one module per native API.

#[cfg(not(any(feature = "backend_vulkan", feature = "backend_dx12", feature = "backend_metal")))]
compile_error!("enable at least one of the backend_vulkan, backend_dx12 or backend_metal features");

#[cfg(feature = "backend_dx12")]
pub mod dx12;
#[cfg(feature = "backend_metal")]
pub mod metal;
#[cfg(feature = "backend_vulkan")]
pub mod vulkan;

/// The natural backend for the target among those enabled.
#[cfg(all(target_os = "windows", feature = "backend_dx12"))]
pub type PlatformBackend = dx12::Dx12;

#[cfg(all(
    any(target_os = "macos", target_os = "ios"),
    feature = "backend_metal",
    not(all(target_os = "windows", feature = "backend_dx12"))
))]
pub type PlatformBackend = metal::Metal;

#[cfg(all(
    feature = "backend_vulkan",
    not(all(target_os = "windows", feature = "backend_dx12")),
    not(all(any(target_os = "macos", target_os = "ios"), feature = "backend_metal"))
))]
pub type PlatformBackend = vulkan::Vulkan;

#[cfg(all(
    not(feature = "backend_vulkan"),
    not(all(target_os = "windows", feature = "backend_dx12")),
    not(all(any(target_os = "macos", target_os = "ios"), feature = "backend_metal")),
    feature = "backend_dx12"
))]
pub type PlatformBackend = dx12::Dx12;

#[cfg(all(
    not(feature = "backend_vulkan"),
    not(feature = "backend_dx12"),
    not(all(any(target_os = "macos", target_os = "ios"), feature = "backend_metal")),
    feature = "backend_metal"
))]
pub type PlatformBackend = metal::Metal;
