// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Error taxonomy shared by every backend.
//!
//! Errors fall into three classes:
//!
//! * **Configuration errors** (malformed layouts, binding-type mismatches, oversized root-constant
//!   writes) are returned as [`Error`] values.  Layout builds abort; binding writes are skipped and
//!   leave prior bindings untouched.
//! * **Sequencing errors** (an operation issued against the wrong encoder, binding outside an update
//!   transaction, submitting a list that is still recording) are programmer errors.  They are
//!   reported through the crate's `fatal!` macro, which logs and then panics.
//! * **Backend errors** (descriptor exhaustion, device loss, native call failures) are returned as
//!   [`Error`] values from the driver seam and are generally not recoverable at this layer.

use crate::bindings::slot::ResourceType;

/// Errors produced by layout building, bind-group updates and driver calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("duplicate binding slot {ty:?} b{binding} space{space}")]
    DuplicateSlot {
        ty: ResourceType,
        binding: u32,
        space: u32,
    },
    #[error("binding slot {ty:?} b{binding} space{space} has array size 0")]
    InvalidArraySize {
        ty: ResourceType,
        binding: u32,
        space: u32,
    },
    #[error("register space {space} is reserved for root constants")]
    ReservedSpaceCollision { space: u32 },
    #[error(
        "shifted binding range {first}..{end} for {ty:?} b{binding} overlaps another slot in set {space}"
    )]
    ShiftedBindingCollision {
        ty: ResourceType,
        binding: u32,
        space: u32,
        first: u32,
        end: u32,
    },
    #[error("shifted binding of {ty:?} b{binding} space{space} (array size {array_size}) does not fit a u32")]
    ShiftedBindingOverflow {
        ty: ResourceType,
        binding: u32,
        space: u32,
        array_size: u32,
    },
    #[error("root constant range b{binding} (offset {offset}, size {size}) is invalid: {reason}")]
    InvalidRootConstantRange {
        binding: u32,
        offset: u32,
        size: u32,
        reason: &'static str,
    },
    #[error("root constant binding b{binding} declared more than once")]
    DuplicateRootConstant { binding: u32 },
    #[error("register space {space} exceeds the bind group limit of {limit}")]
    TooManyBindGroups { space: u32, limit: u32 },
    #[error("register space {space} is not part of the layout")]
    UnknownSpace { space: u32 },
    #[error("root signature needs {dwords} DWORDs, limit is {limit}")]
    RootSignatureTooLarge { dwords: u32, limit: u32 },
    #[error("no {ty:?} slot at b{binding} in space{space}")]
    SlotNotFound {
        ty: ResourceType,
        binding: u32,
        space: u32,
    },
    #[error("resource '{resource}' cannot be bound as {ty:?} at b{binding}: {reason}")]
    DescriptorTypeMismatch {
        ty: ResourceType,
        binding: u32,
        resource: String,
        reason: &'static str,
    },
    #[error("array element {index} out of range for b{binding} (array size {array_size})")]
    ArrayIndexOutOfRange {
        binding: u32,
        index: u32,
        array_size: u32,
    },
    #[error("root constant write of {len} bytes exceeds the {size}-byte range at b{binding}")]
    RootConstantOverflow { binding: u32, len: usize, size: u32 },
    #[error("no root constant range at b{binding}")]
    UnknownRootConstant { binding: u32 },
    #[error("swap chain image is in usage {usage} rather than PRESENT")]
    NotPresentable { usage: String },
    #[error("invalid copy: {0}")]
    InvalidCopy(String),
    #[error("descriptor pool exhausted")]
    DescriptorPoolExhausted,
    #[error("descriptor heap exhausted: requested {requested}, capacity {capacity}")]
    DescriptorHeapExhausted { requested: u32, capacity: u32 },
    #[error("argument buffer for register space {space} would use buffer index {index}, limit is {limit}")]
    ArgumentBufferIndexOutOfRange { space: u32, index: u32, limit: u32 },
    #[error("buffer index {index} is claimed by both root constants and an argument buffer")]
    BufferIndexCollision { index: u32 },
    #[error("argument buffer arena exhausted: requested {requested} bytes, {free} free")]
    ArgumentArenaExhausted { requested: u64, free: u64 },
    #[error("out of memory")]
    OutOfMemory,
    #[error("device lost")]
    DeviceLost,
    #[error("driver error: {0}")]
    Driver(String),
}

/**
Reports a sequencing error and aborts.

Formats the message, logs it at error level through logwise and then panics with the same
message.  Used where continuing would submit an ill-formed native command stream.
*/
macro_rules! fatal {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        logwise::error_sync!(
            "fatal: {message}",
            message = logwise::privacy::LogIt(&message)
        );
        panic!("{}", message);
    }};
}
pub(crate) use fatal;

/// Logs a configuration error and hands it back, for use as `return Err(reject(..))`.
pub(crate) fn reject(error: Error) -> Error {
    logwise::error_sync!("{error}", error = logwise::privacy::LogIt(&error));
    error
}
