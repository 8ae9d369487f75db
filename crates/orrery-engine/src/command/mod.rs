//! Secondary command buffers.
//!
//! A secondary is a backend-neutral list of [`DrawCommand`]s recorded once per
//! swapchain image and executed inside the host's primary render pass. The
//! wgpu backend replays it with
//! [`WgpuDevice::execute_secondary`](crate::device::WgpuDevice::execute_secondary).

mod secondary;

pub use secondary::{
    CommandRecorder, DrawCommand, Inheritance, RecordKey, RecordState, SecondaryCommandBuffer,
};
