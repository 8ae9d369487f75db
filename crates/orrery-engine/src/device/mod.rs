//! Graphics device layer.
//!
//! This module is responsible for:
//! - the backend-neutral [`GraphicsDevice`] contract and its handle types
//! - the wgpu backend and the headless [`RecordingDevice`]
//! - creating & configuring the window surface (swapchain) and acquiring frames

mod api;
mod context;
mod error;
mod frame;
mod handle;
mod init;
mod recording;
mod surface;
mod wgpu_device;

pub use api::{
    BufferDesc, CopyRegion, DescriptorLayoutDesc, GraphicsDevice, MemoryLocation, PipelineDesc,
    ShaderSource, UniformBinding,
};
pub use context::Gpu;
pub use error::{AnyHandle, DeviceError, SurfaceErrorAction};
pub use frame::GpuFrame;
pub use handle::{
    BufferHandle, CommandBufferHandle, DescriptorSetHandle, PipelineHandle, RenderPassHandle,
};
pub use init::GpuInit;
pub use recording::{DeviceCall, RecordingDevice};
pub use wgpu_device::WgpuDevice;
