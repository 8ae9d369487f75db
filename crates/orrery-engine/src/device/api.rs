use super::error::DeviceError;
use super::handle::{
    BufferHandle, CommandBufferHandle, DescriptorSetHandle, PipelineHandle, RenderPassHandle,
};

/// Where a buffer's memory lives.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MemoryLocation {
    /// Device-resident; filled by copies or queue writes only.
    DeviceLocal,
    /// Host-writable through [`GraphicsDevice::map_memory`]; used for staging.
    HostVisible,
}

/// Buffer creation parameters.
#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
    pub memory: MemoryLocation,
}

impl<'a> BufferDesc<'a> {
    pub fn staging(label: &'a str, size: u64) -> Self {
        Self {
            label,
            size,
            usage: wgpu::BufferUsages::COPY_SRC,
            memory: MemoryLocation::HostVisible,
        }
    }

    pub fn device_local(label: &'a str, size: u64, usage: wgpu::BufferUsages) -> Self {
        Self {
            label,
            size,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            memory: MemoryLocation::DeviceLocal,
        }
    }
}

/// One contiguous range of a buffer-to-buffer copy.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CopyRegion {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

impl CopyRegion {
    /// Copies `size` bytes at the same offset in source and destination.
    #[inline]
    pub const fn aligned(offset: u64, size: u64) -> Self {
        Self {
            src_offset: offset,
            dst_offset: offset,
            size,
        }
    }

    #[inline]
    pub const fn whole(size: u64) -> Self {
        Self::aligned(0, size)
    }
}

/// A uniform buffer binding inside a descriptor layout.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct UniformBinding {
    pub binding: u32,
    pub visibility: wgpu::ShaderStages,
    pub size: u64,
}

/// Descriptor set layout. Layouts are static per renderable kind and cached
/// by label in the backends.
#[derive(Debug, Eq, PartialEq)]
pub struct DescriptorLayoutDesc {
    pub label: &'static str,
    pub bindings: &'static [UniformBinding],
}

/// WGSL module and entry points for one renderable kind.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ShaderSource {
    pub name: &'static str,
    pub wgsl: &'static str,
    pub vertex_entry: &'static str,
    pub fragment_entry: &'static str,
}

/// Graphics pipeline creation parameters.
///
/// Viewport and scissor are always dynamic state; they are set while
/// recording the secondary command buffer.
#[derive(Debug, Clone)]
pub struct PipelineDesc<'a> {
    pub label: &'a str,
    pub shader: ShaderSource,
    pub vertex_layout: wgpu::VertexBufferLayout<'static>,
    pub topology: wgpu::PrimitiveTopology,
    pub descriptor_layout: Option<&'static DescriptorLayoutDesc>,
    pub render_pass: RenderPassHandle,
}

/// Graphics device contract consumed by the resource lifecycle.
///
/// Every method except [`map_memory`](Self::map_memory) is render-thread only.
/// `map_memory` is the single entry point the producer thread uses, always
/// under the owning staging channel's lock.
///
/// Destroy/free methods accept `None` as a no-op. Destroying a handle that is
/// not live is a caller bug and reports [`DeviceError::UnknownHandle`].
pub trait GraphicsDevice: Send + Sync {
    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<BufferHandle, DeviceError>;

    /// Size in bytes of a live buffer.
    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64>;

    /// Maps `size` bytes at `offset` of a host-visible buffer, hands them to
    /// `write`, then unmaps.
    fn map_memory(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
        write: &mut dyn FnMut(&mut [u8]),
    ) -> Result<(), DeviceError>;

    /// Queue-side write into any buffer created with `COPY_DST`.
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, bytes: &[u8])
    -> Result<(), DeviceError>;

    /// Device-side copy, submitted immediately and ordered before the next
    /// frame submission.
    fn copy_buffer(
        &self,
        dst: BufferHandle,
        src: BufferHandle,
        regions: &[CopyRegion],
    ) -> Result<(), DeviceError>;

    /// Reads back a buffer's contents. Diagnostics only.
    fn read_buffer(&self, buffer: BufferHandle) -> Result<Vec<u8>, DeviceError>;

    fn destroy_buffer(&self, buffer: Option<BufferHandle>) -> Result<(), DeviceError>;

    /// Creates one descriptor set binding `buffers` in layout order.
    ///
    /// Pool accounting is done by [`DescriptorPool`](crate::resource::DescriptorPool);
    /// the device only fails with `PoolExhausted` when its own backing store is full.
    fn create_descriptor_set(
        &self,
        layout: &DescriptorLayoutDesc,
        buffers: &[BufferHandle],
    ) -> Result<DescriptorSetHandle, DeviceError>;

    fn free_descriptor_sets(&self, sets: &[DescriptorSetHandle]) -> Result<(), DeviceError>;

    fn allocate_command_buffer(&self, label: &str) -> Result<CommandBufferHandle, DeviceError>;

    fn free_command_buffer(&self, buffer: Option<CommandBufferHandle>) -> Result<(), DeviceError>;

    fn create_pipeline(&self, desc: &PipelineDesc<'_>) -> Result<PipelineHandle, DeviceError>;

    fn destroy_pipeline(&self, pipeline: Option<PipelineHandle>) -> Result<(), DeviceError>;
}
