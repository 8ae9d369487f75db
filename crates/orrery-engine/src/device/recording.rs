use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::api::{
    BufferDesc, CopyRegion, DescriptorLayoutDesc, GraphicsDevice, MemoryLocation, PipelineDesc,
};
use super::error::{AnyHandle, DeviceError};
use super::handle::{
    BufferHandle, CommandBufferHandle, DescriptorSetHandle, HandleAllocator, PipelineHandle,
};

/// One call observed by a [`RecordingDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateBuffer {
        buffer: BufferHandle,
        size: u64,
        memory: MemoryLocation,
    },
    MapMemory {
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    },
    WriteBuffer {
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    },
    CopyBuffer {
        dst: BufferHandle,
        src: BufferHandle,
        regions: Vec<CopyRegion>,
    },
    DestroyBuffer(BufferHandle),
    CreateDescriptorSet(DescriptorSetHandle),
    FreeDescriptorSet(DescriptorSetHandle),
    AllocateCommandBuffer(CommandBufferHandle),
    FreeCommandBuffer(CommandBufferHandle),
    CreatePipeline(PipelineHandle),
    DestroyPipeline(PipelineHandle),
}

#[derive(Debug)]
struct BufferEntry {
    usage: wgpu::BufferUsages,
    memory: MemoryLocation,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct Inner {
    buffers: HashMap<BufferHandle, BufferEntry>,
    descriptor_sets: HashMap<DescriptorSetHandle, Vec<BufferHandle>>,
    command_buffers: HashMap<CommandBufferHandle, String>,
    pipelines: HashMap<PipelineHandle, String>,
    calls: Vec<DeviceCall>,
    fail_buffer_allocs: usize,
    descriptor_capacity: Option<usize>,
}

/// Headless [`GraphicsDevice`] backed by plain byte vectors.
///
/// Both memory locations are simulated, so copies and partial writes can be
/// verified byte for byte. Every call is appended to a log, allocation
/// failures can be injected, and destroying a handle twice is reported as
/// [`DeviceError::UnknownHandle`].
#[derive(Debug, Default)]
pub struct RecordingDevice {
    handles: HandleAllocator,
    inner: Mutex<Inner>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes the next `count` buffer creations fail with `OutOfMemory`.
    pub fn fail_next_buffer_allocs(&self, count: usize) {
        self.lock().fail_buffer_allocs = count;
    }

    /// Caps the number of live descriptor sets. `None` removes the cap.
    pub fn set_descriptor_capacity(&self, capacity: Option<usize>) {
        self.lock().descriptor_capacity = capacity;
    }

    /// Snapshot of every call since creation or the last [`clear_calls`](Self::clear_calls).
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn live_buffers(&self) -> usize {
        self.lock().buffers.len()
    }

    pub fn live_descriptor_sets(&self) -> usize {
        self.lock().descriptor_sets.len()
    }

    pub fn live_command_buffers(&self) -> usize {
        self.lock().command_buffers.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.lock().pipelines.len()
    }

    pub fn is_live_buffer(&self, buffer: BufferHandle) -> bool {
        self.lock().buffers.contains_key(&buffer)
    }

    /// Buffers bound by a live descriptor set.
    pub fn descriptor_bindings(&self, set: DescriptorSetHandle) -> Option<Vec<BufferHandle>> {
        self.lock().descriptor_sets.get(&set).cloned()
    }

    fn log_alloc(kind: &str, raw: u64, live: usize) {
        log::trace!(target: "orrery::alloc", "create {kind} #{raw} (live {live})");
    }

    fn log_free(kind: &str, raw: u64, live: usize) {
        log::trace!(target: "orrery::alloc", "destroy {kind} #{raw} (live {live})");
    }
}

fn check_range(len: usize, offset: u64, size: u64) -> Result<std::ops::Range<usize>, DeviceError> {
    let end = offset.checked_add(size).unwrap_or(u64::MAX);
    if end > len as u64 {
        return Err(DeviceError::InvalidUsage(format!(
            "range {offset}..{end} exceeds buffer size {len}"
        )));
    }
    Ok(offset as usize..end as usize)
}

impl GraphicsDevice for RecordingDevice {
    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<BufferHandle, DeviceError> {
        if desc.size == 0 {
            return Err(DeviceError::InvalidUsage(format!(
                "zero-sized buffer '{}'",
                desc.label
            )));
        }

        let mut inner = self.lock();
        if inner.fail_buffer_allocs > 0 {
            inner.fail_buffer_allocs -= 1;
            return Err(DeviceError::OutOfMemory {
                requested: desc.size,
            });
        }

        let buffer = BufferHandle::from_raw(self.handles.next());
        inner.buffers.insert(
            buffer,
            BufferEntry {
                usage: desc.usage,
                memory: desc.memory,
                bytes: vec![0; desc.size as usize],
            },
        );
        inner.calls.push(DeviceCall::CreateBuffer {
            buffer,
            size: desc.size,
            memory: desc.memory,
        });
        Self::log_alloc(desc.label, buffer.raw(), inner.buffers.len());
        Ok(buffer)
    }

    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        self.lock()
            .buffers
            .get(&buffer)
            .map(|entry| entry.bytes.len() as u64)
    }

    fn map_memory(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
        write: &mut dyn FnMut(&mut [u8]),
    ) -> Result<(), DeviceError> {
        let mut inner = self.lock();
        let entry = inner
            .buffers
            .get_mut(&buffer)
            .ok_or(DeviceError::UnknownHandle(AnyHandle::Buffer(buffer)))?;
        if entry.memory != MemoryLocation::HostVisible {
            return Err(DeviceError::InvalidUsage(
                "map_memory on a device-local buffer".to_string(),
            ));
        }
        let range = check_range(entry.bytes.len(), offset, size)?;
        write(&mut entry.bytes[range]);
        inner.calls.push(DeviceCall::MapMemory {
            buffer,
            offset,
            size,
        });
        Ok(())
    }

    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), DeviceError> {
        let mut inner = self.lock();
        let entry = inner
            .buffers
            .get_mut(&buffer)
            .ok_or(DeviceError::UnknownHandle(AnyHandle::Buffer(buffer)))?;
        if !entry.usage.contains(wgpu::BufferUsages::COPY_DST) {
            return Err(DeviceError::InvalidUsage(
                "write_buffer target lacks COPY_DST".to_string(),
            ));
        }
        let range = check_range(entry.bytes.len(), offset, bytes.len() as u64)?;
        entry.bytes[range].copy_from_slice(bytes);
        inner.calls.push(DeviceCall::WriteBuffer {
            buffer,
            offset,
            size: bytes.len() as u64,
        });
        Ok(())
    }

    fn copy_buffer(
        &self,
        dst: BufferHandle,
        src: BufferHandle,
        regions: &[CopyRegion],
    ) -> Result<(), DeviceError> {
        let mut inner = self.lock();
        let src_entry = inner
            .buffers
            .get(&src)
            .ok_or(DeviceError::UnknownHandle(AnyHandle::Buffer(src)))?;
        if !src_entry.usage.contains(wgpu::BufferUsages::COPY_SRC) {
            return Err(DeviceError::InvalidUsage(
                "copy source lacks COPY_SRC".to_string(),
            ));
        }

        let mut chunks = Vec::with_capacity(regions.len());
        for region in regions {
            let range = check_range(src_entry.bytes.len(), region.src_offset, region.size)?;
            chunks.push((region.dst_offset, src_entry.bytes[range].to_vec()));
        }

        let dst_entry = inner
            .buffers
            .get_mut(&dst)
            .ok_or(DeviceError::UnknownHandle(AnyHandle::Buffer(dst)))?;
        if !dst_entry.usage.contains(wgpu::BufferUsages::COPY_DST) {
            return Err(DeviceError::InvalidUsage(
                "copy destination lacks COPY_DST".to_string(),
            ));
        }
        for (offset, chunk) in &chunks {
            let range = check_range(dst_entry.bytes.len(), *offset, chunk.len() as u64)?;
            dst_entry.bytes[range].copy_from_slice(chunk);
        }

        inner.calls.push(DeviceCall::CopyBuffer {
            dst,
            src,
            regions: regions.to_vec(),
        });
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferHandle) -> Result<Vec<u8>, DeviceError> {
        self.lock()
            .buffers
            .get(&buffer)
            .map(|entry| entry.bytes.clone())
            .ok_or(DeviceError::UnknownHandle(AnyHandle::Buffer(buffer)))
    }

    fn destroy_buffer(&self, buffer: Option<BufferHandle>) -> Result<(), DeviceError> {
        let Some(buffer) = buffer else { return Ok(()) };
        let mut inner = self.lock();
        if inner.buffers.remove(&buffer).is_none() {
            return Err(DeviceError::UnknownHandle(AnyHandle::Buffer(buffer)));
        }
        inner.calls.push(DeviceCall::DestroyBuffer(buffer));
        Self::log_free("buffer", buffer.raw(), inner.buffers.len());
        Ok(())
    }

    fn create_descriptor_set(
        &self,
        layout: &DescriptorLayoutDesc,
        buffers: &[BufferHandle],
    ) -> Result<DescriptorSetHandle, DeviceError> {
        if layout.bindings.len() != buffers.len() {
            return Err(DeviceError::InvalidUsage(format!(
                "layout '{}' has {} bindings, got {} buffers",
                layout.label,
                layout.bindings.len(),
                buffers.len()
            )));
        }

        let mut inner = self.lock();
        if let Some(capacity) = inner.descriptor_capacity {
            let live = inner.descriptor_sets.len();
            if live >= capacity {
                return Err(DeviceError::PoolExhausted {
                    requested: 1,
                    available: capacity.saturating_sub(live),
                });
            }
        }
        for buffer in buffers {
            if !inner.buffers.contains_key(buffer) {
                return Err(DeviceError::UnknownHandle(AnyHandle::Buffer(*buffer)));
            }
        }

        let set = DescriptorSetHandle::from_raw(self.handles.next());
        inner.descriptor_sets.insert(set, buffers.to_vec());
        inner.calls.push(DeviceCall::CreateDescriptorSet(set));
        Self::log_alloc(layout.label, set.raw(), inner.descriptor_sets.len());
        Ok(set)
    }

    fn free_descriptor_sets(&self, sets: &[DescriptorSetHandle]) -> Result<(), DeviceError> {
        let mut inner = self.lock();
        if let Some(missing) = sets.iter().find(|s| !inner.descriptor_sets.contains_key(s)) {
            return Err(DeviceError::UnknownHandle(AnyHandle::DescriptorSet(*missing)));
        }
        for set in sets {
            inner.descriptor_sets.remove(set);
            inner.calls.push(DeviceCall::FreeDescriptorSet(*set));
            Self::log_free("descriptor set", set.raw(), inner.descriptor_sets.len());
        }
        Ok(())
    }

    fn allocate_command_buffer(&self, label: &str) -> Result<CommandBufferHandle, DeviceError> {
        let mut inner = self.lock();
        let buffer = CommandBufferHandle::from_raw(self.handles.next());
        inner.command_buffers.insert(buffer, label.to_string());
        inner.calls.push(DeviceCall::AllocateCommandBuffer(buffer));
        Self::log_alloc(label, buffer.raw(), inner.command_buffers.len());
        Ok(buffer)
    }

    fn free_command_buffer(&self, buffer: Option<CommandBufferHandle>) -> Result<(), DeviceError> {
        let Some(buffer) = buffer else { return Ok(()) };
        let mut inner = self.lock();
        if inner.command_buffers.remove(&buffer).is_none() {
            return Err(DeviceError::UnknownHandle(AnyHandle::CommandBuffer(buffer)));
        }
        inner.calls.push(DeviceCall::FreeCommandBuffer(buffer));
        Self::log_free("command buffer", buffer.raw(), inner.command_buffers.len());
        Ok(())
    }

    fn create_pipeline(&self, desc: &PipelineDesc<'_>) -> Result<PipelineHandle, DeviceError> {
        let mut inner = self.lock();
        let pipeline = PipelineHandle::from_raw(self.handles.next());
        inner.pipelines.insert(pipeline, desc.label.to_string());
        inner.calls.push(DeviceCall::CreatePipeline(pipeline));
        Self::log_alloc(desc.label, pipeline.raw(), inner.pipelines.len());
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: Option<PipelineHandle>) -> Result<(), DeviceError> {
        let Some(pipeline) = pipeline else { return Ok(()) };
        let mut inner = self.lock();
        if inner.pipelines.remove(&pipeline).is_none() {
            return Err(DeviceError::UnknownHandle(AnyHandle::Pipeline(pipeline)));
        }
        inner.calls.push(DeviceCall::DestroyPipeline(pipeline));
        Self::log_free("pipeline", pipeline.raw(), inner.pipelines.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging(device: &RecordingDevice, size: u64) -> BufferHandle {
        device
            .create_buffer(&BufferDesc::staging("test staging", size))
            .unwrap()
    }

    // ── buffers ───────────────────────────────────────────────────────────

    #[test]
    fn copy_moves_only_requested_regions() {
        let device = RecordingDevice::new();
        let src = staging(&device, 8);
        let dst = device
            .create_buffer(&BufferDesc::device_local(
                "test dst",
                8,
                wgpu::BufferUsages::VERTEX,
            ))
            .unwrap();

        device
            .map_memory(src, 0, 8, &mut |bytes| bytes.copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]))
            .unwrap();
        device.copy_buffer(dst, src, &[CopyRegion::aligned(4, 4)]).unwrap();

        assert_eq!(device.read_buffer(dst).unwrap(), vec![0, 0, 0, 0, 5, 6, 7, 8]);
    }

    #[test]
    fn map_rejects_device_local() {
        let device = RecordingDevice::new();
        let dst = device
            .create_buffer(&BufferDesc::device_local(
                "test dst",
                4,
                wgpu::BufferUsages::VERTEX,
            ))
            .unwrap();
        let err = device.map_memory(dst, 0, 4, &mut |_| {}).unwrap_err();
        assert!(matches!(err, DeviceError::InvalidUsage(_)));
    }

    #[test]
    fn double_destroy_is_reported() {
        let device = RecordingDevice::new();
        let buffer = staging(&device, 4);
        device.destroy_buffer(Some(buffer)).unwrap();
        assert_eq!(
            device.destroy_buffer(Some(buffer)),
            Err(DeviceError::UnknownHandle(AnyHandle::Buffer(buffer)))
        );
    }

    #[test]
    fn destroy_none_is_noop() {
        let device = RecordingDevice::new();
        device.destroy_buffer(None).unwrap();
        assert!(device.calls().is_empty());
    }

    #[test]
    fn injected_failures_are_consumed() {
        let device = RecordingDevice::new();
        device.fail_next_buffer_allocs(1);
        assert!(matches!(
            device.create_buffer(&BufferDesc::staging("x", 4)),
            Err(DeviceError::OutOfMemory { requested: 4 })
        ));
        assert!(device.create_buffer(&BufferDesc::staging("x", 4)).is_ok());
    }

    // ── descriptor sets ───────────────────────────────────────────────────

    static LAYOUT: DescriptorLayoutDesc = DescriptorLayoutDesc {
        label: "test layout",
        bindings: &[super::super::api::UniformBinding {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            size: 64,
        }],
    };

    #[test]
    fn descriptor_capacity_is_enforced() {
        let device = RecordingDevice::new();
        let ubo = staging(&device, 64);
        device.set_descriptor_capacity(Some(1));
        device.create_descriptor_set(&LAYOUT, &[ubo]).unwrap();
        assert!(matches!(
            device.create_descriptor_set(&LAYOUT, &[ubo]),
            Err(DeviceError::PoolExhausted { .. })
        ));
    }
}
