use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::api::{
    BufferDesc, CopyRegion, DescriptorLayoutDesc, GraphicsDevice, MemoryLocation, PipelineDesc,
};
use super::error::{AnyHandle, DeviceError};
use super::handle::{
    BufferHandle, CommandBufferHandle, DescriptorSetHandle, HandleAllocator, PipelineHandle,
    RenderPassHandle,
};
use crate::command::{DrawCommand, SecondaryCommandBuffer};

/// wgpu requires copy offsets and sizes to be multiples of this.
const COPY_ALIGN: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

#[inline]
fn align_down(v: u64) -> u64 {
    v & !(COPY_ALIGN - 1)
}

#[inline]
fn align_up(v: u64) -> u64 {
    (v + COPY_ALIGN - 1) & !(COPY_ALIGN - 1)
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    /// Requested size; the wgpu allocation is rounded up to `COPY_ALIGN`.
    size: u64,
    /// Host copy of a host-visible buffer, uploaded on unmap.
    shadow: Option<Vec<u8>>,
}

#[derive(Default)]
struct Objects {
    buffers: HashMap<BufferHandle, GpuBuffer>,
    bind_groups: HashMap<DescriptorSetHandle, wgpu::BindGroup>,
    layouts: HashMap<&'static str, wgpu::BindGroupLayout>,
    pipelines: HashMap<PipelineHandle, wgpu::RenderPipeline>,
    command_buffers: HashSet<CommandBufferHandle>,
    render_passes: HashMap<RenderPassHandle, wgpu::TextureFormat>,
}

/// [`GraphicsDevice`] over a wgpu device/queue pair.
///
/// Handles index a slab of wgpu objects. Host-visible buffers are modelled as a
/// shadow allocation uploaded through `Queue::write_buffer`, which wgpu orders
/// before the next submission. Secondaries are replayed into a caller-owned
/// `wgpu::RenderPass` by [`execute_secondary`](Self::execute_secondary).
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    handles: HandleAllocator,
    objects: Mutex<Objects>,
}

impl WgpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            handles: HandleAllocator::new(),
            objects: Mutex::new(Objects::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Objects> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a color target format and returns the handle pipelines use
    /// to name it. Registering the same format twice returns the same handle.
    pub fn register_render_pass(&self, format: wgpu::TextureFormat) -> RenderPassHandle {
        let mut objects = self.lock();
        if let Some((handle, _)) = objects.render_passes.iter().find(|(_, f)| **f == format) {
            return *handle;
        }
        let handle = RenderPassHandle::from_raw(self.handles.next());
        objects.render_passes.insert(handle, format);
        log::debug!("registered render pass #{} for {format:?}", handle.raw());
        handle
    }

    /// Replays a recorded secondary into an open render pass.
    ///
    /// Fails without touching the pass when the secondary is not executable or
    /// names an object that is no longer live.
    pub fn execute_secondary(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        secondary: &SecondaryCommandBuffer,
    ) -> Result<(), DeviceError> {
        if !secondary.is_executable() {
            return Err(DeviceError::InvalidUsage(format!(
                "secondary #{} is not executable",
                secondary.handle().raw()
            )));
        }

        let objects = self.lock();
        if !objects.command_buffers.contains(&secondary.handle()) {
            return Err(DeviceError::UnknownHandle(AnyHandle::CommandBuffer(
                secondary.handle(),
            )));
        }

        // Resolve first so a stale handle cannot leave the pass half-configured.
        for cmd in secondary.commands() {
            match cmd {
                DrawCommand::BindPipeline(p) if !objects.pipelines.contains_key(p) => {
                    return Err(DeviceError::UnknownHandle(AnyHandle::Pipeline(*p)));
                }
                DrawCommand::BindVertexBuffer { buffer, .. }
                    if !objects.buffers.contains_key(buffer) =>
                {
                    return Err(DeviceError::UnknownHandle(AnyHandle::Buffer(*buffer)));
                }
                DrawCommand::BindDescriptorSet { set, .. }
                    if !objects.bind_groups.contains_key(set) =>
                {
                    return Err(DeviceError::UnknownHandle(AnyHandle::DescriptorSet(*set)));
                }
                _ => {}
            }
        }

        for cmd in secondary.commands() {
            match cmd {
                DrawCommand::SetViewport(vp) => {
                    pass.set_viewport(vp.x, vp.y, vp.width, vp.height, vp.min_depth, vp.max_depth)
                }
                DrawCommand::SetScissor {
                    x,
                    y,
                    width,
                    height,
                } => pass.set_scissor_rect(*x, *y, *width, *height),
                DrawCommand::BindPipeline(p) => {
                    if let Some(pipeline) = objects.pipelines.get(p) {
                        pass.set_pipeline(pipeline);
                    }
                }
                DrawCommand::BindVertexBuffer { slot, buffer } => {
                    if let Some(entry) = objects.buffers.get(buffer) {
                        pass.set_vertex_buffer(*slot, entry.buffer.slice(..entry.size));
                    }
                }
                DrawCommand::BindDescriptorSet { index, set } => {
                    if let Some(group) = objects.bind_groups.get(set) {
                        pass.set_bind_group(*index, group, &[]);
                    }
                }
                DrawCommand::Draw {
                    vertices,
                    instances,
                } => pass.draw(vertices.clone(), instances.clone()),
            }
        }
        Ok(())
    }

    fn layout_for(&self, objects: &mut Objects, desc: &DescriptorLayoutDesc) -> wgpu::BindGroupLayout {
        objects
            .layouts
            .entry(desc.label)
            .or_insert_with(|| {
                let entries: Vec<wgpu::BindGroupLayoutEntry> = desc
                    .bindings
                    .iter()
                    .map(|b| wgpu::BindGroupLayoutEntry {
                        binding: b.binding,
                        visibility: b.visibility,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: wgpu::BufferSize::new(b.size),
                        },
                        count: None,
                    })
                    .collect();
                self.device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some(desc.label),
                        entries: &entries,
                    })
            })
            .clone()
    }

    /// Runs `f` under an out-of-memory error scope.
    fn with_oom_scope<T>(&self, requested: u64, f: impl FnOnce() -> T) -> Result<T, DeviceError> {
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let out = f();
        if let Some(err) = pollster::block_on(scope.pop()) {
            log::error!(target: "orrery::alloc", "wgpu allocation failed: {err}");
            return Err(DeviceError::OutOfMemory { requested });
        }
        Ok(out)
    }
}

impl GraphicsDevice for WgpuDevice {
    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<BufferHandle, DeviceError> {
        if desc.size == 0 {
            return Err(DeviceError::InvalidUsage(format!(
                "zero-sized buffer '{}'",
                desc.label
            )));
        }

        let usage = match desc.memory {
            // Shadow uploads go through `write_buffer`, which needs COPY_DST.
            MemoryLocation::HostVisible => desc.usage | wgpu::BufferUsages::COPY_DST,
            MemoryLocation::DeviceLocal => desc.usage,
        };
        let buffer = self.with_oom_scope(desc.size, || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(desc.label),
                size: align_up(desc.size),
                usage,
                mapped_at_creation: false,
            })
        })?;

        let shadow = match desc.memory {
            MemoryLocation::HostVisible => Some(vec![0; align_up(desc.size) as usize]),
            MemoryLocation::DeviceLocal => None,
        };

        let handle = BufferHandle::from_raw(self.handles.next());
        let mut objects = self.lock();
        objects.buffers.insert(
            handle,
            GpuBuffer {
                buffer,
                size: desc.size,
                shadow,
            },
        );
        log::trace!(
            target: "orrery::alloc",
            "create buffer {} #{} ({} B, live {})",
            desc.label,
            handle.raw(),
            desc.size,
            objects.buffers.len()
        );
        Ok(handle)
    }

    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        self.lock().buffers.get(&buffer).map(|b| b.size)
    }

    fn map_memory(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
        write: &mut dyn FnMut(&mut [u8]),
    ) -> Result<(), DeviceError> {
        let mut objects = self.lock();
        let entry = objects
            .buffers
            .get_mut(&buffer)
            .ok_or(DeviceError::UnknownHandle(AnyHandle::Buffer(buffer)))?;
        let end = offset.saturating_add(size);
        if end > entry.size {
            return Err(DeviceError::InvalidUsage(format!(
                "map range {offset}..{end} exceeds buffer size {}",
                entry.size
            )));
        }
        let Some(shadow) = entry.shadow.as_mut() else {
            return Err(DeviceError::InvalidUsage(
                "map_memory on a device-local buffer".to_string(),
            ));
        };

        write(&mut shadow[offset as usize..end as usize]);

        // Unmap: upload the touched range widened to copy alignment.
        let lo = align_down(offset);
        let hi = align_up(end).min(shadow.len() as u64);
        self.queue
            .write_buffer(&entry.buffer, lo, &shadow[lo as usize..hi as usize]);
        Ok(())
    }

    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), DeviceError> {
        let objects = self.lock();
        let entry = objects
            .buffers
            .get(&buffer)
            .ok_or(DeviceError::UnknownHandle(AnyHandle::Buffer(buffer)))?;
        if offset % COPY_ALIGN != 0 || bytes.len() as u64 % COPY_ALIGN != 0 {
            return Err(DeviceError::InvalidUsage(format!(
                "unaligned write of {} bytes at {offset}",
                bytes.len()
            )));
        }
        self.queue.write_buffer(&entry.buffer, offset, bytes);
        Ok(())
    }

    fn copy_buffer(
        &self,
        dst: BufferHandle,
        src: BufferHandle,
        regions: &[CopyRegion],
    ) -> Result<(), DeviceError> {
        let objects = self.lock();
        let src_entry = objects
            .buffers
            .get(&src)
            .ok_or(DeviceError::UnknownHandle(AnyHandle::Buffer(src)))?;
        let dst_entry = objects
            .buffers
            .get(&dst)
            .ok_or(DeviceError::UnknownHandle(AnyHandle::Buffer(dst)))?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("orrery one-time copy"),
            });
        for region in regions {
            // Widen to alignment; callers copy whole elements so the extra
            // bytes carry the same data in both buffers.
            let lo = align_down(region.src_offset);
            let shift = region.src_offset - lo;
            let size = align_up(region.size + shift)
                .min(align_up(src_entry.size) - lo)
                .min(align_up(dst_entry.size) - (region.dst_offset - shift));
            encoder.copy_buffer_to_buffer(
                &src_entry.buffer,
                lo,
                &dst_entry.buffer,
                region.dst_offset - shift,
                size,
            );
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn read_buffer(&self, buffer: BufferHandle) -> Result<Vec<u8>, DeviceError> {
        let objects = self.lock();
        let entry = objects
            .buffers
            .get(&buffer)
            .ok_or(DeviceError::UnknownHandle(AnyHandle::Buffer(buffer)))?;
        entry
            .shadow
            .as_ref()
            .map(|s| s[..entry.size as usize].to_vec())
            .ok_or(DeviceError::Unsupported("readback of device-local buffers"))
    }

    fn destroy_buffer(&self, buffer: Option<BufferHandle>) -> Result<(), DeviceError> {
        let Some(buffer) = buffer else { return Ok(()) };
        let mut objects = self.lock();
        let entry = objects
            .buffers
            .remove(&buffer)
            .ok_or(DeviceError::UnknownHandle(AnyHandle::Buffer(buffer)))?;
        entry.buffer.destroy();
        log::trace!(
            target: "orrery::alloc",
            "destroy buffer #{} (live {})",
            buffer.raw(),
            objects.buffers.len()
        );
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

        let mut objects = self.lock();
        let bgl = self.layout_for(&mut objects, layout);

        let mut entries = Vec::with_capacity(buffers.len());
        for (binding, handle) in layout.bindings.iter().zip(buffers) {
            let entry = objects
                .buffers
                .get(handle)
                .ok_or(DeviceError::UnknownHandle(AnyHandle::Buffer(*handle)))?;
            entries.push(wgpu::BindGroupEntry {
                binding: binding.binding,
                resource: entry.buffer.as_entire_binding(),
            });
        }

        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(layout.label),
            layout: &bgl,
            entries: &entries,
        });

        let set = DescriptorSetHandle::from_raw(self.handles.next());
        objects.bind_groups.insert(set, group);
        log::trace!(
            target: "orrery::alloc",
            "create descriptor set {} #{} (live {})",
            layout.label,
            set.raw(),
            objects.bind_groups.len()
        );
        Ok(set)
    }

    fn free_descriptor_sets(&self, sets: &[DescriptorSetHandle]) -> Result<(), DeviceError> {
        let mut objects = self.lock();
        if let Some(missing) = sets.iter().find(|s| !objects.bind_groups.contains_key(s)) {
            return Err(DeviceError::UnknownHandle(AnyHandle::DescriptorSet(*missing)));
        }
        for set in sets {
            objects.bind_groups.remove(set);
        }
        log::trace!(
            target: "orrery::alloc",
            "free {} descriptor sets (live {})",
            sets.len(),
            objects.bind_groups.len()
        );
        Ok(())
    }

    fn allocate_command_buffer(&self, label: &str) -> Result<CommandBufferHandle, DeviceError> {
        let handle = CommandBufferHandle::from_raw(self.handles.next());
        let mut objects = self.lock();
        objects.command_buffers.insert(handle);
        log::trace!(
            target: "orrery::alloc",
            "allocate command buffer {label} #{} (live {})",
            handle.raw(),
            objects.command_buffers.len()
        );
        Ok(handle)
    }

    fn free_command_buffer(&self, buffer: Option<CommandBufferHandle>) -> Result<(), DeviceError> {
        let Some(buffer) = buffer else { return Ok(()) };
        let mut objects = self.lock();
        if !objects.command_buffers.remove(&buffer) {
            return Err(DeviceError::UnknownHandle(AnyHandle::CommandBuffer(buffer)));
        }
        Ok(())
    }

    fn create_pipeline(&self, desc: &PipelineDesc<'_>) -> Result<PipelineHandle, DeviceError> {
        let mut objects = self.lock();
        let format = *objects
            .render_passes
            .get(&desc.render_pass)
            .ok_or_else(|| {
                DeviceError::InvalidUsage(format!(
                    "render pass #{} was never registered",
                    desc.render_pass.raw()
                ))
            })?;

        let bgl = desc
            .descriptor_layout
            .map(|layout| self.layout_for(&mut objects, layout));

        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.shader.name),
                source: wgpu::ShaderSource::Wgsl(desc.shader.wgsl.into()),
            });

        let bind_group_layouts: Vec<&wgpu::BindGroupLayout> = bgl.iter().collect();
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &bind_group_layouts,
                immediate_size: 0,
            });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some(desc.shader.vertex_entry),
                    compilation_options: Default::default(),
                    buffers: std::slice::from_ref(&desc.vertex_layout),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(desc.shader.fragment_entry),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: desc.topology,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        let handle = PipelineHandle::from_raw(self.handles.next());
        objects.pipelines.insert(handle, pipeline);
        log::trace!(
            target: "orrery::alloc",
            "create pipeline {} #{} (live {})",
            desc.label,
            handle.raw(),
            objects.pipelines.len()
        );
        Ok(handle)
    }

    fn destroy_pipeline(&self, pipeline: Option<PipelineHandle>) -> Result<(), DeviceError> {
        let Some(pipeline) = pipeline else { return Ok(()) };
        let mut objects = self.lock();
        if objects.pipelines.remove(&pipeline).is_none() {
            return Err(DeviceError::UnknownHandle(AnyHandle::Pipeline(pipeline)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Device on whatever adapter the machine has, without a surface. `None`
    /// on machines with no adapter at all.
    fn headless() -> Option<WgpuDevice> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(
            instance.request_adapter(&wgpu::RequestAdapterOptions::default()),
        )
        .ok()?;
        let (device, queue) =
            pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default())).ok()?;
        Some(WgpuDevice::new(device, queue))
    }

    #[test]
    fn allocations_pop_their_error_scope() {
        let Some(gpu) = headless() else {
            eprintln!("no wgpu adapter; skipping");
            return;
        };
        let first = gpu.create_buffer(&BufferDesc::staging("scoped", 64)).unwrap();
        let second = gpu
            .create_buffer(&BufferDesc::device_local("scoped", 64, wgpu::BufferUsages::VERTEX))
            .unwrap();
        assert_ne!(first, second);

        let out = gpu.with_oom_scope(1, || 7).unwrap();
        assert_eq!(out, 7);
        gpu.destroy_buffer(Some(first)).unwrap();
        gpu.destroy_buffer(Some(second)).unwrap();
    }

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_down(13), 12);
        assert_eq!(align_up(13), 16);
        assert_eq!(align_up(12), 12);
    }
}
