use crate::command::SecondaryCommandBuffer;
use crate::device::{
    BufferDesc, BufferHandle, DescriptorLayoutDesc, DescriptorSetHandle, DeviceError,
    GraphicsDevice,
};

use super::{DescriptorPool, ResourceCategory};

/// Device objects for one swapchain image.
#[derive(Debug, Default)]
pub struct ImageSlot {
    pub vertex_buffer: Option<BufferHandle>,
    pub uniform_buffer: Option<BufferHandle>,
    pub descriptor_set: Option<DescriptorSetHandle>,
    pub command_buffer: Option<SecondaryCommandBuffer>,
}

impl ImageSlot {
    fn is_empty(&self) -> bool {
        self.vertex_buffer.is_none()
            && self.uniform_buffer.is_none()
            && self.descriptor_set.is_none()
            && self.command_buffer.is_none()
    }
}

/// One [`ImageSlot`] per swapchain image.
///
/// Every `create_*` call is all-or-nothing: if slot `k` fails, the objects
/// created for slots `0..k` in the same call are destroyed before the error
/// is returned. Every `destroy_*` call is idempotent.
#[derive(Debug, Default)]
pub struct PerImageResources {
    slots: Vec<ImageSlot>,
}

impl PerImageResources {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, image: usize) -> Option<&ImageSlot> {
        self.slots.get(image)
    }

    pub fn slot_mut(&mut self, image: usize) -> Option<&mut ImageSlot> {
        self.slots.get_mut(image)
    }

    pub fn slots(&self) -> &[ImageSlot] {
        &self.slots
    }

    /// Changes the slot count. Only legal once every slot is empty.
    pub fn resize(&mut self, image_count: usize) -> Result<(), DeviceError> {
        if !self.slots.iter().all(ImageSlot::is_empty) {
            return Err(DeviceError::InvalidUsage(
                "resizing per-image resources with live objects".to_string(),
            ));
        }
        self.slots.clear();
        self.slots.resize_with(image_count, ImageSlot::default);
        Ok(())
    }

    /// Number of live objects of `category` across all slots.
    pub fn live(&self, category: ResourceCategory) -> usize {
        self.slots
            .iter()
            .filter(|s| match category {
                ResourceCategory::VertexBuffers => s.vertex_buffer.is_some(),
                ResourceCategory::Uniforms => s.uniform_buffer.is_some(),
                ResourceCategory::DescriptorSets => s.descriptor_set.is_some(),
                ResourceCategory::CommandBuffers => s.command_buffer.is_some(),
                ResourceCategory::Pipelines => false,
            })
            .count()
    }

    pub fn has_live_objects(&self) -> bool {
        !self.slots.iter().all(ImageSlot::is_empty)
    }

    pub fn vertex_buffers(&self) -> Vec<BufferHandle> {
        self.slots.iter().filter_map(|s| s.vertex_buffer).collect()
    }

    pub fn uniform_buffers(&self) -> Vec<BufferHandle> {
        self.slots.iter().filter_map(|s| s.uniform_buffer).collect()
    }

    // ── vertex buffers ────────────────────────────────────────────────────

    pub fn create_vertex_buffers(
        &mut self,
        device: &dyn GraphicsDevice,
        label: &str,
        size: u64,
    ) -> Result<(), DeviceError> {
        let created = create_each(device, self.slots.len(), |device| {
            device.create_buffer(&BufferDesc::device_local(
                label,
                size,
                wgpu::BufferUsages::VERTEX,
            ))
        })?;
        for (slot, buffer) in self.slots.iter_mut().zip(created) {
            slot.vertex_buffer = Some(buffer);
        }
        Ok(())
    }

    pub fn destroy_vertex_buffers(&mut self, device: &dyn GraphicsDevice) -> Result<(), DeviceError> {
        for slot in &mut self.slots {
            device.destroy_buffer(slot.vertex_buffer.take())?;
        }
        Ok(())
    }

    // ── uniform buffers ───────────────────────────────────────────────────

    pub fn create_uniform_buffers(
        &mut self,
        device: &dyn GraphicsDevice,
        label: &str,
        size: u64,
    ) -> Result<(), DeviceError> {
        let created = create_each(device, self.slots.len(), |device| {
            device.create_buffer(&BufferDesc::device_local(
                label,
                size,
                wgpu::BufferUsages::UNIFORM,
            ))
        })?;
        for (slot, buffer) in self.slots.iter_mut().zip(created) {
            slot.uniform_buffer = Some(buffer);
        }
        Ok(())
    }

    /// Writes the same uniform contents into every image's buffer.
    pub fn write_uniforms(&self, device: &dyn GraphicsDevice, bytes: &[u8]) -> Result<(), DeviceError> {
        for buffer in self.uniform_buffers() {
            device.write_buffer(buffer, 0, bytes)?;
        }
        Ok(())
    }

    pub fn destroy_uniform_buffers(
        &mut self,
        device: &dyn GraphicsDevice,
    ) -> Result<(), DeviceError> {
        for slot in &mut self.slots {
            device.destroy_buffer(slot.uniform_buffer.take())?;
        }
        Ok(())
    }

    // ── descriptor sets ───────────────────────────────────────────────────

    /// Allocates one set per image binding that image's uniform buffer.
    pub fn create_descriptor_sets(
        &mut self,
        device: &dyn GraphicsDevice,
        pool: &mut DescriptorPool,
        layout: &DescriptorLayoutDesc,
    ) -> Result<(), DeviceError> {
        let mut bindings = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let ubo = slot.uniform_buffer.ok_or_else(|| {
                DeviceError::InvalidUsage(format!(
                    "descriptor set '{}' needs a uniform buffer",
                    layout.label
                ))
            })?;
            bindings.push(vec![ubo]);
        }

        let sets = pool.allocate(device, layout, &bindings)?;
        for (slot, set) in self.slots.iter_mut().zip(sets) {
            slot.descriptor_set = Some(set);
        }
        Ok(())
    }

    pub fn destroy_descriptor_sets(
        &mut self,
        device: &dyn GraphicsDevice,
        pool: &mut DescriptorPool,
    ) -> Result<(), DeviceError> {
        let sets: Vec<DescriptorSetHandle> =
            self.slots.iter().filter_map(|s| s.descriptor_set).collect();
        if sets.is_empty() {
            return Ok(());
        }
        pool.free(device, &sets)?;
        for slot in &mut self.slots {
            slot.descriptor_set = None;
        }
        Ok(())
    }

    // ── command buffers ───────────────────────────────────────────────────

    pub fn allocate_command_buffers(
        &mut self,
        device: &dyn GraphicsDevice,
        label: &str,
    ) -> Result<(), DeviceError> {
        let mut created = Vec::with_capacity(self.slots.len());
        for _ in 0..self.slots.len() {
            match device.allocate_command_buffer(label) {
                Ok(handle) => created.push(handle),
                Err(err) => {
                    for handle in created {
                        device.free_command_buffer(Some(handle))?;
                    }
                    return Err(err);
                }
            }
        }
        for (slot, handle) in self.slots.iter_mut().zip(created) {
            slot.command_buffer = Some(SecondaryCommandBuffer::new(handle));
        }
        Ok(())
    }

    /// Resets every secondary so it is re-recorded on next use.
    pub fn invalidate_command_buffers(&mut self) {
        for cb in self.slots.iter_mut().filter_map(|s| s.command_buffer.as_mut()) {
            cb.reset();
        }
    }

    pub fn free_command_buffers(&mut self, device: &dyn GraphicsDevice) -> Result<(), DeviceError> {
        for slot in &mut self.slots {
            device.free_command_buffer(slot.command_buffer.take().map(|cb| cb.handle()))?;
        }
        Ok(())
    }

    /// Destroys every per-image object in reverse dependency order.
    pub fn destroy_all(
        &mut self,
        device: &dyn GraphicsDevice,
        pool: &mut DescriptorPool,
    ) -> Result<(), DeviceError> {
        self.free_command_buffers(device)?;
        self.destroy_descriptor_sets(device, pool)?;
        self.destroy_uniform_buffers(device)?;
        self.destroy_vertex_buffers(device)
    }
}

/// Creates `count` buffers, destroying the ones already made if one fails.
fn create_each(
    device: &dyn GraphicsDevice,
    count: usize,
    mut create: impl FnMut(&dyn GraphicsDevice) -> Result<BufferHandle, DeviceError>,
) -> Result<Vec<BufferHandle>, DeviceError> {
    let mut created = Vec::with_capacity(count);
    for _ in 0..count {
        match create(device) {
            Ok(buffer) => created.push(buffer),
            Err(err) => {
                for buffer in created {
                    device.destroy_buffer(Some(buffer))?;
                }
                return Err(err);
            }
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{RecordingDevice, UniformBinding};

    static LAYOUT: DescriptorLayoutDesc = DescriptorLayoutDesc {
        label: "test ubo",
        bindings: &[UniformBinding {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            size: 16,
        }],
    };

    fn full_set(device: &RecordingDevice, pool: &mut DescriptorPool, images: usize) -> PerImageResources {
        let mut res = PerImageResources::new();
        res.resize(images).unwrap();
        res.create_vertex_buffers(device, "vbo", 48).unwrap();
        res.create_uniform_buffers(device, "ubo", 16).unwrap();
        res.create_descriptor_sets(device, pool, &LAYOUT).unwrap();
        res.allocate_command_buffers(device, "cb").unwrap();
        res
    }

    #[test]
    fn every_category_has_one_object_per_image() {
        let device = RecordingDevice::new();
        let mut pool = DescriptorPool::new(8);
        let res = full_set(&device, &mut pool, 3);
        for category in [
            ResourceCategory::VertexBuffers,
            ResourceCategory::Uniforms,
            ResourceCategory::DescriptorSets,
            ResourceCategory::CommandBuffers,
        ] {
            assert_eq!(res.live(category), 3);
        }
    }

    #[test]
    fn failed_create_rolls_back_the_call() {
        let device = RecordingDevice::new();
        let mut res = PerImageResources::new();
        res.resize(3).unwrap();

        res.create_vertex_buffers(&device, "vbo", 48).unwrap();
        assert_eq!(device.live_buffers(), 3);

        // Third uniform allocation fails: the two made before it are released.
        let mut fails_third = 0;
        let err = create_each(&device, 3, |d| {
            fails_third += 1;
            if fails_third == 3 {
                Err(DeviceError::OutOfMemory { requested: 16 })
            } else {
                d.create_buffer(&BufferDesc::staging("ubo", 16))
            }
        });
        assert!(err.is_err());
        assert_eq!(device.live_buffers(), 3);
    }

    #[test]
    fn resize_refuses_live_objects() {
        let device = RecordingDevice::new();
        let mut pool = DescriptorPool::new(8);
        let mut res = full_set(&device, &mut pool, 2);
        assert!(res.resize(3).is_err());

        res.destroy_all(&device, &mut pool).unwrap();
        res.resize(3).unwrap();
        assert_eq!(res.len(), 3);
    }

    #[test]
    fn destroy_all_twice_is_noop() {
        let device = RecordingDevice::new();
        let mut pool = DescriptorPool::new(8);
        let mut res = full_set(&device, &mut pool, 2);

        res.destroy_all(&device, &mut pool).unwrap();
        device.clear_calls();
        res.destroy_all(&device, &mut pool).unwrap();

        assert!(device.calls().is_empty());
        assert!(!res.has_live_objects());
        assert_eq!(pool.allocated(), 0);
    }
}
