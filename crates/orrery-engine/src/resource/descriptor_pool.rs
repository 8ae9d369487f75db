use crate::device::{
    BufferHandle, DescriptorLayoutDesc, DescriptorSetHandle, DeviceError, GraphicsDevice,
};

/// Descriptor set accounting shared by every renderable of a scene.
///
/// Capacity is counted in sets. Renderables declare how many sets they need
/// per swapchain image; when the declared total outgrows the capacity the
/// pool is regrown and its generation bumped, which every renderable treats
/// as "rebuild your descriptor sets".
#[derive(Debug)]
pub struct DescriptorPool {
    capacity: usize,
    allocated: usize,
    generation: u64,
}

impl DescriptorPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            allocated: 0,
            generation: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.allocated)
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Grows the pool to hold at least `required` sets. Returns true when
    /// the pool was regrown.
    pub fn reserve(&mut self, required: usize) -> bool {
        if required <= self.capacity {
            return false;
        }
        let grown = required.next_power_of_two();
        log::info!(
            "descriptor pool regrown: {} -> {grown} sets (generation {})",
            self.capacity,
            self.generation + 1
        );
        self.capacity = grown;
        self.generation += 1;
        true
    }

    /// Allocates one set per entry of `bindings`, all or nothing.
    pub fn allocate(
        &mut self,
        device: &dyn GraphicsDevice,
        layout: &DescriptorLayoutDesc,
        bindings: &[Vec<BufferHandle>],
    ) -> Result<Vec<DescriptorSetHandle>, DeviceError> {
        let requested = bindings.len();
        if requested > self.available() {
            return Err(DeviceError::PoolExhausted {
                requested,
                available: self.available(),
            });
        }

        let mut sets = Vec::with_capacity(requested);
        for buffers in bindings {
            match device.create_descriptor_set(layout, buffers) {
                Ok(set) => sets.push(set),
                Err(err) => {
                    if !sets.is_empty() {
                        device.free_descriptor_sets(&sets)?;
                    }
                    return Err(err);
                }
            }
        }
        self.allocated += requested;
        Ok(sets)
    }

    pub fn free(
        &mut self,
        device: &dyn GraphicsDevice,
        sets: &[DescriptorSetHandle],
    ) -> Result<(), DeviceError> {
        device.free_descriptor_sets(sets)?;
        self.allocated = self.allocated.saturating_sub(sets.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BufferDesc, RecordingDevice, UniformBinding};

    static LAYOUT: DescriptorLayoutDesc = DescriptorLayoutDesc {
        label: "test ubo",
        bindings: &[UniformBinding {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            size: 16,
        }],
    };

    fn ubo(device: &RecordingDevice) -> Vec<BufferHandle> {
        vec![device.create_buffer(&BufferDesc::staging("ubo", 16)).unwrap()]
    }

    #[test]
    fn over_capacity_request_allocates_nothing() {
        let device = RecordingDevice::new();
        let mut pool = DescriptorPool::new(2);
        let b = ubo(&device);

        let err = pool
            .allocate(&device, &LAYOUT, &[b.clone(), b.clone(), b])
            .unwrap_err();
        assert_eq!(
            err,
            DeviceError::PoolExhausted {
                requested: 3,
                available: 2
            }
        );
        assert_eq!(pool.allocated(), 0);
        assert_eq!(device.live_descriptor_sets(), 0);
    }

    #[test]
    fn device_failure_rolls_back_partial_allocation() {
        let device = RecordingDevice::new();
        let mut pool = DescriptorPool::new(8);
        let b = ubo(&device);
        device.set_descriptor_capacity(Some(1));

        assert!(pool.allocate(&device, &LAYOUT, &[b.clone(), b]).is_err());
        assert_eq!(device.live_descriptor_sets(), 0);
        assert_eq!(pool.allocated(), 0);
    }

    #[test]
    fn reserve_bumps_generation_only_when_growing() {
        let mut pool = DescriptorPool::new(4);
        assert!(!pool.reserve(4));
        assert_eq!(pool.generation(), 0);

        assert!(pool.reserve(5));
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.generation(), 1);
    }

    #[test]
    fn free_returns_capacity() {
        let device = RecordingDevice::new();
        let mut pool = DescriptorPool::new(2);
        let b = ubo(&device);
        let sets = pool.allocate(&device, &LAYOUT, &[b.clone(), b]).unwrap();
        assert_eq!(pool.available(), 0);
        pool.free(&device, &sets).unwrap();
        assert_eq!(pool.available(), 2);
    }
}
