use std::sync::Arc;

use crate::device::GraphicsDevice;
use crate::resource::DescriptorPool;
use crate::thread::RenderThreadGuard;

/// Scene-level knobs.
#[derive(Debug, Clone)]
pub struct SceneConfig {
    /// Initial descriptor pool capacity, in sets.
    pub descriptor_pool_capacity: usize,

    /// Trace every resource state transition under `orrery::state`.
    pub log_state_changes: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            descriptor_pool_capacity: 16,
            log_state_changes: false,
        }
    }
}

/// Context passed to every renderable operation on the render thread.
///
/// Constructed once by the [`Scene`](super::Scene) and owned by it; nothing
/// here is global.
pub struct RenderCtx {
    pub(crate) device: Arc<dyn GraphicsDevice>,
    pub(crate) pool: DescriptorPool,
    pub(crate) frame: u64,
    pub(crate) config: SceneConfig,
    pub(crate) thread: RenderThreadGuard,
}

impl RenderCtx {
    pub fn new(device: Arc<dyn GraphicsDevice>, config: SceneConfig) -> Self {
        Self {
            device,
            pool: DescriptorPool::new(config.descriptor_pool_capacity),
            frame: 0,
            config,
            thread: RenderThreadGuard::new(),
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    #[inline]
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// Frames started so far.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[inline]
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    #[inline]
    pub fn thread(&self) -> &RenderThreadGuard {
        &self.thread
    }
}
