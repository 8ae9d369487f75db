/// How the window surface and the wgpu device are set up.
///
/// The frame latency decides how many swapchain images exist, and with it how
/// many copies of every per-image resource each renderable keeps.
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Pick an sRGB surface format when the surface offers one.
    pub prefer_srgb: bool,

    /// FIFO keeps image rotation in step with presentation.
    pub present_mode: wgpu::PresentMode,

    pub power_preference: wgpu::PowerPreference,

    pub required_features: wgpu::Features,
    pub required_limits: wgpu::Limits,

    /// Frames the surface may queue ahead of presentation.
    pub desired_maximum_frame_latency: u32,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::Fifo,
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            desired_maximum_frame_latency: 2,
        }
    }
}

impl GpuInit {
    /// Same settings with a different frame latency. Clamped to at least 1.
    pub fn with_frame_latency(mut self, latency: u32) -> Self {
        self.desired_maximum_frame_latency = latency.max(1);
        self
    }

    /// Swapchain images renderables keep resources for: the latency plus the
    /// image being presented.
    #[inline]
    pub fn image_count(&self) -> usize {
        image_count_for(self.desired_maximum_frame_latency)
    }
}

#[inline]
pub(crate) fn image_count_for(latency: u32) -> usize {
    latency.max(1) as usize + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_count_follows_latency() {
        assert_eq!(GpuInit::default().image_count(), 3);
        assert_eq!(GpuInit::default().with_frame_latency(1).image_count(), 2);
        assert_eq!(GpuInit::default().with_frame_latency(0).image_count(), 2);
    }
}
