/// A single acquired swapchain image.
///
/// Short-lived; holding the surface texture prevents acquisition of subsequent
/// frames. `image_index` selects the per-image resources of every renderable.
pub struct GpuFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
    pub encoder: wgpu::CommandEncoder,
    pub image_index: usize,
}
