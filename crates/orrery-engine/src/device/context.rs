use std::sync::Arc;

use anyhow::{Context, Result};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::surface::SurfaceSwapchain;
use super::{GpuFrame, GpuInit, SurfaceErrorAction, WgpuDevice};
use crate::swapchain::SwapchainContext;

/// Owns the wgpu core objects, the window surface and the shared
/// [`WgpuDevice`] renderables allocate from.
pub struct Gpu<'w> {
    /// Kept alive for the surface.
    _instance: wgpu::Instance,
    _adapter: wgpu::Adapter,

    device: wgpu::Device,
    queue: wgpu::Queue,
    swapchain: SurfaceSwapchain<'w>,
    graphics: Arc<WgpuDevice>,
}

impl<'w> Gpu<'w> {
    /// Creates a GPU context bound to a window.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(window: &'w Window, init: GpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;
        log::info!("adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("orrery device"),
                required_features: init.required_features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let graphics = Arc::new(WgpuDevice::new(device.clone(), queue.clone()));
        let swapchain = SurfaceSwapchain::new(surface, &adapter, &device, &init, size, |format| {
            graphics.register_render_pass(format)
        })?;

        Ok(Self {
            _instance: instance,
            _adapter: adapter,
            device,
            queue,
            swapchain,
            graphics,
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.swapchain.format()
    }

    /// Current drawable size (physical pixels).
    pub fn size(&self) -> PhysicalSize<u32> {
        self.swapchain.size()
    }

    /// Shared device handle for renderables.
    pub fn graphics(&self) -> Arc<WgpuDevice> {
        Arc::clone(&self.graphics)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Swapchain description handed to `Scene::set_swapchain` each frame.
    pub fn swapchain_context(&self) -> SwapchainContext {
        self.swapchain.context()
    }

    /// Reconfigures the surface after a resize.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.swapchain.resize(&self.device, new_size);
    }

    /// Requests a different frame latency; renderables see an image-count change.
    pub fn set_frame_latency(&mut self, latency: u32) {
        self.swapchain.set_frame_latency(&self.device, latency);
    }

    /// Acquires the next surface texture and creates an encoder.
    pub fn begin_frame(&mut self) -> std::result::Result<GpuFrame, wgpu::SurfaceError> {
        self.swapchain.acquire(&self.device)
    }

    /// Submits the recorded commands and presents the image.
    pub fn submit(&self, frame: GpuFrame) {
        self.queue.submit(std::iter::once(frame.encoder.finish()));
        drop(frame.view);
        frame.surface_texture.present();
    }

    pub fn handle_surface_error(&mut self, err: wgpu::SurfaceError) -> SurfaceErrorAction {
        self.swapchain.recover(&self.device, err)
    }
}
