use anyhow::{Context, Result};
use winit::dpi::PhysicalSize;

use super::init::image_count_for;
use super::{GpuFrame, GpuInit, RenderPassHandle, SurfaceErrorAction};
use crate::coords::Extent;
use crate::swapchain::SwapchainContext;

/// Window surface plus the bookkeeping renderables need to size their
/// per-image resources.
///
/// wgpu does not expose swapchain image indices, so images are numbered by
/// rotating a frame counter over `image_count`.
pub(crate) struct SurfaceSwapchain<'w> {
    surface: wgpu::Surface<'w>,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    image_count: usize,
    render_pass: RenderPassHandle,
    next_image: usize,
}

impl<'w> SurfaceSwapchain<'w> {
    pub(crate) fn new(
        surface: wgpu::Surface<'w>,
        adapter: &wgpu::Adapter,
        device: &wgpu::Device,
        init: &GpuInit,
        size: PhysicalSize<u32>,
        register: impl FnOnce(wgpu::TextureFormat) -> RenderPassHandle,
    ) -> Result<Self> {
        let caps = surface.get_capabilities(adapter);
        let format =
            choose_surface_format(&caps, init.prefer_srgb).context("no supported surface formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: init.present_mode,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        surface.configure(device, &config);
        log::info!(
            "surface configured: {format:?} {}x{}, {} images",
            config.width,
            config.height,
            init.image_count()
        );

        Ok(Self {
            surface,
            config,
            size,
            image_count: init.image_count(),
            render_pass: register(format),
            next_image: 0,
        })
    }

    pub(crate) fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub(crate) fn context(&self) -> SwapchainContext {
        SwapchainContext::new(
            self.image_count,
            Extent::new(self.config.width, self.config.height),
            self.render_pass,
        )
    }

    /// Zero-sized resizes (minimized window) only record the size; the
    /// surface keeps its last valid configuration.
    pub(crate) fn resize(&mut self, device: &wgpu::Device, new_size: PhysicalSize<u32>) {
        self.size = new_size;
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(device, &self.config);
    }

    /// Changes the requested frame latency, which changes the image count.
    pub(crate) fn set_frame_latency(&mut self, device: &wgpu::Device, latency: u32) {
        self.config.desired_maximum_frame_latency = latency.max(1);
        self.image_count = image_count_for(latency);
        self.next_image = 0;
        if self.size.width > 0 && self.size.height > 0 {
            self.surface.configure(device, &self.config);
        }
    }

    pub(crate) fn acquire(
        &mut self,
        device: &wgpu::Device,
    ) -> std::result::Result<GpuFrame, wgpu::SurfaceError> {
        let surface_texture = self.surface.get_current_texture()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("orrery frame encoder"),
        });

        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count.max(1);

        Ok(GpuFrame {
            surface_texture,
            view,
            encoder,
            image_index,
        })
    }

    pub(crate) fn recover(
        &mut self,
        device: &wgpu::Device,
        err: wgpu::SurfaceError,
    ) -> SurfaceErrorAction {
        match err {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                if self.size.width > 0 && self.size.height > 0 {
                    self.surface.configure(device, &self.config);
                }
                log::debug!("surface {err:?}; reconfigured");
                SurfaceErrorAction::Reconfigured
            }
            wgpu::SurfaceError::OutOfMemory => {
                log::error!("surface out of memory");
                SurfaceErrorAction::Fatal
            }
            wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => {
                log::warn!("surface {err:?}; skipping frame");
                SurfaceErrorAction::SkipFrame
            }
        }
    }
}

fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    let first = caps.formats.first().copied()?;
    if prefer_srgb {
        if let Some(srgb) = caps.formats.iter().copied().find(|f| f.is_srgb()) {
            return Some(srgb);
        }
    }
    Some(first)
}
