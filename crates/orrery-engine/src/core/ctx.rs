use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::command::SecondaryCommandBuffer;
use crate::device::{DeviceError, Gpu, SurfaceErrorAction, WgpuDevice};
use crate::swapchain::SwapchainContext;
use crate::time::FrameTime;
use crate::window::RuntimeCtx;

use super::app::AppControl;

/// Per-window handles and immutable window metadata.
pub struct WindowCtx<'a> {
    pub id: WindowId,
    pub window: &'a Window,
}

impl WindowCtx<'_> {
    /// Inner size in physical pixels.
    pub fn physical_size(&self) -> PhysicalSize<u32> {
        self.window.inner_size()
    }
}

/// The open render pass of one acquired image, handed to the draw callback
/// of [`FrameCtx::render`].
pub struct FramePass<'p> {
    /// Which swapchain image is being drawn; selects per-image resources.
    pub image_index: usize,
    pass: wgpu::RenderPass<'p>,
    graphics: &'p WgpuDevice,
}

impl FramePass<'_> {
    /// Replays a recorded secondary inside this pass.
    pub fn execute(&mut self, secondary: &SecondaryCommandBuffer) -> Result<(), DeviceError> {
        self.graphics.execute_secondary(&mut self.pass, secondary)
    }

    /// Replays every secondary in order; a failing one is logged and skipped.
    pub fn execute_all<'s>(
        &mut self,
        secondaries: impl IntoIterator<Item = &'s SecondaryCommandBuffer>,
    ) {
        for secondary in secondaries {
            if let Err(err) = self.execute(secondary) {
                log::warn!(
                    "image {}: skipping secondary #{}: {err}",
                    self.image_index,
                    secondary.handle().raw()
                );
            }
        }
    }
}

/// Per-frame context passed to `core::App::on_frame`.
///
/// Lifetimes:
/// - `'a` is the duration of the callback invocation
/// - `'w` is the window-borrow lifetime carried by `Gpu<'w>`
pub struct FrameCtx<'a, 'w> {
    pub window: WindowCtx<'a>,
    pub gpu: &'a mut Gpu<'w>,
    pub time: FrameTime,
    pub runtime: &'a mut RuntimeCtx,
}

impl FrameCtx<'_, '_> {
    /// Current swapchain description, for `Scene::set_swapchain`.
    pub fn swapchain(&self) -> SwapchainContext {
        self.gpu.swapchain_context()
    }

    /// Acquires the next image, clears it to `clear`, calls `draw` inside the
    /// render pass, then submits and presents.
    ///
    /// A lost or outdated surface is reconfigured and the frame skipped.
    pub fn render<F>(&mut self, clear: wgpu::Color, draw: F) -> AppControl
    where
        F: FnOnce(&mut FramePass<'_>),
    {
        let mut frame = match self.gpu.begin_frame() {
            Ok(f) => f,
            Err(err) => {
                let action = self.gpu.handle_surface_error(err);
                if action == SurfaceErrorAction::Fatal {
                    return AppControl::Exit;
                }
                return AppControl::Continue;
            }
        };

        let graphics = self.gpu.graphics();
        // The pass borrows frame.encoder; dropped before submit() takes frame.
        {
            let pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("orrery frame"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            let mut frame_pass = FramePass {
                image_index: frame.image_index,
                pass,
                graphics: &graphics,
            };
            draw(&mut frame_pass);
        }

        self.window.window.pre_present_notify();
        self.gpu.submit(frame);

        AppControl::Continue
    }
}
