//! Renderables: the shared lifecycle plus the per-kind capability surface.
//!
//! Every renderable is a [`Renderable`] (the lifecycle core: dirty flags,
//! staging channel, per-image resources, orchestrator) wrapping a boxed
//! [`Drawable`] that supplies what differs between kinds. Producers talk to
//! a renderable only through its producer handle.

mod lifecycle;
mod points;
mod selection_box;

pub use lifecycle::{Renderable, Stage, StageOutcome, StageReport};
pub use points::{PointVertex, PointsConfig, PointsDrawable, PointsProducer, PointsUniform};
pub use selection_box::{BoxVertex, SelectionBoxDrawable, SelectionBoxProducer, ViewportUniform};

use crate::command::CommandRecorder;
use crate::device::{DescriptorLayoutDesc, DeviceError, ShaderSource};
use crate::swapchain::SwapchainContext;

/// Kinds built into this crate. Other kinds (line indicators, text
/// overlays, offscreen hit-test passes) plug in as further [`Drawable`]
/// implementations and a variant here.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RenderableKind {
    Points,
    SelectionBox,
}

/// Vertex count as carried in tasks and draws.
pub(crate) fn draw_count(count: usize) -> Result<u32, DeviceError> {
    u32::try_from(count)
        .map_err(|_| DeviceError::InvalidUsage(format!("{count} vertices exceed a single draw")))
}

/// What a renderable kind contributes on top of the shared lifecycle.
pub trait Drawable: Send {
    fn kind(&self) -> RenderableKind;

    /// Used for object labels and logs.
    fn label(&self) -> &'static str;

    fn vertex_layout(&self) -> wgpu::VertexBufferLayout<'static>;

    fn vertex_stride(&self) -> u64 {
        self.vertex_layout().array_stride
    }

    fn shader(&self) -> ShaderSource;

    fn topology(&self) -> wgpu::PrimitiveTopology;

    /// `None` for kinds without descriptor-bound uniforms.
    fn descriptor_layout(&self) -> Option<&'static DescriptorLayoutDesc>;

    /// Uniform bytes for the current swapchain. Called on the render thread.
    fn uniform_data(&self, swapchain: &SwapchainContext) -> Vec<u8>;

    /// Accepts a new model-view matrix. Returns false when the kind has no
    /// use for one.
    fn apply_model_view(&mut self, _model_view: glam::Mat4) -> bool {
        false
    }

    /// Issues the draw. Nothing is drawn for zero vertices; the secondary is
    /// still ended and stays executable.
    fn record_draw(&self, recorder: &mut CommandRecorder<'_>, vertex_count: u32) {
        if vertex_count > 0 {
            recorder.draw(0..vertex_count, 0..1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_count_fits_u32() {
        assert_eq!(draw_count(0), Ok(0));
        assert_eq!(draw_count(u32::MAX as usize), Ok(u32::MAX));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn oversized_draw_count_is_rejected() {
        assert!(matches!(
            draw_count(u32::MAX as usize + 1),
            Err(DeviceError::InvalidUsage(_))
        ));
    }
}
