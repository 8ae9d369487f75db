use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::coords::ScreenRect;
use crate::device::{DescriptorLayoutDesc, ShaderSource, UniformBinding};
use crate::error::RenderResult;
use crate::resource::StagingChannel;
use crate::swapchain::SwapchainContext;
use crate::task::{RenderUpdate, RenderableId, TaskSender};

use super::{draw_count, Drawable, RenderableKind};

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct BoxVertex {
    /// Physical pixels, top-left origin.
    pub position: [f32; 2],
}

impl BoxVertex {
    const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<BoxVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ViewportUniform {
    pub viewport: [f32; 2],
    pub _pad: [f32; 2], // 16-byte alignment
}

static BOX_LAYOUT: DescriptorLayoutDesc = DescriptorLayoutDesc {
    label: "orrery selection box ubo",
    bindings: &[UniformBinding {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX,
        size: std::mem::size_of::<ViewportUniform>() as u64,
    }],
};

/// Rubber-band rectangle drawn as a closed line strip in screen space.
#[derive(Debug, Default, Clone)]
pub struct SelectionBoxDrawable;

impl Drawable for SelectionBoxDrawable {
    fn kind(&self) -> RenderableKind {
        RenderableKind::SelectionBox
    }

    fn label(&self) -> &'static str {
        "orrery selection box"
    }

    fn vertex_layout(&self) -> wgpu::VertexBufferLayout<'static> {
        BoxVertex::layout()
    }

    fn shader(&self) -> ShaderSource {
        ShaderSource {
            name: "orrery selection box shader",
            wgsl: include_str!("shaders/selection_box.wgsl"),
            vertex_entry: "vs_main",
            fragment_entry: "fs_main",
        }
    }

    fn topology(&self) -> wgpu::PrimitiveTopology {
        wgpu::PrimitiveTopology::LineStrip
    }

    fn descriptor_layout(&self) -> Option<&'static DescriptorLayoutDesc> {
        Some(&BOX_LAYOUT)
    }

    fn uniform_data(&self, swapchain: &SwapchainContext) -> Vec<u8> {
        let uniform = ViewportUniform {
            viewport: [swapchain.viewport.width, swapchain.viewport.height],
            _pad: [0.0; 2],
        };
        bytemuck::bytes_of(&uniform).to_vec()
    }
}

/// Producer-thread handle for the selection box.
#[derive(Debug, Clone)]
pub struct SelectionBoxProducer {
    id: RenderableId,
    staging: Arc<StagingChannel>,
    tasks: TaskSender,
}

impl SelectionBoxProducer {
    pub(crate) fn new(id: RenderableId, staging: Arc<StagingChannel>, tasks: TaskSender) -> Self {
        Self { id, staging, tasks }
    }

    pub fn id(&self) -> RenderableId {
        self.id
    }

    /// Shows the box at `rect`, or hides it for `None` and empty or
    /// non-finite rectangles.
    pub fn set_box(&self, rect: Option<ScreenRect>) -> RenderResult<()> {
        let outline = rect
            .filter(|r| r.is_finite() && !r.normalized().is_empty())
            .map(ScreenRect::outline);
        let mut staging = self.staging.writer();
        self.tasks.enqueue(self.id, || {
            let count = outline.map_or(0, |o| o.len());
            let draw = draw_count(count)?;
            let epoch = staging.write_full(count, &mut |i: usize, bytes: &mut [u8]| {
                if let Some(outline) = &outline {
                    let vertex = BoxVertex {
                        position: outline[i],
                    };
                    bytes.copy_from_slice(bytemuck::bytes_of(&vertex));
                }
            })?;
            log::trace!("selection box: {count} vertices");
            Ok(RenderUpdate::RebuildVertices { count: draw, epoch })
        })
    }
}
