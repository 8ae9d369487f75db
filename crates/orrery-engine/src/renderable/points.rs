use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::device::{DescriptorLayoutDesc, ShaderSource, UniformBinding};
use crate::error::RenderResult;
use crate::resource::{PartialWrite, StagingChannel, StagingWriter};
use crate::swapchain::SwapchainContext;
use crate::task::{RenderUpdate, RenderableId, TaskSender};
use crate::visual::{VisualAccess, VisualChange};

use super::{draw_count, Drawable, RenderableKind};

// ── gpu types ─────────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PointVertex {
    pub position: [f32; 3],
}

impl PointVertex {
    const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<PointVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct PointsUniform {
    pub mvp: [[f32; 4]; 4],
}

static POINTS_LAYOUT: DescriptorLayoutDesc = DescriptorLayoutDesc {
    label: "orrery points ubo",
    bindings: &[UniformBinding {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX,
        size: std::mem::size_of::<PointsUniform>() as u64,
    }],
};

// ── config ────────────────────────────────────────────────────────────────

/// Camera projection used by a points renderable.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PointsConfig {
    /// Vertical field of view, in degrees.
    pub field_of_view_deg: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            field_of_view_deg: 35.0,
            near: 1.0,
            far: 500_000.0,
        }
    }
}

impl PointsConfig {
    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(
            self.field_of_view_deg.to_radians(),
            aspect,
            self.near,
            self.far,
        )
    }
}

// ── drawable ──────────────────────────────────────────────────────────────

/// Point-list renderable: one vertex per point, projected through a
/// perspective camera.
#[derive(Debug, Clone)]
pub struct PointsDrawable {
    config: PointsConfig,
    model_view: Mat4,
}

impl PointsDrawable {
    pub fn new(config: PointsConfig) -> Self {
        Self {
            config,
            model_view: Mat4::IDENTITY,
        }
    }

    pub fn model_view(&self) -> Mat4 {
        self.model_view
    }

    pub fn uniform(&self, swapchain: &SwapchainContext) -> PointsUniform {
        let mvp = self.config.projection(swapchain.extent.aspect()) * self.model_view;
        PointsUniform {
            mvp: mvp.to_cols_array_2d(),
        }
    }
}

impl Drawable for PointsDrawable {
    fn kind(&self) -> RenderableKind {
        RenderableKind::Points
    }

    fn label(&self) -> &'static str {
        "orrery points"
    }

    fn vertex_layout(&self) -> wgpu::VertexBufferLayout<'static> {
        PointVertex::layout()
    }

    fn shader(&self) -> ShaderSource {
        ShaderSource {
            name: "orrery points shader",
            wgsl: include_str!("shaders/points.wgsl"),
            vertex_entry: "vs_main",
            fragment_entry: "fs_main",
        }
    }

    fn topology(&self) -> wgpu::PrimitiveTopology {
        wgpu::PrimitiveTopology::PointList
    }

    fn descriptor_layout(&self) -> Option<&'static DescriptorLayoutDesc> {
        Some(&POINTS_LAYOUT)
    }

    fn uniform_data(&self, swapchain: &SwapchainContext) -> Vec<u8> {
        bytemuck::bytes_of(&self.uniform(swapchain)).to_vec()
    }

    fn apply_model_view(&mut self, model_view: Mat4) -> bool {
        self.model_view = model_view;
        true
    }
}

// ── producer ──────────────────────────────────────────────────────────────

/// Producer-thread handle for a points renderable.
///
/// Every call stages data on the calling thread and enqueues the matching
/// render-thread update.
#[derive(Debug, Clone)]
pub struct PointsProducer {
    id: RenderableId,
    staging: Arc<StagingChannel>,
    tasks: TaskSender,
}

impl PointsProducer {
    pub(crate) fn new(id: RenderableId, staging: Arc<StagingChannel>, tasks: TaskSender) -> Self {
        Self { id, staging, tasks }
    }

    pub fn id(&self) -> RenderableId {
        self.id
    }

    /// Stages every point of `visual` and requests a vertex rebuild.
    pub fn rebuild_points(&self, visual: &dyn VisualAccess) -> RenderResult<()> {
        // The lock is held until the task is queued.
        let mut staging = self.staging.writer();
        self.tasks
            .enqueue(self.id, || stage_full(self.id, &mut staging, visual))
    }

    /// Stages only the points named by `change`. Falls back to a full
    /// rebuild when nothing compatible is staged yet.
    pub fn update_points(
        &self,
        change: &dyn VisualChange,
        visual: &dyn VisualAccess,
    ) -> RenderResult<()> {
        if change.is_empty() {
            return Ok(());
        }
        let mut staging = self.staging.writer();
        self.tasks.enqueue(self.id, || {
            let indices = change.indices();
            let written = staging.write_partial(&indices, &mut |i: usize, bytes: &mut [u8]| {
                write_point(bytes, visual.position(i))
            })?;
            match written {
                PartialWrite::Written { epoch } => {
                    log::trace!("update points: {} changed for {}", indices.len(), self.id);
                    Ok(RenderUpdate::UpdateVertices {
                        count: draw_count(staging.staged_len())?,
                        epoch,
                    })
                }
                PartialWrite::NeedsFull => stage_full(self.id, &mut staging, visual),
            }
        })
    }

    /// Replaces the model-view matrix used by the next uniform write.
    pub fn update_camera(&self, model_view: Mat4) -> RenderResult<()> {
        self.tasks
            .enqueue(self.id, || Ok(RenderUpdate::ModelView(model_view)))
    }
}

fn stage_full(
    id: RenderableId,
    staging: &mut StagingWriter<'_>,
    visual: &dyn VisualAccess,
) -> RenderResult<RenderUpdate> {
    let count = visual.vertex_count();
    let draw = draw_count(count)?;
    log::debug!("rebuild points: {count} vertices for {id}");
    let epoch = staging.write_full(count, &mut |i: usize, bytes: &mut [u8]| {
        write_point(bytes, visual.position(i))
    })?;
    Ok(RenderUpdate::RebuildVertices { count: draw, epoch })
}

fn write_point(bytes: &mut [u8], position: [f32; 3]) {
    bytes.copy_from_slice(bytemuck::bytes_of(&PointVertex { position }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Extent;
    use crate::device::{RecordingDevice, RenderPassHandle};
    use crate::task::task_queue;
    use crate::visual::PointCloud;

    fn producer() -> (Arc<RecordingDevice>, PointsProducer, crate::task::TaskQueue) {
        let device = Arc::new(RecordingDevice::new());
        let staging = Arc::new(StagingChannel::new(
            device.clone(),
            "points staging",
            std::mem::size_of::<PointVertex>(),
        ));
        let (tx, queue) = task_queue();
        (device, PointsProducer::new(RenderableId(1), staging, tx), queue)
    }

    #[test]
    fn vertex_is_twelve_bytes() {
        assert_eq!(PointVertex::layout().array_stride, 12);
        assert_eq!(POINTS_LAYOUT.bindings[0].size, 64);
    }

    #[test]
    fn uniform_applies_model_view_after_projection() {
        let mut drawable = PointsDrawable::new(PointsConfig::default());
        let swapchain = SwapchainContext::new(2, Extent::new(800, 600), RenderPassHandle::from_raw(1));
        let mv = Mat4::from_translation(glam::Vec3::new(0.0, 0.0, -10.0));
        assert!(drawable.apply_model_view(mv));

        let expected = PointsConfig::default().projection(800.0 / 600.0) * mv;
        assert_eq!(drawable.uniform(&swapchain).mvp, expected.to_cols_array_2d());
        assert_eq!(drawable.uniform_data(&swapchain).len(), 64);
    }

    #[test]
    fn rebuild_enqueues_count_and_epoch() {
        let (_device, producer, queue) = producer();
        let cloud = PointCloud::new(vec![[1.0, 2.0, 3.0]; 5]);
        producer.rebuild_points(&cloud).unwrap();

        let tasks = queue.drain();
        assert_eq!(tasks.len(), 1);
        assert_eq!(
            tasks[0].update,
            RenderUpdate::RebuildVertices { count: 5, epoch: 1 }
        );
    }

    #[test]
    fn update_without_staging_falls_back_to_rebuild() {
        let (_device, producer, queue) = producer();
        let mut cloud = PointCloud::new(vec![[0.0; 3]; 4]);
        let change = cloud.set(&[(2, [1.0; 3])]);
        producer.update_points(&change, &cloud).unwrap();

        let tasks = queue.drain();
        assert!(matches!(
            tasks[0].update,
            RenderUpdate::RebuildVertices { count: 4, .. }
        ));
    }

    #[test]
    fn update_after_rebuild_is_partial() {
        let (_device, producer, queue) = producer();
        let mut cloud = PointCloud::new(vec![[0.0; 3]; 4]);
        producer.rebuild_points(&cloud).unwrap();
        let change = cloud.set(&[(1, [2.0; 3])]);
        producer.update_points(&change, &cloud).unwrap();

        let updates: Vec<RenderUpdate> = queue.drain().into_iter().map(|t| t.update).collect();
        assert_eq!(
            updates[1],
            RenderUpdate::UpdateVertices { count: 4, epoch: 2 }
        );
    }

    #[test]
    fn empty_change_enqueues_nothing() {
        let (_device, producer, queue) = producer();
        let cloud = PointCloud::default();
        producer
            .update_points(&crate::visual::ChangeSet::default(), &cloud)
            .unwrap();
        assert!(queue.drain().is_empty());
    }
}
