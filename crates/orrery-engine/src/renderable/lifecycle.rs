use std::sync::Arc;

use crate::command::{Inheritance, RecordKey, SecondaryCommandBuffer};
use crate::device::{DeviceError, GraphicsDevice, PipelineDesc, PipelineHandle};
use crate::error::{InvariantViolation, RenderError, RenderResult};
use crate::resource::{
    FlushGuard, PerImageResources, ResourceCategory, ResourceState, StagingChannel, StateTracker,
};
use crate::scene::RenderCtx;
use crate::swapchain::{SwapchainChange, SwapchainContext};
use crate::task::{RenderUpdate, RenderableId};

use super::{Drawable, RenderableKind};

use ResourceCategory::{CommandBuffers, DescriptorSets, Pipelines, Uniforms, VertexBuffers};
use ResourceState::{Clean, NeedsRebuild, NeedsUpdate};

/// Orchestrator stages, in execution order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Stage {
    Swapchain,
    DescriptorPool,
    Vertices,
    Uniforms,
    CommandBuffers,
    Pipeline,
}

impl Stage {
    pub const ORDER: [Stage; 6] = [
        Self::Swapchain,
        Self::DescriptorPool,
        Self::Vertices,
        Self::Uniforms,
        Self::CommandBuffers,
        Self::Pipeline,
    ];
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StageOutcome {
    Performed,
    NoWork,
}

/// Outcome of every stage of one successful display update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    outcomes: Vec<(Stage, StageOutcome)>,
}

impl StageReport {
    pub fn outcomes(&self) -> &[(Stage, StageOutcome)] {
        &self.outcomes
    }

    pub fn performed(&self, stage: Stage) -> bool {
        self.outcomes
            .iter()
            .any(|(s, o)| *s == stage && *o == StageOutcome::Performed)
    }
}

/// Render-thread half of a renderable.
pub struct Renderable {
    id: RenderableId,
    drawable: Box<dyn Drawable>,
    tracker: StateTracker,
    staging: Arc<StagingChannel>,
    images: PerImageResources,
    pipeline: Option<PipelineHandle>,
    swapchain: Option<SwapchainContext>,
    /// Per-image objects must be recreated for a new image count.
    recreate_images: bool,
    pool_generation: u64,
    vertex_count: u32,
    drained_epoch: u64,
    destroyed: bool,
}

impl std::fmt::Debug for Renderable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderable")
            .field("id", &self.id)
            .field("label", &self.drawable.label())
            .field("vertex_count", &self.vertex_count)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl Renderable {
    pub(crate) fn new(
        id: RenderableId,
        drawable: Box<dyn Drawable>,
        staging: Arc<StagingChannel>,
        ctx: &RenderCtx,
    ) -> Self {
        let label = drawable.label();
        Self {
            id,
            drawable,
            tracker: StateTracker::new(label, ctx.config.log_state_changes),
            staging,
            images: PerImageResources::new(),
            pipeline: None,
            swapchain: None,
            recreate_images: false,
            pool_generation: ctx.pool.generation(),
            vertex_count: 0,
            drained_epoch: 0,
            destroyed: false,
        }
    }

    #[inline]
    pub fn id(&self) -> RenderableId {
        self.id
    }

    pub fn label(&self) -> &'static str {
        self.drawable.label()
    }

    pub fn kind(&self) -> RenderableKind {
        self.drawable.kind()
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    #[inline]
    pub fn state(&self, category: ResourceCategory) -> ResourceState {
        self.tracker.get(category)
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub(crate) fn staging(&self) -> &Arc<StagingChannel> {
        &self.staging
    }

    pub fn images(&self) -> &PerImageResources {
        &self.images
    }

    pub fn pipeline(&self) -> Option<PipelineHandle> {
        self.pipeline
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Descriptor sets this renderable needs for each swapchain image.
    pub fn descriptor_sets_per_image(&self) -> usize {
        usize::from(self.drawable.descriptor_layout().is_some())
    }

    // ── task application ──────────────────────────────────────────────────

    /// Commits one drained task. Render-thread only; never touches the device.
    pub fn apply(&mut self, update: RenderUpdate) {
        match update {
            RenderUpdate::RebuildVertices { epoch, .. } | RenderUpdate::UpdateVertices { epoch, .. }
                if epoch < self.drained_epoch =>
            {
                // Older than a task already applied, whose snapshot covers it.
                log::debug!(
                    "{}: skipping stale {} (epoch {epoch} < {})",
                    self.label(),
                    update.name(),
                    self.drained_epoch
                );
            }
            RenderUpdate::RebuildVertices { count, epoch } => {
                self.vertex_count = count;
                self.drained_epoch = epoch;
                self.tracker.request(VertexBuffers, NeedsRebuild);
            }
            RenderUpdate::UpdateVertices { count, epoch } => {
                self.drained_epoch = epoch;
                if count != self.vertex_count {
                    // A partial update against a different snapshot size
                    // cannot be applied in place.
                    self.vertex_count = count;
                    self.tracker.request(VertexBuffers, NeedsRebuild);
                } else {
                    self.tracker.request(VertexBuffers, NeedsUpdate);
                }
            }
            RenderUpdate::ModelView(model_view) => {
                if self.drawable.apply_model_view(model_view) {
                    self.tracker.request(Uniforms, NeedsUpdate);
                } else {
                    log::warn!("{}: ignoring model-view update", self.label());
                }
            }
        }
    }

    /// Adopts a new swapchain and raises the flags the change implies.
    pub fn set_swapchain(&mut self, swapchain: SwapchainContext) -> SwapchainChange {
        let change = SwapchainChange::classify(self.swapchain.as_ref(), &swapchain);
        match change {
            SwapchainChange::FirstTime | SwapchainChange::ImageCountChanged { .. } => {
                self.recreate_images = true;
                for category in ResourceCategory::ALL {
                    self.tracker.request(category, NeedsRebuild);
                }
            }
            SwapchainChange::Resized => {
                self.tracker.request(Uniforms, NeedsUpdate);
                let pass_changed = self
                    .swapchain
                    .is_some_and(|prev| prev.render_pass != swapchain.render_pass);
                if pass_changed {
                    self.tracker.request(Pipelines, NeedsRebuild);
                }
            }
            SwapchainChange::Unchanged => {}
        }
        self.swapchain = Some(swapchain);
        change
    }

    /// True when some category is dirty and there is content to build or
    /// tear down, or when the shared pool was regrown under live sets.
    pub fn needs_display_update(&self, pool_generation: u64) -> bool {
        if self.destroyed {
            return false;
        }
        let has_content =
            self.vertex_count > 0 || self.images.has_live_objects() || self.pipeline.is_some();
        let pool_stale =
            pool_generation != self.pool_generation && self.images.live(DescriptorSets) > 0;
        self.tracker.needs_display_update(has_content) || pool_stale
    }

    /// Ready to record: every per-image object and the pipeline exist for
    /// the current swapchain.
    pub fn is_ready(&self) -> bool {
        let Some(swapchain) = self.swapchain else {
            return false;
        };
        !self.destroyed
            && !self.recreate_images
            && self.pipeline.is_some()
            && self.images.len() == swapchain.image_count
            && self.images.live(CommandBuffers) == swapchain.image_count
    }

    // ── orchestrator ──────────────────────────────────────────────────────

    /// Runs every stage in order. A failing stage aborts the rest and leaves
    /// its own flags raised so the next frame retries it.
    pub fn display_update(&mut self, ctx: &mut RenderCtx) -> RenderResult<StageReport> {
        ctx.thread.verify("display_update")?;
        if self.destroyed {
            return Err(InvariantViolation::NullHandle { what: "renderable" }.into());
        }
        let swapchain = self.swapchain.ok_or(InvariantViolation::MissingSwapchain)?;
        self.tracker.set_frame(ctx.frame);

        // The guard pins the arena holding the drained snapshot for the whole
        // update. Producer writes meanwhile land in the other arena.
        let staging = Arc::clone(&self.staging);
        let needs_flush = self.recreate_images || self.tracker.get(VertexBuffers) != Clean;
        let mut flush = if needs_flush {
            staging.begin_flush(self.drained_epoch)
        } else {
            None
        };

        let device = Arc::clone(&ctx.device);
        let device = device.as_ref();
        let mut report = StageReport::default();
        for stage in Stage::ORDER {
            let result = match stage {
                Stage::Swapchain => self.stage_swapchain(device, ctx, &swapchain, &mut flush),
                Stage::DescriptorPool => self.stage_descriptor_pool(device, ctx),
                Stage::Vertices => self.stage_vertices(device, &mut flush),
                Stage::Uniforms => self.stage_uniforms(device, ctx, &swapchain),
                Stage::CommandBuffers => self.stage_command_buffers(device),
                Stage::Pipeline => self.stage_pipeline(device, &swapchain),
            };
            match result {
                Ok(outcome) => report.outcomes.push((stage, outcome)),
                Err(err) => {
                    log::warn!(
                        "frame {}: {} {stage:?} stage failed: {err}",
                        ctx.frame,
                        self.label()
                    );
                    return Err(err.into());
                }
            }
        }
        Ok(report)
    }

    fn stage_swapchain(
        &mut self,
        device: &dyn GraphicsDevice,
        ctx: &mut RenderCtx,
        swapchain: &SwapchainContext,
        flush: &mut Option<FlushGuard<'_>>,
    ) -> Result<StageOutcome, DeviceError> {
        if !self.recreate_images {
            return Ok(StageOutcome::NoWork);
        }

        self.images.destroy_all(device, &mut ctx.pool)?;
        self.images.resize(swapchain.image_count)?;
        if let Err(err) = self.create_image_resources(device, ctx, swapchain, flush) {
            // Leave no half-built image set behind; the flags stay raised.
            self.images.destroy_all(device, &mut ctx.pool)?;
            return Err(err);
        }

        self.recreate_images = false;
        self.pool_generation = ctx.pool.generation();
        for category in [VertexBuffers, Uniforms, DescriptorSets, CommandBuffers] {
            self.tracker.mark_clean(category);
        }
        log::debug!(
            "{}: created resources for {} images",
            self.label(),
            swapchain.image_count
        );
        Ok(StageOutcome::Performed)
    }

    /// Creates vertex buffers, uniform buffers, descriptor sets and command
    /// buffers for every slot, in dependency order.
    fn create_image_resources(
        &mut self,
        device: &dyn GraphicsDevice,
        ctx: &mut RenderCtx,
        swapchain: &SwapchainContext,
        flush: &mut Option<FlushGuard<'_>>,
    ) -> Result<(), DeviceError> {
        self.create_vertex_buffers(device, flush)?;

        if let Some(layout) = self.drawable.descriptor_layout() {
            let size = layout.bindings.first().map_or(0, |b| b.size);
            self.images
                .create_uniform_buffers(device, self.drawable.label(), size)?;
            self.images
                .write_uniforms(device, &self.drawable.uniform_data(swapchain))?;
            self.images
                .create_descriptor_sets(device, &mut ctx.pool, layout)?;
        }

        self.images
            .allocate_command_buffers(device, self.drawable.label())
    }

    fn create_vertex_buffers(
        &mut self,
        device: &dyn GraphicsDevice,
        flush: &mut Option<FlushGuard<'_>>,
    ) -> Result<(), DeviceError> {
        if self.vertex_count == 0 {
            return Ok(());
        }
        let Some(flush) = flush.as_mut() else {
            return Err(self.missing_snapshot());
        };
        if flush.staged_len() != self.vertex_count as usize {
            return Err(DeviceError::InvalidUsage(format!(
                "{}: staged {} vertices, expected {}",
                self.label(),
                flush.staged_len(),
                self.vertex_count
            )));
        }

        let size = u64::from(self.vertex_count) * self.drawable.vertex_stride();
        self.images
            .create_vertex_buffers(device, self.drawable.label(), size)?;
        if let Err(err) = flush.flush_full(&self.images.vertex_buffers()) {
            self.images.destroy_vertex_buffers(device)?;
            return Err(err);
        }
        Ok(())
    }

    fn missing_snapshot(&self) -> DeviceError {
        DeviceError::InvalidUsage(format!(
            "{}: no staged snapshot for drained epoch {}",
            self.label(),
            self.drained_epoch
        ))
    }

    fn stage_descriptor_pool(
        &mut self,
        device: &dyn GraphicsDevice,
        ctx: &mut RenderCtx,
    ) -> Result<StageOutcome, DeviceError> {
        let generation = ctx.pool.generation();
        if generation != self.pool_generation && self.images.live(DescriptorSets) > 0 {
            self.tracker.request(DescriptorSets, NeedsRebuild);
        }
        if self.tracker.get(DescriptorSets) == Clean {
            self.pool_generation = generation;
            return Ok(StageOutcome::NoWork);
        }

        self.images.destroy_descriptor_sets(device, &mut ctx.pool)?;
        let has_ubos = self.images.live(Uniforms) == self.images.len();
        if let (Some(layout), true) = (self.drawable.descriptor_layout(), has_ubos) {
            self.images
                .create_descriptor_sets(device, &mut ctx.pool, layout)?;
        } else {
            // Sets come back with the uniform buffers.
            self.tracker.request(Uniforms, NeedsRebuild);
        }
        self.pool_generation = generation;
        self.tracker.mark_clean(DescriptorSets);
        self.tracker.request(CommandBuffers, NeedsUpdate);
        Ok(StageOutcome::Performed)
    }

    fn stage_vertices(
        &mut self,
        device: &dyn GraphicsDevice,
        flush: &mut Option<FlushGuard<'_>>,
    ) -> Result<StageOutcome, DeviceError> {
        let mut state = self.tracker.get(VertexBuffers);
        if state == NeedsUpdate
            && self.vertex_count > 0
            && self.images.live(VertexBuffers) != self.images.len()
        {
            state = self.tracker.request(VertexBuffers, NeedsRebuild);
        }

        match state {
            Clean => Ok(StageOutcome::NoWork),
            NeedsRebuild => {
                self.images.destroy_vertex_buffers(device)?;
                self.create_vertex_buffers(device, flush)?;
                self.tracker.mark_clean(VertexBuffers);
                self.tracker.request(CommandBuffers, NeedsUpdate);
                Ok(StageOutcome::Performed)
            }
            NeedsUpdate => {
                if self.vertex_count > 0 {
                    let Some(flush) = flush.as_mut() else {
                        return Err(self.missing_snapshot());
                    };
                    flush.flush_dirty(&self.images.vertex_buffers())?;
                }
                self.tracker.mark_clean(VertexBuffers);
                Ok(StageOutcome::Performed)
            }
        }
    }

    fn stage_uniforms(
        &mut self,
        device: &dyn GraphicsDevice,
        ctx: &mut RenderCtx,
        swapchain: &SwapchainContext,
    ) -> Result<StageOutcome, DeviceError> {
        let Some(layout) = self.drawable.descriptor_layout() else {
            self.tracker.mark_clean(Uniforms);
            return Ok(StageOutcome::NoWork);
        };

        match self.tracker.get(Uniforms) {
            Clean => Ok(StageOutcome::NoWork),
            NeedsRebuild => {
                // Sets reference the buffers, so they go first and come back last.
                self.images.destroy_descriptor_sets(device, &mut ctx.pool)?;
                self.images.destroy_uniform_buffers(device)?;
                let size = layout.bindings.first().map_or(0, |b| b.size);
                self.images
                    .create_uniform_buffers(device, self.drawable.label(), size)?;
                self.images
                    .write_uniforms(device, &self.drawable.uniform_data(swapchain))?;
                self.images
                    .create_descriptor_sets(device, &mut ctx.pool, layout)?;
                self.tracker.mark_clean(Uniforms);
                self.tracker.mark_clean(DescriptorSets);
                self.tracker.request(CommandBuffers, NeedsUpdate);
                Ok(StageOutcome::Performed)
            }
            NeedsUpdate => {
                self.images
                    .write_uniforms(device, &self.drawable.uniform_data(swapchain))?;
                self.tracker.mark_clean(Uniforms);
                Ok(StageOutcome::Performed)
            }
        }
    }

    fn stage_command_buffers(
        &mut self,
        device: &dyn GraphicsDevice,
    ) -> Result<StageOutcome, DeviceError> {
        match self.tracker.get(CommandBuffers) {
            Clean => Ok(StageOutcome::NoWork),
            NeedsRebuild => {
                self.images.free_command_buffers(device)?;
                self.images
                    .allocate_command_buffers(device, self.drawable.label())?;
                self.tracker.mark_clean(CommandBuffers);
                Ok(StageOutcome::Performed)
            }
            NeedsUpdate => {
                self.images.invalidate_command_buffers();
                self.tracker.mark_clean(CommandBuffers);
                Ok(StageOutcome::Performed)
            }
        }
    }

    fn stage_pipeline(
        &mut self,
        device: &dyn GraphicsDevice,
        swapchain: &SwapchainContext,
    ) -> Result<StageOutcome, DeviceError> {
        match self.tracker.get(Pipelines) {
            Clean if self.pipeline.is_some() => Ok(StageOutcome::NoWork),
            Clean | NeedsRebuild => {
                device.destroy_pipeline(self.pipeline.take())?;
                let desc = PipelineDesc {
                    label: self.drawable.label(),
                    shader: self.drawable.shader(),
                    vertex_layout: self.drawable.vertex_layout(),
                    topology: self.drawable.topology(),
                    descriptor_layout: self.drawable.descriptor_layout(),
                    render_pass: swapchain.render_pass,
                };
                self.pipeline = Some(device.create_pipeline(&desc)?);
                self.tracker.mark_clean(Pipelines);
                Ok(StageOutcome::Performed)
            }
            NeedsUpdate => {
                self.tracker.mark_clean(Pipelines);
                Ok(StageOutcome::NoWork)
            }
        }
    }

    // ── recording ─────────────────────────────────────────────────────────

    /// Returns the secondary for `image`, recording it first if anything it
    /// baked in has changed. `None` when the renderable is not ready.
    pub fn record(
        &mut self,
        ctx: &RenderCtx,
        image: usize,
    ) -> RenderResult<Option<&SecondaryCommandBuffer>> {
        ctx.thread.verify("record")?;
        let swapchain = self.swapchain.ok_or(InvariantViolation::MissingSwapchain)?;
        if image >= swapchain.image_count {
            return Err(InvariantViolation::ImageOutOfRange {
                index: image,
                image_count: swapchain.image_count,
            }
            .into());
        }
        if !self.is_ready() {
            return Ok(None);
        }

        let pipeline = self
            .pipeline
            .ok_or(InvariantViolation::NullHandle { what: "pipeline" })?;
        let vertex_count = self.vertex_count;
        let drawable = &self.drawable;
        let slot = self
            .images
            .slot_mut(image)
            .ok_or(InvariantViolation::ImageOutOfRange {
                index: image,
                image_count: swapchain.image_count,
            })?;

        let vertex_buffer = match (vertex_count, slot.vertex_buffer) {
            (0, _) => None,
            (_, Some(buffer)) => Some(buffer),
            (_, None) => {
                return Err(InvariantViolation::NullHandle {
                    what: "vertex buffer",
                }
                .into());
            }
        };
        let key = RecordKey {
            pipeline,
            vertex_buffer,
            descriptor_set: slot.descriptor_set,
            extent: swapchain.extent,
            vertex_count,
        };

        let cb = slot
            .command_buffer
            .as_mut()
            .ok_or(InvariantViolation::NullHandle {
                what: "command buffer",
            })?;
        if cb.needs_recording(&key) {
            let mut rec = cb.begin(Inheritance {
                render_pass: swapchain.render_pass,
                viewport: swapchain.viewport,
                extent: swapchain.extent,
            });
            rec.set_viewport(swapchain.viewport)
                .set_scissor(swapchain.extent)
                .bind_pipeline(pipeline);
            if let Some(buffer) = key.vertex_buffer {
                rec.bind_vertex_buffer(0, buffer);
            }
            if let Some(set) = key.descriptor_set {
                rec.bind_descriptor_set(0, set);
            }
            drawable.record_draw(&mut rec, vertex_count);
            rec.end(key);
            log::trace!(
                "frame {}: recorded {} image {image} ({vertex_count} verts)",
                ctx.frame,
                drawable.label()
            );
        }
        Ok(Some(&*cb))
    }

    // ── teardown ──────────────────────────────────────────────────────────

    /// Destroys every device object this renderable owns. Safe to call any
    /// number of times.
    pub fn destroy(&mut self, ctx: &mut RenderCtx) -> RenderResult<()> {
        ctx.thread.verify("destroy")?;
        let device = Arc::clone(&ctx.device);
        self.images
            .destroy_all(device.as_ref(), &mut ctx.pool)
            .map_err(RenderError::from_release)?;
        device
            .destroy_pipeline(self.pipeline.take())
            .map_err(RenderError::from_release)?;
        self.staging.destroy().map_err(RenderError::from_release)?;
        if !self.destroyed {
            log::debug!("{}: destroyed", self.label());
        }
        self.destroyed = true;
        self.recreate_images = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Extent;
    use crate::device::{DeviceCall, RecordingDevice, RenderPassHandle};
    use crate::error::RenderError;
    use crate::renderable::{PointVertex, PointsConfig, PointsDrawable};
    use crate::scene::SceneConfig;

    fn setup(count: usize) -> (Arc<RecordingDevice>, RenderCtx, Renderable) {
        let device = Arc::new(RecordingDevice::new());
        let mut ctx = RenderCtx::new(device.clone(), SceneConfig::default());
        let staging = Arc::new(StagingChannel::new(
            device.clone(),
            "points",
            std::mem::size_of::<PointVertex>(),
        ));
        let epoch = staging
            .write_full(count, &mut |i: usize, bytes: &mut [u8]| bytes.fill(i as u8))
            .unwrap();
        let mut r = Renderable::new(
            RenderableId(1),
            Box::new(PointsDrawable::new(PointsConfig::default())),
            staging,
            &ctx,
        );
        r.apply(RenderUpdate::RebuildVertices {
            count: count as u32,
            epoch,
        });
        ctx.pool.reserve(2);
        (device, ctx, r)
    }

    fn swapchain(width: u32) -> SwapchainContext {
        SwapchainContext::new(2, Extent::new(width, 480), RenderPassHandle::from_raw(7))
    }

    // ── orchestrator ──────────────────────────────────────────────────────

    #[test]
    fn first_update_runs_stages_in_order() {
        let (_device, mut ctx, mut r) = setup(4);
        r.set_swapchain(swapchain(640));
        let report = r.display_update(&mut ctx).unwrap();

        let stages: Vec<Stage> = report.outcomes().iter().map(|(s, _)| *s).collect();
        assert_eq!(stages, Stage::ORDER);
        assert!(report.performed(Stage::Swapchain));
        assert!(report.performed(Stage::Pipeline));
        assert!(r.tracker().is_clean());
        assert!(r.is_ready());
    }

    #[test]
    fn clean_renderable_reports_no_work() {
        let (device, mut ctx, mut r) = setup(4);
        r.set_swapchain(swapchain(640));
        r.display_update(&mut ctx).unwrap();
        assert!(!r.needs_display_update(ctx.pool.generation()));

        device.clear_calls();
        let report = r.display_update(&mut ctx).unwrap();
        assert!(
            report
                .outcomes()
                .iter()
                .all(|(_, o)| *o == StageOutcome::NoWork)
        );
        assert!(device.calls().is_empty());
    }

    #[test]
    fn update_without_swapchain_is_rejected() {
        let (_device, mut ctx, mut r) = setup(4);
        assert_eq!(
            r.display_update(&mut ctx),
            Err(RenderError::Invariant(InvariantViolation::MissingSwapchain))
        );
    }

    #[test]
    fn model_view_only_rewrites_uniforms() {
        let (device, mut ctx, mut r) = setup(4);
        r.set_swapchain(swapchain(640));
        r.display_update(&mut ctx).unwrap();

        r.apply(RenderUpdate::ModelView(glam::Mat4::from_translation(
            glam::Vec3::new(0.0, 0.0, -5.0),
        )));
        assert_eq!(r.state(Uniforms), NeedsUpdate);
        device.clear_calls();
        let report = r.display_update(&mut ctx).unwrap();

        assert!(report.performed(Stage::Uniforms));
        assert!(!report.performed(Stage::Vertices));
        let calls = device.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| matches!(c, DeviceCall::WriteBuffer { .. })));
    }

    #[test]
    fn stale_epoch_is_ignored() {
        let (_device, _ctx, mut r) = setup(4);
        r.apply(RenderUpdate::RebuildVertices { count: 9, epoch: 0 });
        assert_eq!(r.vertex_count(), 4);
        assert_eq!(r.drained_epoch, 1);
    }

    #[test]
    fn resize_keeps_the_pipeline() {
        let (_device, mut ctx, mut r) = setup(4);
        r.set_swapchain(swapchain(640));
        r.display_update(&mut ctx).unwrap();
        let pipeline = r.pipeline();

        assert_eq!(r.set_swapchain(swapchain(800)), SwapchainChange::Resized);
        assert_eq!(r.state(Pipelines), Clean);
        r.display_update(&mut ctx).unwrap();
        assert_eq!(r.pipeline(), pipeline);
    }

    #[test]
    fn destroy_twice_is_harmless() {
        let (device, mut ctx, mut r) = setup(4);
        r.set_swapchain(swapchain(640));
        r.display_update(&mut ctx).unwrap();

        r.destroy(&mut ctx).unwrap();
        r.destroy(&mut ctx).unwrap();
        assert!(r.is_destroyed());
        assert!(!r.needs_display_update(ctx.pool.generation()));
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(ctx.pool.allocated(), 0);
    }
}
