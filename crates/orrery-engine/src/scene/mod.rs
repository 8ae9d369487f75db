//! Scene: the renderables of one presentation surface and the per-frame
//! sequence that drives them.
//!
//! Per frame the host calls, in order:
//! 1. [`Scene::set_swapchain`] with the current swapchain description
//! 2. [`Scene::drain_tasks`] to apply every producer task enqueued so far
//! 3. [`Scene::display_update`] to bring device objects up to date
//! 4. [`Scene::record`] for the acquired image, executing the returned
//!    secondaries inside the primary render pass
//!
//! Renderables are kept in insertion order, which is also draw order.

mod ctx;

pub use ctx::{RenderCtx, SceneConfig};

use std::sync::Arc;

use crate::command::SecondaryCommandBuffer;
use crate::device::GraphicsDevice;
use crate::error::{InvariantViolation, RenderError, RenderResult};
use crate::renderable::{
    BoxVertex, Drawable, PointVertex, PointsConfig, PointsDrawable,
    PointsProducer, Renderable, SelectionBoxDrawable, SelectionBoxProducer,
};
use crate::resource::StagingChannel;
use crate::swapchain::{SwapchainChange, SwapchainContext};
use crate::task::{task_queue, RenderableId, TaskQueue, TaskSender};

/// What one [`Scene::display_update`] did.
#[derive(Debug, Default)]
pub struct FrameReport {
    pub frame: u64,
    /// Renderables whose orchestrator ran to completion.
    pub updated: Vec<RenderableId>,
    /// Renderables whose update failed; they are not drawn this frame.
    pub failed: Vec<(RenderableId, RenderError)>,
}

impl FrameReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Scene {
    ctx: RenderCtx,
    renderables: Vec<Renderable>,
    tasks: TaskQueue,
    sender: TaskSender,
    swapchain: Option<SwapchainContext>,
    next_id: u32,
    /// Renderables that failed their last update; skipped when recording.
    failed: Vec<RenderableId>,
    torn_down: bool,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("frame", &self.ctx.frame)
            .field("renderables", &self.renderables.len())
            .field("swapchain", &self.swapchain)
            .finish_non_exhaustive()
    }
}

impl Scene {
    pub fn new(device: Arc<dyn GraphicsDevice>, config: SceneConfig) -> Self {
        let (sender, tasks) = task_queue();
        Self {
            ctx: RenderCtx::new(device, config),
            renderables: Vec::new(),
            tasks,
            sender,
            swapchain: None,
            next_id: 1,
            failed: Vec::new(),
            torn_down: false,
        }
    }

    /// Producer end of this scene's task queue.
    pub fn task_sender(&self) -> TaskSender {
        self.sender.clone()
    }

    #[inline]
    pub fn ctx(&self) -> &RenderCtx {
        &self.ctx
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.ctx.frame
    }

    pub fn swapchain(&self) -> Option<&SwapchainContext> {
        self.swapchain.as_ref()
    }

    pub fn renderable(&self, id: RenderableId) -> Option<&Renderable> {
        self.renderables.iter().find(|r| r.id() == id)
    }

    pub fn renderables(&self) -> &[Renderable] {
        &self.renderables
    }

    // ── membership ────────────────────────────────────────────────────────

    pub fn add_points(&mut self, config: PointsConfig) -> RenderResult<PointsProducer> {
        let (id, staging) = self.add(
            Box::new(PointsDrawable::new(config)),
            std::mem::size_of::<PointVertex>(),
        )?;
        Ok(PointsProducer::new(id, staging, self.task_sender()))
    }

    pub fn add_selection_box(&mut self) -> RenderResult<SelectionBoxProducer> {
        let (id, staging) = self.add(
            Box::new(SelectionBoxDrawable),
            std::mem::size_of::<BoxVertex>(),
        )?;
        Ok(SelectionBoxProducer::new(id, staging, self.task_sender()))
    }

    fn add(
        &mut self,
        drawable: Box<dyn Drawable>,
        element_size: usize,
    ) -> RenderResult<(RenderableId, Arc<StagingChannel>)> {
        self.ctx.thread.verify("add renderable")?;
        if self.torn_down {
            return Err(InvariantViolation::NullHandle { what: "scene" }.into());
        }

        let id = RenderableId(self.next_id);
        self.next_id += 1;
        let staging = Arc::new(StagingChannel::new(
            Arc::clone(&self.ctx.device),
            drawable.label(),
            element_size,
        ));
        let mut renderable = Renderable::new(id, drawable, Arc::clone(&staging), &self.ctx);
        log::debug!("added {} {id}", renderable.label());

        if let Some(swapchain) = self.swapchain {
            renderable.set_swapchain(swapchain);
        }
        self.renderables.push(renderable);
        self.reserve_descriptors();
        Ok((id, staging))
    }

    /// Destroys and forgets one renderable. Its producer handle stays valid
    /// but every later write fails.
    pub fn remove(&mut self, id: RenderableId) -> RenderResult<bool> {
        self.ctx.thread.verify("remove renderable")?;
        let Some(pos) = self.renderables.iter().position(|r| r.id() == id) else {
            return Ok(false);
        };
        self.renderables[pos].destroy(&mut self.ctx)?;
        self.renderables.remove(pos);
        self.failed.retain(|f| *f != id);
        Ok(true)
    }

    /// Grows the shared pool to the sets every renderable needs for the
    /// current image count.
    fn reserve_descriptors(&mut self) {
        let Some(swapchain) = self.swapchain else {
            return;
        };
        let per_image: usize = self
            .renderables
            .iter()
            .map(Renderable::descriptor_sets_per_image)
            .sum();
        self.ctx.pool.reserve(per_image * swapchain.image_count);
    }

    // ── per-frame ─────────────────────────────────────────────────────────

    /// Adopts the host's current swapchain and forwards it to every
    /// renderable.
    pub fn set_swapchain(&mut self, swapchain: SwapchainContext) -> RenderResult<SwapchainChange> {
        self.ctx.thread.verify("set_swapchain")?;
        let change = SwapchainChange::classify(self.swapchain.as_ref(), &swapchain);
        if change == SwapchainChange::Unchanged {
            return Ok(change);
        }

        log::info!(
            "swapchain {change:?}: {} images, {}x{}",
            swapchain.image_count,
            swapchain.width(),
            swapchain.height()
        );
        self.swapchain = Some(swapchain);
        self.reserve_descriptors();
        for renderable in &mut self.renderables {
            renderable.set_swapchain(swapchain);
        }
        Ok(change)
    }

    /// Applies every task enqueued before this call, in enqueue order.
    /// Returns the number of tasks applied.
    ///
    /// Every staging channel is locked across the drain. Producers queue
    /// their task before releasing that lock, so each channel's latest write
    /// is exactly the newest task drained for it, and that write is sealed
    /// for this frame's flush.
    pub fn drain_tasks(&mut self) -> RenderResult<usize> {
        self.ctx.thread.latch()?;
        let stagings: Vec<Arc<StagingChannel>> = self
            .renderables
            .iter()
            .map(|r| Arc::clone(r.staging()))
            .collect();
        let locks: Vec<_> = stagings.iter().map(|s| s.lock_for_drain()).collect();
        let tasks = self.tasks.drain();
        for lock in locks {
            lock.seal();
        }

        let mut applied = 0;
        for task in tasks {
            match self.renderables.iter_mut().find(|r| r.id() == task.target) {
                Some(renderable) => {
                    renderable.apply(task.update);
                    applied += 1;
                }
                None => log::warn!(
                    "dropping task {} ({}) for unknown renderable {}",
                    task.seq,
                    task.update.name(),
                    task.target
                ),
            }
        }
        Ok(applied)
    }

    /// Starts a frame and runs the orchestrator of every renderable that
    /// needs it. Failures are collected, not propagated, so one renderable
    /// cannot stall the others.
    pub fn display_update(&mut self) -> RenderResult<FrameReport> {
        self.ctx.thread.latch()?;
        if self.swapchain.is_none() {
            return Err(InvariantViolation::MissingSwapchain.into());
        }
        self.ctx.frame += 1;

        let mut report = FrameReport {
            frame: self.ctx.frame,
            ..FrameReport::default()
        };
        let generation = self.ctx.pool.generation();
        self.failed.clear();
        for renderable in &mut self.renderables {
            if !renderable.needs_display_update(generation) {
                continue;
            }
            let id = renderable.id();
            match renderable.display_update(&mut self.ctx) {
                Ok(_) => report.updated.push(id),
                Err(err) => {
                    if let RenderError::Invariant(violation) = &err {
                        log::error!("{} {id}: {violation}", renderable.label());
                    }
                    self.failed.push(id);
                    report.failed.push((id, err));
                }
            }
        }
        Ok(report)
    }

    /// Secondaries for `image`, in scene order, recorded on demand.
    /// Renderables that are not ready or failed this frame are left out.
    pub fn record(&mut self, image: usize) -> RenderResult<Vec<&SecondaryCommandBuffer>> {
        self.ctx.thread.verify("record")?;
        let ctx = &self.ctx;
        let failed = &self.failed;
        let mut out = Vec::with_capacity(self.renderables.len());
        for renderable in &mut self.renderables {
            if failed.contains(&renderable.id()) {
                continue;
            }
            if let Some(cb) = renderable.record(ctx, image)? {
                out.push(cb);
            }
        }
        Ok(out)
    }

    /// Destroys every renderable. Safe to call more than once.
    pub fn teardown(&mut self) -> RenderResult<()> {
        self.ctx.thread.verify("teardown")?;
        for renderable in &mut self.renderables {
            if let Err(err) = renderable.destroy(&mut self.ctx) {
                log::error!("teardown of {} {}: {err}", renderable.label(), renderable.id());
                return Err(err);
            }
        }
        if !self.torn_down {
            log::info!("scene torn down after {} frames", self.ctx.frame);
        }
        self.torn_down = true;
        Ok(())
    }
}
