//! Orrery studio: a window showing a slowly turning point cloud.
//!
//! A producer thread owns the point data and streams full rebuilds, partial
//! updates and camera moves; the event-loop thread is the render thread and
//! drives the scene once per redraw.
//!
//! Controls: drag with the left mouse button for a selection box, `L` to
//! toggle the frame latency (and with it the swapchain image count).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use glam::{Mat4, Vec2, Vec3};
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use orrery_engine::coords::ScreenRect;
use orrery_engine::core::{App, AppControl, FrameCtx};
use orrery_engine::device::GpuInit;
use orrery_engine::logging::{LoggingConfig, init_logging};
use orrery_engine::renderable::{PointsConfig, PointsProducer, SelectionBoxProducer};
use orrery_engine::visual::PointCloud;
use orrery_engine::window::{Runtime, RuntimeConfig};
use orrery_engine::{FrameReport, RenderResult, Scene, SceneConfig, SwapchainContext};

const CLEAR: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.02,
    b: 0.05,
    a: 1.0,
};

const ARMS: usize = 4;
const POINTS_PER_ARM: usize = 2_000;
/// Points nudged per producer tick.
const JITTER_BATCH: usize = 64;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let runtime = RuntimeConfig {
        title: "orrery studio".to_string(),
        ..RuntimeConfig::default()
    };
    Runtime::run(runtime, GpuInit::default(), Studio::default())
}

#[derive(Default)]
struct Studio {
    scene: Option<Scene>,
    producer: Option<Producer>,
    selection: Option<SelectionBoxProducer>,

    cursor: Vec2,
    drag_start: Option<Vec2>,
    /// Latency to apply on the next frame, requested from a key press.
    pending_latency: Option<u32>,
    latency: u32,
}

impl Studio {
    /// Builds the scene once the window's GPU exists.
    fn start(&mut self, ctx: &mut FrameCtx<'_, '_>) -> Result<()> {
        let mut scene = Scene::new(ctx.gpu.graphics(), SceneConfig::default());
        let points = scene
            .add_points(PointsConfig::default())
            .context("failed to add point cloud")?;
        let selection = scene
            .add_selection_box()
            .context("failed to add selection box")?;

        self.latency = GpuInit::default().desired_maximum_frame_latency;
        self.producer = Some(Producer::spawn(points)?);
        self.selection = Some(selection);
        self.scene = Some(scene);
        Ok(())
    }

    fn update_selection(&self) {
        let Some(selection) = &self.selection else {
            return;
        };
        let rect = self
            .drag_start
            .map(|start| ScreenRect::from_corners(start, self.cursor));
        if let Err(err) = selection.set_box(rect) {
            log::warn!("selection box update failed: {err}");
        }
    }
}

impl App for Studio {
    fn on_window_event(&mut self, _window_id: WindowId, event: &WindowEvent) -> AppControl {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Vec2::new(position.x as f32, position.y as f32);
                if self.drag_start.is_some() {
                    self.update_selection();
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.drag_start = (*state == ElementState::Pressed).then_some(self.cursor);
                self.update_selection();
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed && !event.repeat =>
            {
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::KeyL) => {
                        let next = if self.latency >= 2 { 1 } else { 2 };
                        self.pending_latency = Some(next);
                    }
                    PhysicalKey::Code(KeyCode::Escape) => return AppControl::Exit,
                    _ => {}
                }
            }
            _ => {}
        }
        AppControl::Continue
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        if self.scene.is_none() {
            if let Err(err) = self.start(ctx) {
                log::error!("studio startup failed: {err:#}");
                return AppControl::Exit;
            }
        }
        if let Some(latency) = self.pending_latency.take() {
            log::info!("frame latency {} -> {latency}", self.latency);
            self.latency = latency;
            ctx.runtime.set_frame_latency(latency);
        }
        let Some(scene) = self.scene.as_mut() else {
            return AppControl::Exit;
        };

        match prepare(scene, ctx.swapchain()) {
            Ok(report) => {
                for (id, err) in &report.failed {
                    log::warn!("frame {}: renderable {id} not drawn: {err}", report.frame);
                }
            }
            Err(err) => {
                log::error!("frame setup failed: {err}");
                return AppControl::Exit;
            }
        }

        ctx.render(CLEAR, |pass| match scene.record(pass.image_index) {
            Ok(secondaries) => pass.execute_all(secondaries),
            Err(err) => log::error!("recording image {} failed: {err}", pass.image_index),
        })
    }

    fn on_exit(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.stop();
        }
        if let Some(scene) = self.scene.as_mut() {
            if let Err(err) = scene.teardown() {
                log::error!("scene teardown failed: {err}");
            }
        }
    }
}

/// Render-thread half of a frame, before the render pass opens.
fn prepare(scene: &mut Scene, swapchain: SwapchainContext) -> RenderResult<FrameReport> {
    scene.set_swapchain(swapchain)?;
    scene.drain_tasks()?;
    scene.display_update()
}

// ── producer thread ───────────────────────────────────────────────────────

struct Producer {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl Producer {
    fn spawn(points: PointsProducer) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("orrery producer".to_string())
            .spawn(move || {
                if let Err(err) = produce(&points, &flag) {
                    log::error!("producer stopped: {err:#}");
                }
            })
            .context("failed to spawn producer thread")?;
        Ok(Self { running, thread })
    }

    fn stop(self) {
        self.running.store(false, Ordering::Relaxed);
        if self.thread.join().is_err() {
            log::error!("producer thread panicked");
        }
    }
}

fn produce(points: &PointsProducer, running: &AtomicBool) -> Result<()> {
    let mut cloud = spiral(ARMS, POINTS_PER_ARM);
    points.rebuild_points(&cloud)?;

    let mut tick: u64 = 0;
    while running.load(Ordering::Relaxed) {
        let angle = tick as f32 * 0.004;
        let eye = Vec3::new(angle.cos() * 60.0, 25.0, angle.sin() * 60.0);
        points.update_camera(Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y))?;

        let base = (tick as usize * JITTER_BATCH) % cloud.points().len();
        let updates: Vec<(usize, [f32; 3])> = (base..base + JITTER_BATCH)
            .map(|i| i % cloud.points().len())
            .map(|i| {
                let [x, y, z] = cloud.points()[i];
                let wobble = ((tick as f32 + i as f32) * 0.1).sin() * 0.05;
                (i, [x, y + wobble, z])
            })
            .collect();
        let change = cloud.set(&updates);
        points.update_points(&change, &cloud)?;

        tick += 1;
        std::thread::sleep(Duration::from_millis(16));
    }
    Ok(())
}

/// Logarithmic spiral arms in the XZ plane.
fn spiral(arms: usize, per_arm: usize) -> PointCloud {
    let mut cloud = PointCloud::default();
    for arm in 0..arms {
        let offset = arm as f32 * std::f32::consts::TAU / arms as f32;
        for i in 0..per_arm {
            let t = i as f32 / per_arm as f32;
            let radius = 2.0 + t * 28.0;
            let theta = offset + t * 3.0 * std::f32::consts::PI;
            let height = ((i * 7919) % 101) as f32 / 100.0 - 0.5;
            cloud.push([radius * theta.cos(), height, radius * theta.sin()]);
        }
    }
    cloud
}
