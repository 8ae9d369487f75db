//! Orrery engine crate.
//!
//! Keeps per-swapchain-image GPU resources of independently updatable
//! renderables consistent between a producer thread, which stages data and
//! enqueues tasks, and the render thread, which owns every device object.
//!
//! The pieces, leaves first:
//! - [`resource`]: dirty-flag tracker, staging channel, per-image resources, descriptor pool
//! - [`task`]: the producer-to-render-thread queue
//! - [`renderable`]: the per-renderable orchestrator and the concrete kinds
//! - [`scene`]: the per-frame driver
//! - [`device`]: the graphics device contract, a `wgpu` backend and a recording backend

pub mod command;
pub mod coords;
pub mod core;
pub mod device;
pub mod error;
pub mod logging;
pub mod renderable;
pub mod resource;
pub mod scene;
pub mod swapchain;
pub mod task;
pub mod thread;
pub mod time;
pub mod visual;
pub mod window;

pub use error::{InvariantViolation, RenderError, RenderResult};
pub use scene::{FrameReport, Scene, SceneConfig};
pub use swapchain::{SwapchainChange, SwapchainContext};
