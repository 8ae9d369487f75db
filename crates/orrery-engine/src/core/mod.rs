//! Contracts between the window runtime and the application.
//!
//! The runtime owns the event loop, the window and its [`Gpu`](crate::device::Gpu);
//! the application sees one [`FrameCtx`] per redraw and decides what the
//! frame contains.

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::{FrameCtx, FramePass, WindowCtx};
