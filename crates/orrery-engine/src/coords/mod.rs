//! Coordinate and geometry types shared by the swapchain layer and renderables.
//!
//! Screen space:
//! - Physical pixels
//! - Origin top-left
//! - +X right, +Y down
//!
//! Renderables convert to clip space in shaders using a uniform.

mod extent;
mod rect;
mod viewport;

pub use extent::Extent;
pub use rect::ScreenRect;
pub use viewport::Viewport;
