//! Swapchain description shared with every renderable.

use crate::coords::{Extent, Viewport};
use crate::device::RenderPassHandle;

/// Snapshot of the presentation layer's swapchain.
///
/// Owned by the host; renderables keep a copy refreshed through
/// [`Scene::set_swapchain`](crate::scene::Scene::set_swapchain).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SwapchainContext {
    pub image_count: usize,
    pub extent: Extent,
    pub render_pass: RenderPassHandle,
    pub viewport: Viewport,
}

impl SwapchainContext {
    pub fn new(image_count: usize, extent: Extent, render_pass: RenderPassHandle) -> Self {
        Self {
            image_count,
            extent,
            render_pass,
            viewport: Viewport::from_extent(extent),
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.extent.height
    }
}

/// How a new swapchain relates to the previous one.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SwapchainChange {
    /// No swapchain was known before.
    FirstTime,
    /// Per-image resources must be recreated with the new cardinality.
    ImageCountChanged { previous: usize },
    /// Same image count; extent, viewport or render pass differ.
    Resized,
    Unchanged,
}

impl SwapchainChange {
    pub fn classify(previous: Option<&SwapchainContext>, next: &SwapchainContext) -> Self {
        match previous {
            None => Self::FirstTime,
            Some(prev) if prev.image_count != next.image_count => Self::ImageCountChanged {
                previous: prev.image_count,
            },
            Some(prev) if prev == next => Self::Unchanged,
            Some(_) => Self::Resized,
        }
    }

    /// True when per-image objects must be destroyed and recreated.
    #[inline]
    pub fn recreates_images(self) -> bool {
        matches!(self, Self::FirstTime | Self::ImageCountChanged { .. })
    }
}
