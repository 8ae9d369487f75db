use super::Extent;

/// Dynamic viewport state recorded into every secondary command buffer.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    #[inline]
    pub const fn new(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Full-extent viewport with the standard `[0, 1]` depth range.
    #[inline]
    pub fn from_extent(extent: Extent) -> Self {
        Self::new(extent.width as f32, extent.height as f32)
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_extent_covers_whole_image() {
        let vp = Viewport::from_extent(Extent::new(800, 600));
        assert_eq!((vp.x, vp.y, vp.width, vp.height), (0.0, 0.0, 800.0, 600.0));
        assert_eq!((vp.min_depth, vp.max_depth), (0.0, 1.0));
    }

    #[test]
    fn zero_extent_is_invalid() {
        assert!(!Viewport::from_extent(Extent::new(0, 600)).is_valid());
    }
}
