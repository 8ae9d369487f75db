use glam::Vec2;

/// Axis-aligned screen rectangle in physical pixels (top-left origin).
///
/// Produced by rubber-band selection, so the size may be negative until
/// [`normalized`](Self::normalized) is applied.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ScreenRect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl ScreenRect {
    #[inline]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            origin: Vec2::new(x, y),
            size: Vec2::new(w, h),
        }
    }

    /// Rectangle spanned by two drag corners in any order.
    #[inline]
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        Self {
            origin: a,
            size: b - a,
        }
        .normalized()
    }

    #[inline]
    pub fn max(self) -> Vec2 {
        self.origin + self.size
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.size.x == 0.0 || self.size.y == 0.0
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.origin.is_finite() && self.size.is_finite()
    }

    /// Normalizes the rectangle so width/height are non-negative.
    #[inline]
    pub fn normalized(self) -> Self {
        let min = self.origin.min(self.origin + self.size);
        let max = self.origin.max(self.origin + self.size);
        Self {
            origin: min,
            size: max - min,
        }
    }

    /// Closed outline as a five-point line strip, starting and ending at the
    /// top-left corner.
    pub fn outline(self) -> [[f32; 2]; 5] {
        let r = self.normalized();
        let (x0, y0) = (r.origin.x, r.origin.y);
        let (x1, y1) = (r.max().x, r.max().y);
        [[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(x: f32, y: f32, w: f32, h: f32) -> ScreenRect {
        ScreenRect::new(x, y, w, h)
    }

    // ── normalized ────────────────────────────────────────────────────────

    #[test]
    fn normalized_positive_is_identity() {
        let rect = r(1.0, 2.0, 10.0, 20.0);
        assert_eq!(rect.normalized(), rect);
    }

    #[test]
    fn normalized_negative_width() {
        let n = r(10.0, 0.0, -4.0, 5.0).normalized();
        assert_eq!(n.origin.x, 6.0);
        assert_eq!(n.size.x, 4.0);
    }

    #[test]
    fn from_corners_any_order() {
        let a = ScreenRect::from_corners(Vec2::new(30.0, 40.0), Vec2::new(10.0, 20.0));
        assert_eq!(a, r(10.0, 20.0, 20.0, 20.0));
    }

    // ── outline ───────────────────────────────────────────────────────────

    #[test]
    fn outline_is_closed() {
        let pts = r(0.0, 0.0, 4.0, 2.0).outline();
        assert_eq!(pts[0], pts[4]);
        assert_eq!(pts[2], [4.0, 2.0]);
    }

    #[test]
    fn is_empty_zero_size() {
        assert!(r(0.0, 0.0, 0.0, 5.0).is_empty());
        assert!(!r(0.0, 0.0, -1.0, 1.0).is_empty());
    }
}
