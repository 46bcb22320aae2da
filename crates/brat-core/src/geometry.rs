use serde::{Deserialize, Serialize};

/// Size of the browser viewport a render context is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1536,
            height: 695,
        }
    }
}

/// An axis-aligned rectangle in CSS pixels, as reported by the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Same origin, replaced size.
    pub fn with_size(&self, width: f64, height: f64) -> Self {
        Self {
            x: self.x,
            y: self.y,
            width,
            height,
        }
    }

    /// Snap to whole pixels with an even width and height.
    ///
    /// yuv420p subsamples chroma 2x2, so H.264 rejects odd frame sizes. The
    /// origin is floored too: a fractional origin makes the screenshot cover
    /// the enclosing integer rectangle, one pixel wider or taller.
    /// Returns `None` when the box would collapse to nothing.
    pub fn even_pixels(&self) -> Option<Self> {
        let w = (self.width.floor() as i64) & !1;
        let h = (self.height.floor() as i64) & !1;
        if w <= 0 || h <= 0 {
            return None;
        }
        Some(Self::new(
            self.x.floor(),
            self.y.floor(),
            w as f64,
            h as f64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_pixels_rounds_down() {
        let b = BoundingBox::new(10.0, 20.0, 501.7, 333.0).even_pixels().unwrap();
        assert_eq!(b, BoundingBox::new(10.0, 20.0, 500.0, 332.0));
    }

    #[test]
    fn test_even_pixels_snaps_fractional_origin() {
        let b = BoundingBox::new(10.5, 20.25, 500.0, 300.0).even_pixels().unwrap();
        assert_eq!(b, BoundingBox::new(10.0, 20.0, 500.0, 300.0));
        // The clip must cover whole pixels only, or the capture grows by one.
        assert_eq!(b.x.fract(), 0.0);
        assert_eq!(b.y.fract(), 0.0);
        assert_eq!((b.x + b.width).fract(), 0.0);
        assert_eq!((b.width as i64) % 2, 0);
    }

    #[test]
    fn test_even_pixels_collapses() {
        assert!(BoundingBox::new(0.0, 0.0, 1.9, 40.0).even_pixels().is_none());
        assert!(BoundingBox::new(0.0, 0.0, 0.0, 0.0).even_pixels().is_none());
    }

    #[test]
    fn test_default_viewport() {
        assert_eq!(Viewport::default(), Viewport::new(1536, 695));
    }
}
