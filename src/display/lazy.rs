//! Viewport-based lazy loading.

use crate::config::DisplayConfig;

/// An axis-aligned box in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn expand(&self, margin: f64) -> Rect {
        Rect {
            left: self.left - margin,
            top: self.top - margin,
            width: self.width + 2.0 * margin,
            height: self.height + 2.0 * margin,
        }
    }

    /// Edges that merely touch do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left < other.right()
            && other.left < self.right()
            && self.top < other.bottom()
            && other.top < self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LazyLoadPolicy {
    /// Load this many pixels before the element scrolls into view.
    pub margin_px: u32,
}

impl Default for LazyLoadPolicy {
    fn default() -> Self {
        Self { margin_px: 100 }
    }
}

impl LazyLoadPolicy {
    pub fn from_config(config: &DisplayConfig) -> Self {
        Self {
            margin_px: config.lazy_margin_px,
        }
    }

    /// Priority images (above the fold) always load.
    pub fn should_load(&self, element: &Rect, viewport: &Rect, priority: bool) -> bool {
        priority || element.intersects(&viewport.expand(f64::from(self.margin_px)))
    }
}
