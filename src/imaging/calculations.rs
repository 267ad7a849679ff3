//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate output dimensions that fit inside a bounding box.
///
/// Never upscales: a source that already fits keeps its native size. A larger
/// source is scaled down proportionally so the limiting dimension matches its
/// bound exactly. Never crops.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `bounds` - Bounding box (max width, max height)
///
/// # Returns
/// * `(width, height)` - Fitted dimensions, each at least 1
///
/// # Examples
/// ```
/// # use faso_media::imaging::fit_within;
/// // 4000x3000 into an 800x600 box → 800x600
/// assert_eq!(fit_within((4000, 3000), (800, 600)), (800, 600));
///
/// // Already small enough → unchanged
/// assert_eq!(fit_within((640, 480), (800, 600)), (640, 480));
/// ```
pub fn fit_within(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;

    if src_w == 0 || src_h == 0 || (src_w <= max_w && src_h <= max_h) {
        return (src_w, src_h);
    }

    let scale_w = max_w as f64 / src_w as f64;
    let scale_h = max_h as f64 / src_h as f64;

    if scale_w <= scale_h {
        // Width is the limiting side
        let h = (src_h as f64 * scale_w).round() as u32;
        (max_w, h.clamp(1, max_h))
    } else {
        // Height is the limiting side
        let w = (src_w as f64 * scale_h).round() as u32;
        (w.clamp(1, max_w), max_h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // fit_within: no upscale
    // =========================================================================

    #[test]
    fn fit_keeps_small_image_native() {
        assert_eq!(fit_within((640, 480), (800, 600)), (640, 480));
    }

    #[test]
    fn fit_keeps_exact_match_native() {
        assert_eq!(fit_within((800, 600), (800, 600)), (800, 600));
    }

    #[test]
    fn fit_small_portrait_into_landscape_box() {
        assert_eq!(fit_within((300, 500), (800, 600)), (300, 500));
    }

    // =========================================================================
    // fit_within: downscale
    // =========================================================================

    #[test]
    fn fit_landscape_same_aspect() {
        // 4000x3000 (4:3) into 1600x1200 (4:3) → exact box
        assert_eq!(fit_within((4000, 3000), (1600, 1200)), (1600, 1200));
    }

    #[test]
    fn fit_wide_landscape_limited_by_width() {
        // 4000x2000 into 800x600: width limits, 2000 * 0.2 = 400
        assert_eq!(fit_within((4000, 2000), (800, 600)), (800, 400));
    }

    #[test]
    fn fit_portrait_limited_by_height() {
        // 3000x4000 into 800x600: height limits, 3000 * 0.15 = 450
        assert_eq!(fit_within((3000, 4000), (800, 600)), (450, 600));
    }

    #[test]
    fn fit_square_box() {
        // 4000x3000 into 200x200: width limits, 3000 * 0.05 = 150
        assert_eq!(fit_within((4000, 3000), (200, 200)), (200, 150));
    }

    #[test]
    fn fit_only_one_side_exceeds() {
        // 1000x500 into 800x600: only width exceeds
        assert_eq!(fit_within((1000, 500), (800, 600)), (800, 400));
    }

    #[test]
    fn fit_preserves_aspect_within_rounding() {
        let src = (3457, 2311);
        let (w, h) = fit_within(src, (800, 600));
        let src_aspect = src.0 as f64 / src.1 as f64;
        let out_aspect = w as f64 / h as f64;
        assert!(w <= 800 && h <= 600);
        assert!(w == 800 || h == 600);
        assert!((src_aspect - out_aspect).abs() < 0.01);
    }

    #[test]
    fn fit_extreme_panorama_never_zero() {
        assert_eq!(fit_within((100_000, 10), (200, 200)), (200, 1));
    }

    #[test]
    fn fit_zero_dimension_passthrough() {
        assert_eq!(fit_within((0, 100), (200, 200)), (0, 100));
    }
}
