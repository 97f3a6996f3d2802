//! Pure calculation functions for variant dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the rendered dimensions of a variant.
///
/// Height follows from the target width so the aspect ratio is preserved.
/// Variants never upscale: when the target is at least as wide as the source,
/// the source dimensions are returned unchanged.
///
/// # Arguments
/// * `original` - Source image dimensions (width, height)
/// * `target_width` - Requested variant width
///
/// # Returns
/// * `(width, height)` - Dimensions to render, height at least 1
///
/// # Examples
/// ```
/// # use imgboard::imaging::calculate_variant_dimensions;
/// // 1000x800 down to 600 wide → 600x480
/// assert_eq!(calculate_variant_dimensions((1000, 800), 600), (600, 480));
///
/// // Wider than the source → source size
/// assert_eq!(calculate_variant_dimensions((1000, 800), 1600), (1000, 800));
/// ```
pub fn calculate_variant_dimensions(original: (u32, u32), target_width: u32) -> (u32, u32) {
    let (orig_w, orig_h) = original;
    if target_width >= orig_w || orig_w == 0 {
        return (orig_w, orig_h);
    }
    let ratio = target_width as f64 / orig_w as f64;
    let height = ((orig_h as f64 * ratio).round() as u32).max(1);
    (target_width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downscale_landscape() {
        // 1000x800, target 600 → 800 * 0.6 = 480
        assert_eq!(calculate_variant_dimensions((1000, 800), 600), (600, 480));
        assert_eq!(calculate_variant_dimensions((1000, 800), 800), (800, 640));
    }

    #[test]
    fn downscale_portrait() {
        // 1500x2000, target 600 → 2000 * 0.4 = 800
        assert_eq!(calculate_variant_dimensions((1500, 2000), 600), (600, 800));
    }

    #[test]
    fn rounds_height() {
        // 1000x333 at 600 → 199.8 → 200
        assert_eq!(calculate_variant_dimensions((1000, 333), 600), (600, 200));
    }

    #[test]
    fn never_upscales() {
        assert_eq!(calculate_variant_dimensions((1000, 800), 1200), (1000, 800));
        assert_eq!(calculate_variant_dimensions((1000, 800), 1000), (1000, 800));
    }

    #[test]
    fn extreme_panorama_keeps_one_pixel() {
        // 10000x10 at 600 → 0.6 → clamped to 1
        assert_eq!(calculate_variant_dimensions((10000, 10), 600), (600, 1));
    }
}
