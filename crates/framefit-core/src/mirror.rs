//! Horizontal mirror for self-view.
//!
//! The live preview shows the camera mirrored so the user sees themselves
//! as in a mirror. Exports must undo that. Both directions use the same
//! transform, `x' = width - x`, which is its own inverse.

use crate::types::OverlayTransform;
use image::RgbaImage;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizontalMirror {
    width: f64,
}

impl HorizontalMirror {
    pub fn new(width: u32) -> Self {
        Self {
            width: width as f64,
        }
    }

    /// Map a surface point into mirrored space.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (self.width - x, y)
    }

    /// Map a mirrored point back to surface space.
    pub fn invert(&self, x: f64, y: f64) -> (f64, f64) {
        self.apply(x, y)
    }

    /// Mirror an overlay placement: the centre moves and the tilt reverses.
    pub fn apply_transform(&self, t: &OverlayTransform) -> OverlayTransform {
        let (center_x, center_y) = self.apply(t.center_x, t.center_y);
        OverlayTransform {
            center_x,
            center_y,
            rotation: -t.rotation,
            ..*t
        }
    }

    pub fn apply_image(&self, image: &RgbaImage) -> RgbaImage {
        image::imageops::flip_horizontal(image)
    }

    pub fn invert_image(&self, image: &RgbaImage) -> RgbaImage {
        self.apply_image(image)
    }
}
