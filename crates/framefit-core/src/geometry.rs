//! Eyewear placement from eye-corner landmarks.
//!
//! The overlay is anchored on the two outer eye corners: centred on their
//! midpoint, rotated along the line between them, and sized relative to
//! their distance. Every result is computed from scratch; there is no
//! smoothing between frames.

use crate::landmarks::{index, Detection, LandmarkSet};
use crate::types::{OverlayTransform, Surface};

/// Overlay width relative to the outer-eye distance, synthetic drawing.
const SYNTHETIC_WIDTH_SCALE: f64 = 1.5;
/// Overlay height relative to its width, synthetic drawing.
const SYNTHETIC_ASPECT: f64 = 0.4;
/// Overlay width relative to the outer-eye distance, bitmap asset.
const BITMAP_WIDTH_SCALE: f64 = 2.0;
/// Overlay height relative to its width, bitmap asset.
const BITMAP_ASPECT: f64 = 0.5;

/// How the overlay will be drawn, which decides its proportions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Live preview: two-lens frame drawn from primitives.
    LiveSynthetic,
    /// Captured or uploaded photo: the product bitmap is composited.
    PhotoAsset,
}

impl RenderMode {
    fn scales(self) -> (f64, f64) {
        match self {
            RenderMode::LiveSynthetic => (SYNTHETIC_WIDTH_SCALE, SYNTHETIC_ASPECT),
            RenderMode::PhotoAsset => (BITMAP_WIDTH_SCALE, BITMAP_ASPECT),
        }
    }
}

/// Outer eye corners in surface pixels: (left, right).
fn eye_corners_px(landmarks: &LandmarkSet, surface: Surface) -> ((f64, f64), (f64, f64)) {
    let w = surface.width as f64;
    let h = surface.height as f64;
    let left = landmarks.get(index::LEFT_EYE_OUTER);
    let right = landmarks.get(index::RIGHT_EYE_OUTER);
    ((left.x * w, left.y * h), (right.x * w, right.y * h))
}

/// Pixel distance between the outer eye corners.
pub fn eye_distance(landmarks: &LandmarkSet, surface: Surface) -> f64 {
    let ((lx, ly), (rx, ry)) = eye_corners_px(landmarks, surface);
    (rx - lx).hypot(ry - ly)
}

/// Compute the overlay placement for one landmark set.
pub fn place(landmarks: &LandmarkSet, mode: RenderMode, surface: Surface) -> OverlayTransform {
    let ((lx, ly), (rx, ry)) = eye_corners_px(landmarks, surface);
    let (width_scale, aspect) = mode.scales();

    let distance = (rx - lx).hypot(ry - ly);
    let width = distance * width_scale;

    OverlayTransform {
        center_x: (lx + rx) / 2.0,
        center_y: (ly + ry) / 2.0,
        width,
        height: width * aspect,
        rotation: (ry - ly).atan2(rx - lx),
    }
}

/// Placement for a detection result. `None` means the overlay must be cleared.
pub fn overlay_for(
    detection: &Detection,
    mode: RenderMode,
    surface: Surface,
) -> Option<OverlayTransform> {
    detection
        .landmarks()
        .map(|landmarks| place(landmarks, mode, surface))
}
