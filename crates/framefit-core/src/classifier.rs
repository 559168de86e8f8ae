//! Face shape classification from landmark proportions.
//!
//! Pure and deterministic: the same landmark set always yields the same
//! shape. Caching across frames is the caller's concern.

use crate::landmarks::{index, LandmarkSet};
use crate::types::FaceShape;

const LONG_FACE_RATIO: f64 = 1.35;
const WIDE_FACE_RATIO: f64 = 1.15;
const LONG_FACE_HEART_JAW_TO_CHEEK: f64 = 0.9;
const BALANCED_HEART_JAW_TO_CHEEK: f64 = 0.85;
const SQUARE_JAW_TO_FOREHEAD: f64 = 0.95;

/// Raw face dimensions in normalized image units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMeasurements {
    pub face_width: f64,
    pub face_length: f64,
    pub jaw_width: f64,
    pub forehead_width: f64,
}

impl FaceMeasurements {
    pub fn from_landmarks(landmarks: &LandmarkSet) -> Self {
        let left_cheek = landmarks.get(index::LEFT_CHEEK);
        let right_cheek = landmarks.get(index::RIGHT_CHEEK);
        let top_head = landmarks.get(index::TOP_HEAD);
        let chin = landmarks.get(index::CHIN);
        let left_jaw = landmarks.get(index::LEFT_JAW);
        let right_jaw = landmarks.get(index::RIGHT_JAW);
        let left_forehead = landmarks.get(index::LEFT_FOREHEAD);
        let right_forehead = landmarks.get(index::RIGHT_FOREHEAD);

        Self {
            face_width: (right_cheek.x - left_cheek.x).abs(),
            face_length: (chin.y - top_head.y).abs(),
            jaw_width: (right_jaw.x - left_jaw.x).abs(),
            forehead_width: (right_forehead.x - left_forehead.x).abs(),
        }
    }

    pub fn ratios(&self) -> FaceRatios {
        FaceRatios {
            length_to_width: self.face_length / self.face_width,
            jaw_to_forehead: self.jaw_width / self.forehead_width,
            // Cheekbone width is the face width at its widest.
            jaw_to_cheek: self.jaw_width / self.face_width,
        }
    }
}

/// Proportions that drive the decision policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceRatios {
    pub length_to_width: f64,
    pub jaw_to_forehead: f64,
    pub jaw_to_cheek: f64,
}

/// Classify a face from its proportions.
///
/// Non-finite ratios from degenerate meshes fail every comparison and land
/// in the balanced band, which resolves to [`FaceShape::Oval`].
pub fn classify_ratios(r: &FaceRatios) -> FaceShape {
    if r.length_to_width >= LONG_FACE_RATIO {
        if r.jaw_to_cheek < LONG_FACE_HEART_JAW_TO_CHEEK {
            FaceShape::Heart
        } else {
            FaceShape::Oval
        }
    } else if r.length_to_width <= WIDE_FACE_RATIO {
        if r.jaw_to_forehead >= SQUARE_JAW_TO_FOREHEAD {
            FaceShape::Square
        } else {
            FaceShape::Round
        }
    } else if r.jaw_to_cheek < BALANCED_HEART_JAW_TO_CHEEK {
        FaceShape::Heart
    } else if r.jaw_to_forehead >= SQUARE_JAW_TO_FOREHEAD {
        FaceShape::Square
    } else {
        FaceShape::Oval
    }
}

/// Classify a face from a full landmark set.
pub fn classify(landmarks: &LandmarkSet) -> FaceShape {
    let ratios = FaceMeasurements::from_landmarks(landmarks).ratios();
    let shape = classify_ratios(&ratios);
    tracing::debug!(
        length_to_width = ratios.length_to_width,
        jaw_to_forehead = ratios.jaw_to_forehead,
        jaw_to_cheek = ratios.jaw_to_cheek,
        ?shape,
        "classified face shape"
    );
    shape
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::fixtures::set_with;

    fn ratios(length_to_width: f64, jaw_to_forehead: f64, jaw_to_cheek: f64) -> FaceRatios {
        FaceRatios {
            length_to_width,
            jaw_to_forehead,
            jaw_to_cheek,
        }
    }

    #[test]
    fn test_long_face() {
        assert_eq!(classify_ratios(&ratios(1.40, 1.0, 0.8)), FaceShape::Heart);
        assert_eq!(classify_ratios(&ratios(1.40, 1.0, 0.95)), FaceShape::Oval);
    }

    #[test]
    fn test_wide_face() {
        assert_eq!(classify_ratios(&ratios(1.10, 0.97, 1.0)), FaceShape::Square);
        assert_eq!(classify_ratios(&ratios(1.10, 0.80, 1.0)), FaceShape::Round);
    }

    #[test]
    fn test_balanced_face() {
        assert_eq!(classify_ratios(&ratios(1.25, 1.0, 0.80)), FaceShape::Heart);
        assert_eq!(classify_ratios(&ratios(1.25, 0.96, 0.90)), FaceShape::Square);
        assert_eq!(classify_ratios(&ratios(1.25, 0.90, 0.90)), FaceShape::Oval);
    }

    #[test]
    fn test_band_boundaries_inclusive() {
        // Exactly 1.35 is long, exactly 1.15 is wide.
        assert_eq!(classify_ratios(&ratios(1.35, 1.0, 0.87)), FaceShape::Heart);
        assert_eq!(classify_ratios(&ratios(1.15, 0.95, 1.0)), FaceShape::Square);
        // 0.87 would be Oval in the balanced band but Heart in the long band.
        assert_eq!(classify_ratios(&ratios(1.30, 0.5, 0.87)), FaceShape::Oval);
    }

    #[test]
    fn test_degenerate_ratios_do_not_panic() {
        let shape = classify_ratios(&ratios(f64::NAN, f64::NAN, f64::NAN));
        assert_eq!(shape, FaceShape::Oval);
    }

    #[test]
    fn test_measurements_from_landmarks() {
        let set = set_with(&[
            (index::LEFT_CHEEK, 0.30, 0.5),
            (index::RIGHT_CHEEK, 0.70, 0.5),
            (index::TOP_HEAD, 0.5, 0.20),
            (index::CHIN, 0.5, 0.76),
            (index::LEFT_JAW, 0.34, 0.7),
            (index::RIGHT_JAW, 0.66, 0.7),
            (index::LEFT_FOREHEAD, 0.32, 0.3),
            (index::RIGHT_FOREHEAD, 0.68, 0.3),
        ]);
        let m = FaceMeasurements::from_landmarks(&set);
        assert!((m.face_width - 0.40).abs() < 1e-12);
        assert!((m.face_length - 0.56).abs() < 1e-12);
        assert!((m.jaw_width - 0.32).abs() < 1e-12);
        assert!((m.forehead_width - 0.36).abs() < 1e-12);

        // 1.4 long, jaw/cheek 0.8 → heart
        assert_eq!(classify(&set), FaceShape::Heart);
    }

    #[test]
    fn test_mirrored_landmarks_same_shape() {
        // Swapping left/right points must not change the absolute widths.
        let set = set_with(&[
            (index::LEFT_CHEEK, 0.75, 0.5),
            (index::RIGHT_CHEEK, 0.25, 0.5),
            (index::TOP_HEAD, 0.5, 0.25),
            (index::CHIN, 0.5, 0.80),
            (index::LEFT_JAW, 0.73, 0.7),
            (index::RIGHT_JAW, 0.27, 0.7),
            (index::LEFT_FOREHEAD, 0.74, 0.3),
            (index::RIGHT_FOREHEAD, 0.26, 0.3),
        ]);
        // length 0.55 / width 0.5 = 1.1, jaw 0.46 / forehead 0.48 ≈ 0.958
        assert_eq!(classify(&set), FaceShape::Square);
    }
}
