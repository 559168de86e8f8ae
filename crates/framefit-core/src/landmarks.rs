//! Face-mesh landmark sets and the semantic index map.
//!
//! The detector reports a dense mesh of normalized points (x and y in
//! `[0, 1]` relative to the submitted image, z relative depth). Only a
//! handful of indices carry meaning for try-on; they are named in [`index`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of points in a face-mesh landmark set.
///
/// Refined models append iris points after this range; those are dropped.
pub const LANDMARK_COUNT: usize = 468;

/// Semantic names for the mesh indices used by classification and placement.
pub mod index {
    pub const NOSE_TIP: usize = 1;
    pub const TOP_HEAD: usize = 10;
    pub const LEFT_FOREHEAD: usize = 21;
    pub const LEFT_EYE_OUTER: usize = 33;
    pub const LEFT_EYE_INNER: usize = 133;
    pub const CHIN: usize = 152;
    pub const LEFT_JAW: usize = 172;
    pub const LEFT_CHEEK: usize = 234;
    pub const RIGHT_FOREHEAD: usize = 251;
    pub const RIGHT_EYE_OUTER: usize = 263;
    pub const RIGHT_EYE_INNER: usize = 362;
    pub const RIGHT_JAW: usize = 397;
    pub const RIGHT_CHEEK: usize = 454;
}

#[derive(Error, Debug, PartialEq)]
pub enum LandmarkError {
    #[error("incomplete landmark set: expected {expected} points, got {actual}")]
    Incomplete { expected: usize, actual: usize },
}

/// A single normalized mesh point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Landmark {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A complete face mesh. Always holds exactly [`LANDMARK_COUNT`] points.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Box<[Landmark]>,
}

impl LandmarkSet {
    /// Build a set from detector output. Extra trailing points (iris
    /// refinement) are discarded; fewer than [`LANDMARK_COUNT`] is an error.
    pub fn new(mut points: Vec<Landmark>) -> Result<Self, LandmarkError> {
        if points.len() < LANDMARK_COUNT {
            return Err(LandmarkError::Incomplete {
                expected: LANDMARK_COUNT,
                actual: points.len(),
            });
        }
        points.truncate(LANDMARK_COUNT);
        Ok(Self {
            points: points.into_boxed_slice(),
        })
    }

    /// Build a set from a flat `[x0, y0, z0, x1, ...]` buffer.
    pub fn from_flat(values: &[f32]) -> Result<Self, LandmarkError> {
        let points = values
            .chunks_exact(3)
            .map(|c| Landmark::new(c[0] as f64, c[1] as f64, c[2] as f64))
            .collect();
        Self::new(points)
    }

    /// Point at a mesh index. Panics only for indices at or beyond
    /// [`LANDMARK_COUNT`], which no named index reaches.
    pub fn get(&self, idx: usize) -> Landmark {
        self.points[idx]
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }
}

/// Outcome of one detector submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Face(LandmarkSet),
    NotDetected,
}

impl Detection {
    pub fn landmarks(&self) -> Option<&LandmarkSet> {
        match self {
            Detection::Face(set) => Some(set),
            Detection::NotDetected => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A mesh with every point at the image centre.
    pub fn centered_set() -> Vec<Landmark> {
        vec![Landmark::new(0.5, 0.5, 0.0); LANDMARK_COUNT]
    }

    /// Override named points on a centred mesh.
    pub fn set_with(overrides: &[(usize, f64, f64)]) -> LandmarkSet {
        let mut points = centered_set();
        for &(idx, x, y) in overrides {
            points[idx] = Landmark::new(x, y, 0.0);
        }
        LandmarkSet::new(points).unwrap()
    }
}
