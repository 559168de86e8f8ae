//! Face-mesh landmark detection via ONNX Runtime.
//!
//! The landmark model is an opaque dependency: it takes one image and
//! returns at most one dense face mesh. [`LandmarkDetector`] is the seam the
//! rest of the system depends on; [`FaceMeshDetector`] implements it for a
//! single-face mesh model (192×192 RGB input, 468+ xyz points and a face
//! presence logit as outputs).

use crate::landmarks::{Detection, Landmark, LandmarkSet, LANDMARK_COUNT};
use image::RgbaImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const FACEMESH_INPUT_SIZE: usize = 192;
const FACEMESH_SCALE: f32 = 255.0;
/// Value used for letterbox padding before normalization.
const FACEMESH_PAD: u8 = 0;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A single-face landmark detector. Implementations need not be reentrant;
/// callers serialize access.
pub trait LandmarkDetector {
    fn detect(&mut self, image: &RgbaImage) -> Result<Detection, DetectorError>;
}

/// Metadata for coordinate de-mapping after letterbox resize.
#[derive(Debug, Clone, Copy)]
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl LetterboxInfo {
    fn fit(width: usize, height: usize, target: usize) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: (target as f32 - new_w) / 2.0,
            pad_y: (target as f32 - new_h) / 2.0,
        }
    }

    /// Model-input pixel → normalized source coordinate.
    fn to_source(&self, x: f32, y: f32, width: usize, height: usize) -> (f64, f64) {
        let sx = (x - self.pad_x) / self.scale;
        let sy = (y - self.pad_y) / self.scale;
        (sx as f64 / width as f64, sy as f64 / height as f64)
    }
}

/// Output tensor roles: (landmarks, optional presence score).
type OutputRoles = (usize, Option<usize>);

/// ONNX face-mesh landmark model.
pub struct FaceMeshDetector {
    session: Session,
    num_outputs: usize,
    confidence_threshold: f32,
}

impl FaceMeshDetector {
    /// Load the face-mesh ONNX model from the given path.
    pub fn load(model_path: &str, confidence_threshold: f32) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?output_names,
            confidence_threshold,
            "loaded face mesh model"
        );

        if output_names.is_empty() {
            return Err(DetectorError::InferenceFailed(
                "face mesh model has no outputs".into(),
            ));
        }

        Ok(Self {
            session,
            num_outputs: output_names.len(),
            confidence_threshold,
        })
    }

    /// Letterbox an RGBA frame into a 1×3×192×192 float tensor in `[0, 1]`.
    fn preprocess(&self, image: &RgbaImage) -> (Array4<f32>, LetterboxInfo) {
        preprocess_rgba(image, FACEMESH_INPUT_SIZE)
    }
}

impl LandmarkDetector for FaceMeshDetector {
    fn detect(&mut self, image: &RgbaImage) -> Result<Detection, DetectorError> {
        let (input, letterbox) = self.preprocess(image);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut tensors: Vec<Vec<f32>> = Vec::with_capacity(self.num_outputs);
        for idx in 0..self.num_outputs {
            let (_, data) = outputs[idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("output {idx}: {e}")))?;
            tensors.push(data.to_vec());
        }

        let sizes: Vec<usize> = tensors.iter().map(Vec::len).collect();
        let (landmark_idx, score_idx) = discover_outputs(&sizes).ok_or_else(|| {
            DetectorError::InferenceFailed(format!(
                "no output with {} landmark values (sizes {sizes:?})",
                LANDMARK_COUNT * 3
            ))
        })?;

        if let Some(idx) = score_idx {
            let presence = sigmoid(tensors[idx][0]);
            if presence < self.confidence_threshold {
                tracing::debug!(presence, "face presence below threshold");
                return Ok(Detection::NotDetected);
            }
        }

        let landmarks = decode_landmarks(
            &tensors[landmark_idx],
            &letterbox,
            image.width() as usize,
            image.height() as usize,
        )
        .map_err(|e| DetectorError::InferenceFailed(e.to_string()))?;

        Ok(Detection::Face(landmarks))
    }
}

fn preprocess_rgba(image: &RgbaImage, target: usize) -> (Array4<f32>, LetterboxInfo) {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let letterbox = LetterboxInfo::fit(width, height, target);

    let new_w = ((width as f32 * letterbox.scale).round() as usize).min(target);
    let new_h = ((height as f32 * letterbox.scale).round() as usize).min(target);
    let pad_x_start = letterbox.pad_x.floor() as usize;
    let pad_y_start = letterbox.pad_y.floor() as usize;

    let pad = FACEMESH_PAD as f32 / FACEMESH_SCALE;
    let mut tensor = Array4::<f32>::from_elem((1, 3, target, target), pad);

    // Bilinear resize, sampling at pixel centres.
    let inv_scale = 1.0 / letterbox.scale;
    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * inv_scale - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as u32;
        let y1 = (y0 + 1).min(height as u32 - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * inv_scale - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as u32;
            let x1 = (x0 + 1).min(width as u32 - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = image.get_pixel(x0, y0).0;
            let tr = image.get_pixel(x1, y0).0;
            let bl = image.get_pixel(x0, y1).0;
            let br = image.get_pixel(x1, y1).0;

            for c in 0..3 {
                let val = tl[c] as f32 * (1.0 - fx) * (1.0 - fy)
                    + tr[c] as f32 * fx * (1.0 - fy)
                    + bl[c] as f32 * (1.0 - fx) * fy
                    + br[c] as f32 * fx * fy;
                tensor[[0, c, pad_y_start + y, pad_x_start + x]] = val / FACEMESH_SCALE;
            }
        }
    }

    (tensor, letterbox)
}

/// Pick the landmark output (the first with at least 468×3 values) and the
/// presence score (the first single-value output).
fn discover_outputs(sizes: &[usize]) -> Option<OutputRoles> {
    let landmarks = sizes.iter().position(|&n| n >= LANDMARK_COUNT * 3)?;
    let score = sizes.iter().position(|&n| n == 1);
    Some((landmarks, score))
}

/// Convert model-input pixel coordinates to a normalized landmark set.
fn decode_landmarks(
    raw: &[f32],
    letterbox: &LetterboxInfo,
    width: usize,
    height: usize,
) -> Result<LandmarkSet, crate::landmarks::LandmarkError> {
    let depth_scale = letterbox.scale as f64 * width as f64;
    let points = raw
        .chunks_exact(3)
        .map(|p| {
            let (x, y) = letterbox.to_source(p[0], p[1], width, height);
            Landmark::new(x, y, p[2] as f64 / depth_scale)
        })
        .collect();
    LandmarkSet::new(points)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
