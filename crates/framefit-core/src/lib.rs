//! framefit-core — Face shape analysis and eyewear overlay compositing.
//!
//! Classifies face shape from face-mesh landmarks, maps shapes to frame
//! style recommendations, places 2D eyewear over the eyes and renders
//! previews and mirror-corrected exports. Landmarks come from an ONNX
//! face-mesh model behind the [`LandmarkDetector`] trait.

pub mod catalog;
pub mod classifier;
pub mod detector;
pub mod geometry;
pub mod landmarks;
pub mod mirror;
pub mod recommend;
pub mod render;
pub mod types;

pub use detector::{FaceMeshDetector, LandmarkDetector};
pub use geometry::RenderMode;
pub use landmarks::{Detection, Landmark, LandmarkSet};
pub use types::{Category, FaceShape, FrameAsset, OverlayTransform, Product, StyleCategory, Surface};
