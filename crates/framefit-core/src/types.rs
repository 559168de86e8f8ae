use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of facial proportions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceShape {
    Oval,
    Round,
    Square,
    Heart,
}

impl FaceShape {
    pub const ALL: [FaceShape; 4] = [
        FaceShape::Oval,
        FaceShape::Round,
        FaceShape::Square,
        FaceShape::Heart,
    ];

    /// Display name, capitalized.
    pub fn name(self) -> &'static str {
        match self {
            FaceShape::Oval => "Oval",
            FaceShape::Round => "Round",
            FaceShape::Square => "Square",
            FaceShape::Heart => "Heart",
        }
    }

    /// One-line description shown alongside the recommendations.
    pub fn description(self) -> &'static str {
        match self {
            FaceShape::Oval => {
                "Balanced proportions with gentle curves. Most frames will look great."
            }
            FaceShape::Round => {
                "Soft curves with similar width and length. Angular frames will add definition."
            }
            FaceShape::Square => {
                "Strong jawline with similar width at forehead and jaw. Rounded frames will soften features."
            }
            FaceShape::Heart => {
                "Wider forehead, narrower chin. Frames that are wider at the bottom will balance your features."
            }
        }
    }
}

impl fmt::Display for FaceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for FaceShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oval" => Ok(FaceShape::Oval),
            "round" => Ok(FaceShape::Round),
            "square" => Ok(FaceShape::Square),
            "heart" => Ok(FaceShape::Heart),
            other => Err(format!("unknown face shape: {other}")),
        }
    }
}

/// Catalog category of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Eyeglasses,
    Sunglasses,
    Contacts,
}

/// Styling of an eyewear overlay. Contacts have no overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleCategory {
    Eyeglasses,
    Sunglasses,
}

/// Catalog product, the subset of fields the try-on core reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Image reference (path or URL) of the frame asset.
    pub image: String,
    pub category: Category,
    /// Frame shape tag, e.g. "Aviator" or "Cat-Eye".
    pub shape: String,
    pub price: f64,
    pub brand: String,
    #[serde(default)]
    pub frame_type: String,
}

impl Product {
    pub fn is_eyewear(&self) -> bool {
        matches!(self.category, Category::Eyeglasses | Category::Sunglasses)
    }
}

/// Read-only reference to the eyewear being tried on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAsset {
    pub product_id: String,
    pub name: String,
    pub image_ref: String,
    pub style: StyleCategory,
}

impl FrameAsset {
    /// Asset for an eyewear product; `None` for categories without an overlay.
    pub fn from_product(product: &Product) -> Option<Self> {
        let style = match product.category {
            Category::Eyeglasses => StyleCategory::Eyeglasses,
            Category::Sunglasses => StyleCategory::Sunglasses,
            Category::Contacts => return None,
        };
        Some(Self {
            product_id: product.id.clone(),
            name: product.name.clone(),
            image_ref: product.image.clone(),
            style,
        })
    }
}

/// Pixel dimensions of a render surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
}

impl Surface {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Placement of a 2D eyewear overlay, in surface pixels and radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayTransform {
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
}

impl OverlayTransform {
    /// Map a point from the overlay's local frame (origin at the centre,
    /// x along the eye line) into surface pixels.
    pub fn to_surface(&self, lx: f64, ly: f64) -> (f64, f64) {
        let (sin, cos) = self.rotation.sin_cos();
        (
            self.center_x + lx * cos - ly * sin,
            self.center_y + lx * sin + ly * cos,
        )
    }

    /// Inverse of [`to_surface`](Self::to_surface).
    pub fn to_local(&self, sx: f64, sy: f64) -> (f64, f64) {
        let (sin, cos) = self.rotation.sin_cos();
        let dx = sx - self.center_x;
        let dy = sy - self.center_y;
        (dx * cos + dy * sin, -dx * sin + dy * cos)
    }
}
