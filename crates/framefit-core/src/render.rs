//! Overlay compositing and export.
//!
//! Two drawing paths share one placement model ([`OverlayTransform`]):
//! a synthetic two-lens frame rasterized from primitives for the live
//! preview, and the product bitmap warped onto captured photos. Both work
//! by inverse-mapping each destination pixel into the overlay's local frame.

use crate::mirror::HorizontalMirror;
use crate::types::{OverlayTransform, StyleCategory};
use ab_glyph::{FontVec, PxScale};
use image::{Pixel, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, Blend};
use imageproc::rect::Rect;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

const STROKE_HALF_WIDTH: f64 = 2.0;
/// Outer reach of the temple arms beyond the frame edge, in pixels.
const TEMPLE_REACH: f64 = 30.0;
const TEMPLE_DROP: f64 = 10.0;
const TEMPLE_INSET: f64 = 10.0;

const LABEL_X: i32 = 10;
const LABEL_Y: i32 = 10;
const LABEL_WIDTH: u32 = 250;
const LABEL_HEIGHT: u32 = 40;
const LABEL_FONT_PX: f32 = 16.0;
const LABEL_PLATE: Rgba<u8> = Rgba([255, 255, 255, 230]);
const LABEL_TEXT: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("font file not found: {0}")]
    FontNotFound(String),
    #[error("invalid font: {0}")]
    InvalidFont(String),
}

/// Stroke and fill colours for the synthetic frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStyle {
    pub stroke: Rgba<u8>,
    pub fill: Rgba<u8>,
}

impl From<StyleCategory> for FrameStyle {
    fn from(style: StyleCategory) -> Self {
        match style {
            StyleCategory::Sunglasses => Self {
                stroke: Rgba([0, 0, 0, 204]),
                fill: Rgba([0, 0, 0, 77]),
            },
            StyleCategory::Eyeglasses => Self {
                stroke: Rgba([100, 100, 100, 179]),
                fill: Rgba([200, 200, 200, 51]),
            },
        }
    }
}

/// What is drawn on top of the base image.
#[derive(Debug, Clone)]
pub enum Overlay {
    /// Primitive two-lens frame plus a product-name label.
    Synthetic {
        transform: OverlayTransform,
        style: StyleCategory,
        label: String,
    },
    /// The product image, scaled and rotated into place.
    Bitmap {
        transform: OverlayTransform,
        bitmap: Arc<RgbaImage>,
    },
}

impl Overlay {
    pub fn transform(&self) -> &OverlayTransform {
        match self {
            Overlay::Synthetic { transform, .. } | Overlay::Bitmap { transform, .. } => transform,
        }
    }

    fn mirrored(&self, mirror: &HorizontalMirror) -> Overlay {
        match self {
            Overlay::Synthetic {
                transform,
                style,
                label,
            } => Overlay::Synthetic {
                transform: mirror.apply_transform(transform),
                style: *style,
                label: label.clone(),
            },
            Overlay::Bitmap { transform, bitmap } => Overlay::Bitmap {
                transform: mirror.apply_transform(transform),
                bitmap: Arc::new(image::imageops::flip_horizontal(bitmap.as_ref())),
            },
        }
    }
}

/// A renderable scene: a base image and an optional overlay placed in the
/// base image's un-mirrored coordinates.
#[derive(Debug, Clone)]
pub struct View {
    /// Base image as shown to the user. Mirrored when `mirrored` is set.
    pub base: RgbaImage,
    pub mirrored: bool,
    pub overlay: Option<Overlay>,
}

/// Draws overlays and produces previews and exports.
#[derive(Default)]
pub struct Renderer {
    font: Option<FontVec>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(font: FontVec) -> Self {
        Self { font: Some(font) }
    }

    /// Load a TTF/OTF font for the product label.
    pub fn load_font(path: &Path) -> Result<Self, RenderError> {
        if !path.exists() {
            return Err(RenderError::FontNotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path).map_err(|e| RenderError::InvalidFont(e.to_string()))?;
        let font = FontVec::try_from_vec(bytes).map_err(|e| RenderError::InvalidFont(e.to_string()))?;
        tracing::info!(path = %path.display(), "loaded label font");
        Ok(Self::with_font(font))
    }

    /// What the user sees. Mirrored views get the overlay mirrored into place;
    /// the label is always drawn unmirrored.
    pub fn preview(&self, view: &View) -> RgbaImage {
        let overlay = if view.mirrored {
            let mirror = HorizontalMirror::new(view.base.width());
            view.overlay.as_ref().map(|o| o.mirrored(&mirror))
        } else {
            view.overlay.clone()
        };
        self.compose(view.base.clone(), overlay.as_ref())
    }

    /// The shareable result: never mirrored.
    pub fn export(&self, view: &View) -> RgbaImage {
        let base = if view.mirrored {
            HorizontalMirror::new(view.base.width()).invert_image(&view.base)
        } else {
            view.base.clone()
        };
        self.compose(base, view.overlay.as_ref())
    }

    /// Export and encode as PNG.
    pub fn export_png(&self, view: &View) -> Result<Vec<u8>, RenderError> {
        encode_png(&self.export(view))
    }

    fn compose(&self, mut base: RgbaImage, overlay: Option<&Overlay>) -> RgbaImage {
        match overlay {
            Some(Overlay::Synthetic {
                transform,
                style,
                label,
            }) => {
                draw_synthetic(&mut base, transform, FrameStyle::from(*style));
                self.draw_label(base, label)
            }
            Some(Overlay::Bitmap { transform, bitmap }) => {
                composite_bitmap(&mut base, bitmap, transform);
                base
            }
            None => base,
        }
    }

    /// Product-name plate in the top-left corner. Text needs a font.
    fn draw_label(&self, image: RgbaImage, text: &str) -> RgbaImage {
        let mut canvas = Blend(image);
        draw_filled_rect_mut(
            &mut canvas,
            Rect::at(LABEL_X, LABEL_Y).of_size(LABEL_WIDTH, LABEL_HEIGHT),
            LABEL_PLATE,
        );
        if let Some(font) = &self.font {
            draw_text_mut(
                &mut canvas,
                LABEL_TEXT,
                LABEL_X + 10,
                LABEL_Y + 12,
                PxScale::from(LABEL_FONT_PX),
                font,
                text,
            );
        }
        canvas.0
    }
}

/// Pixel-space bounding box `[x0, x1) × [y0, y1)` around a centre, clipped.
fn clip_box(image: &RgbaImage, cx: f64, cy: f64, reach: f64) -> (u32, u32, u32, u32) {
    let clamp_x = |v: f64| v.clamp(0.0, image.width() as f64) as u32;
    let clamp_y = |v: f64| v.clamp(0.0, image.height() as f64) as u32;
    (
        clamp_x((cx - reach).floor()),
        clamp_x((cx + reach).ceil() + 1.0),
        clamp_y((cy - reach).floor()),
        clamp_y((cy + reach).ceil() + 1.0),
    )
}

fn ellipse_value(x: f64, y: f64, cx: f64, rx: f64, ry: f64) -> f64 {
    let dx = (x - cx) / rx;
    let dy = y / ry;
    dx * dx + dy * dy
}

fn segment_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (abx, aby) = (b.0 - a.0, b.1 - a.1);
    let len_sq = abx * abx + aby * aby;
    let t = if len_sq > 0.0 {
        (((p.0 - a.0) * abx + (p.1 - a.1) * aby) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (p.0 - (a.0 + t * abx)).hypot(p.1 - (a.1 + t * aby))
}

/// Rasterize the two-lens frame: lens ellipses, bridge and temple arms,
/// all defined in the overlay's local frame.
pub fn draw_synthetic(image: &mut RgbaImage, t: &OverlayTransform, style: FrameStyle) {
    let (w, h) = (t.width, t.height);
    if !(w > 0.0 && h > 0.0) {
        return;
    }

    let lens_rx = w / 3.0;
    let lens_ry = h / 2.0;
    let lens_centers = [-w / 4.0, w / 4.0];
    let hw = STROKE_HALF_WIDTH;
    let segments = [
        ((-w / 12.0, 0.0), (w / 12.0, 0.0)),
        ((-w / 2.0 + TEMPLE_INSET, 0.0), (-w / 2.0 - TEMPLE_REACH, TEMPLE_DROP)),
        ((w / 2.0 - TEMPLE_INSET, 0.0), (w / 2.0 + TEMPLE_REACH, TEMPLE_DROP)),
    ];

    let reach = (w / 2.0 + TEMPLE_REACH + hw).hypot(h / 2.0 + TEMPLE_DROP + hw);
    let (x0, x1, y0, y1) = clip_box(image, t.center_x, t.center_y, reach);

    for y in y0..y1 {
        for x in x0..x1 {
            let local = t.to_local(x as f64 + 0.5, y as f64 + 0.5);

            let on_lens_rim = lens_centers.iter().any(|&cx| {
                ellipse_value(local.0, local.1, cx, lens_rx + hw, lens_ry + hw) <= 1.0
                    && (lens_rx <= hw
                        || lens_ry <= hw
                        || ellipse_value(local.0, local.1, cx, lens_rx - hw, lens_ry - hw) > 1.0)
            });
            let on_segment = segments
                .iter()
                .any(|&(a, b)| segment_distance(local, a, b) <= hw);

            let color = if on_lens_rim || on_segment {
                style.stroke
            } else if lens_centers
                .iter()
                .any(|&cx| ellipse_value(local.0, local.1, cx, lens_rx, lens_ry) <= 1.0)
            {
                style.fill
            } else {
                continue;
            };
            image.get_pixel_mut(x, y).blend(&color);
        }
    }
}

/// Bilinear RGBA sample with edge clamping.
fn sample_bilinear(src: &RgbaImage, sx: f64, sy: f64) -> Rgba<u8> {
    let max_x = src.width() as i64 - 1;
    let max_y = src.height() as i64 - 1;
    let x0f = sx.floor();
    let y0f = sy.floor();
    let fx = sx - x0f;
    let fy = sy - y0f;
    let x0 = (x0f as i64).clamp(0, max_x) as u32;
    let y0 = (y0f as i64).clamp(0, max_y) as u32;
    let x1 = (x0f as i64 + 1).clamp(0, max_x) as u32;
    let y1 = (y0f as i64 + 1).clamp(0, max_y) as u32;

    let tl = src.get_pixel(x0, y0).0;
    let tr = src.get_pixel(x1, y0).0;
    let bl = src.get_pixel(x0, y1).0;
    let br = src.get_pixel(x1, y1).0;

    let mut out = [0u8; 4];
    for c in 0..4 {
        let v = tl[c] as f64 * (1.0 - fx) * (1.0 - fy)
            + tr[c] as f64 * fx * (1.0 - fy)
            + bl[c] as f64 * (1.0 - fx) * fy
            + br[c] as f64 * fx * fy;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

/// Composite a bitmap scaled to `width × height`, rotated and centred per
/// the transform. Source alpha is respected.
pub fn composite_bitmap(image: &mut RgbaImage, bitmap: &RgbaImage, t: &OverlayTransform) {
    let (w, h) = (t.width, t.height);
    if !(w > 0.0 && h > 0.0) || bitmap.width() == 0 || bitmap.height() == 0 {
        return;
    }
    let scale_x = bitmap.width() as f64 / w;
    let scale_y = bitmap.height() as f64 / h;

    let reach = (w / 2.0).hypot(h / 2.0);
    let (x0, x1, y0, y1) = clip_box(image, t.center_x, t.center_y, reach);

    for y in y0..y1 {
        for x in x0..x1 {
            let (lx, ly) = t.to_local(x as f64 + 0.5, y as f64 + 0.5);
            if lx.abs() > w / 2.0 || ly.abs() > h / 2.0 {
                continue;
            }
            let sx = (lx + w / 2.0) * scale_x - 0.5;
            let sy = (ly + h / 2.0) * scale_y - 0.5;
            let color = sample_bilinear(bitmap, sx, sy);
            image.get_pixel_mut(x, y).blend(&color);
        }
    }
}

/// Decode an uploaded image (any format the `image` crate recognizes).
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, RenderError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| RenderError::Decode(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(RenderError::Decode("image dimensions are zero".into()));
    }
    Ok(decoded.into_rgba8())
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}
