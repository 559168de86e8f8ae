//! Frame style recommendations per face shape.

use crate::types::{FaceShape, Product};

const OVAL: &[&str] = &["Rectangle", "Aviator", "Square", "Cat-Eye", "Wayfarer"];
const ROUND: &[&str] = &["Rectangle", "Square", "Geometric", "Angular"];
const SQUARE: &[&str] = &["Round", "Oval", "Aviator", "Cat-Eye"];
const HEART: &[&str] = &["Aviator", "Cat-Eye", "Round", "Oval", "Rimless"];

/// Frame shape tags that suit a face shape, most flattering first.
pub fn recommended_shapes(face: FaceShape) -> &'static [&'static str] {
    match face {
        FaceShape::Oval => OVAL,
        FaceShape::Round => ROUND,
        FaceShape::Square => SQUARE,
        FaceShape::Heart => HEART,
    }
}

/// Whether a product's shape tag is recommended for the face shape.
pub fn is_recommended(face: FaceShape, product: &Product) -> bool {
    recommended_shapes(face).contains(&product.shape.as_str())
}

/// Keep only recommended products. Catalog order is preserved.
pub fn filter_recommended(face: FaceShape, products: &[Product]) -> Vec<&Product> {
    products
        .iter()
        .filter(|p| is_recommended(face, p))
        .collect()
}

/// The product list shown to the user: everything, or the recommended
/// subset when the "recommended only" toggle is on and a shape is known.
pub fn visible_products(
    face: Option<FaceShape>,
    recommended_only: bool,
    products: &[Product],
) -> Vec<&Product> {
    match face {
        Some(face) if recommended_only => filter_recommended(face, products),
        _ => products.iter().collect(),
    }
}
