//! Contracts with the product catalog and the cart, plus the product
//! carousel used to step through eyewear during a try-on.

use crate::types::{Category, Product};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog file not found: {0}")]
    NotFound(String),
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Inclusive price bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn contains(&self, price: f64) -> bool {
        price >= self.min && price <= self.max
    }
}

/// Catalog query. Every unset field matches all products.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductFilter {
    pub category: Option<Category>,
    pub brand: Option<String>,
    pub price_range: Option<PriceRange>,
    pub shapes: Option<BTreeSet<String>>,
    pub frame_types: Option<BTreeSet<String>>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if self.category.is_some_and(|c| c != product.category) {
            return false;
        }
        if self.brand.as_ref().is_some_and(|b| *b != product.brand) {
            return false;
        }
        if self.price_range.is_some_and(|r| !r.contains(product.price)) {
            return false;
        }
        if self
            .shapes
            .as_ref()
            .is_some_and(|s| !s.contains(&product.shape))
        {
            return false;
        }
        if self
            .frame_types
            .as_ref()
            .is_some_and(|f| !f.contains(&product.frame_type))
        {
            return false;
        }
        true
    }
}

/// Read side of the external product catalog.
pub trait ProductCatalog {
    fn query(&self, filter: &ProductFilter) -> Result<Vec<Product>, CatalogError>;

    /// All eyeglasses and sunglasses, in catalog order.
    fn eyewear(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(self
            .query(&ProductFilter::default())?
            .into_iter()
            .filter(Product::is_eyewear)
            .collect())
    }
}

/// Write side of the external cart. Fire-and-forget: implementations must
/// not block and callers never wait on or retry the result.
pub trait Cart: Send + Sync {
    fn add_item(&self, product_id: &str);
}

/// Catalog backed by a JSON array of products on disk.
pub struct JsonCatalog {
    products: Vec<Product>,
}

impl JsonCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            return Err(CatalogError::NotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&raw)?;
        tracing::info!(
            path = %path.display(),
            products = catalog.products.len(),
            "loaded catalog"
        );
        Ok(catalog)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        Ok(Self {
            products: serde_json::from_str(raw)?,
        })
    }
}

impl ProductCatalog for JsonCatalog {
    fn query(&self, filter: &ProductFilter) -> Result<Vec<Product>, CatalogError> {
        Ok(self
            .products
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }
}

/// Cursor over a product list with wrap-around stepping.
#[derive(Debug, Clone)]
pub struct ProductCarousel {
    products: Vec<Product>,
    selected: usize,
}

impl ProductCarousel {
    /// Starts on the first product. Returns `None` for an empty list.
    pub fn new(products: Vec<Product>) -> Option<Self> {
        if products.is_empty() {
            return None;
        }
        Some(Self {
            products,
            selected: 0,
        })
    }

    pub fn current(&self) -> &Product {
        &self.products[self.selected]
    }

    pub fn next(&mut self) -> &Product {
        self.selected = (self.selected + 1) % self.products.len();
        self.current()
    }

    pub fn prev(&mut self) -> &Product {
        self.selected = self
            .selected
            .checked_sub(1)
            .unwrap_or(self.products.len() - 1);
        self.current()
    }

    /// Jump to a product by id. Leaves the selection unchanged if absent.
    pub fn select(&mut self, id: &str) -> Option<&Product> {
        let pos = self.products.iter().position(|p| p.id == id)?;
        self.selected = pos;
        Some(self.current())
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        {"id": "p1", "name": "Classic Aviator", "image": "p1.png", "category": "sunglasses",
         "shape": "Aviator", "price": 129.99, "brand": "VisionHub", "frameType": "Metal"},
        {"id": "p2", "name": "Modern Rectangle", "image": "p2.png", "category": "eyeglasses",
         "shape": "Rectangle", "price": 89.99, "brand": "VisionHub Pro", "frameType": "Acetate"},
        {"id": "p3", "name": "Daily Contacts", "image": "p3.png", "category": "contacts",
         "shape": "", "price": 29.99, "brand": "ClearView"},
        {"id": "p4", "name": "Round Vintage", "image": "p4.png", "category": "eyeglasses",
         "shape": "Round", "price": 79.99, "brand": "Retro Vision", "frameType": "Metal"}
    ]"#;

    #[test]
    fn test_eyewear_excludes_contacts() {
        let catalog = JsonCatalog::from_json(CATALOG).unwrap();
        let ids: Vec<String> = catalog.eyewear().unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["p1", "p2", "p4"]);
    }

    #[test]
    fn test_filter_fields_combine() {
        let catalog = JsonCatalog::from_json(CATALOG).unwrap();
        let filter = ProductFilter {
            category: Some(Category::Eyeglasses),
            price_range: Some(PriceRange { min: 0.0, max: 85.0 }),
            ..Default::default()
        };
        let hits = catalog.query(&filter).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "p4");

        let filter = ProductFilter {
            frame_types: Some(["Metal".to_string()].into_iter().collect()),
            shapes: Some(["Aviator".to_string(), "Round".to_string()].into_iter().collect()),
            ..Default::default()
        };
        assert_eq!(catalog.query(&filter).unwrap().len(), 2);

        let filter = ProductFilter {
            brand: Some("VisionHub".into()),
            ..Default::default()
        };
        assert_eq!(catalog.query(&filter).unwrap()[0].id, "p1");
    }

    #[test]
    fn test_price_range_inclusive() {
        let r = PriceRange { min: 10.0, max: 20.0 };
        assert!(r.contains(10.0));
        assert!(r.contains(20.0));
        assert!(!r.contains(20.01));
    }

    #[test]
    fn test_malformed_catalog() {
        assert!(matches!(
            JsonCatalog::from_json("{not json"),
            Err(CatalogError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_catalog_file() {
        let err = JsonCatalog::load(Path::new("/nonexistent/catalog.json"));
        assert!(matches!(err, Err(CatalogError::NotFound(_))));
    }

    #[test]
    fn test_carousel_wraps() {
        let catalog = JsonCatalog::from_json(CATALOG).unwrap();
        let mut carousel = ProductCarousel::new(catalog.eyewear().unwrap()).unwrap();
        assert_eq!(carousel.current().id, "p1");
        assert_eq!(carousel.prev().id, "p4");
        assert_eq!(carousel.next().id, "p1");
        assert_eq!(carousel.next().id, "p2");
        assert_eq!(carousel.select("p4").unwrap().id, "p4");
        assert_eq!(carousel.next().id, "p1");
        assert!(carousel.select("missing").is_none());
        assert_eq!(carousel.current().id, "p1");
    }

    #[test]
    fn test_carousel_empty() {
        assert!(ProductCarousel::new(Vec::new()).is_none());
    }
}
