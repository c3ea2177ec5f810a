//! YAML catalog seeds.
//!
//! ```yaml
//! products:
//!   - id: 1
//!     name: Cotton Tee
//!     price: "10.00"
//!     stock: { quantity: 25 }
//!   - id: 2
//!     name: Hoodie
//!     price: "45.00"
//!     kind: variable
//! variations:
//!   - id: 21
//!     product_id: 2
//!     price: "45.00"
//!     attributes: { size: m }
//! coupons:
//!   - code: SAVE10
//!     kind: percent
//!     amount: 10
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::models::{Coupon, Product, ProductKind, Variation};

/// Errors loading a seed file.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse seed file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{} seed validation errors: {}", .0.len(), .0.join("; "))]
    Invalid(Vec<String>),
}

/// Products, variations and coupons to load into a store.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogSeed {
    pub products: Vec<Product>,
    pub variations: Vec<Variation>,
    pub coupons: Vec<Coupon>,
}

impl CatalogSeed {
    /// Parse and validate a seed document.
    ///
    /// # Errors
    ///
    /// Returns `SeedError::Yaml` for malformed YAML and `SeedError::Invalid`
    /// listing every consistency problem found.
    pub fn parse(yaml: &str) -> Result<Self, SeedError> {
        let seed: Self = serde_yaml::from_str(yaml)?;
        let errors = seed.validate();
        if errors.is_empty() {
            Ok(seed)
        } else {
            Err(SeedError::Invalid(errors))
        }
    }

    /// Read, parse and validate a seed file.
    ///
    /// # Errors
    ///
    /// Returns `SeedError` if the file cannot be read or is invalid.
    pub async fn load(path: &Path) -> Result<Self, SeedError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Consistency problems, empty when the seed is usable.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let mut product_ids = HashSet::new();
        for product in &self.products {
            if !product_ids.insert(product.id) {
                errors.push(format!("duplicate product id {}", product.id));
            }
            if product.name.trim().is_empty() {
                errors.push(format!("product {} has no name", product.id));
            }
        }

        let mut variation_ids = HashSet::new();
        for variation in &self.variations {
            if !variation_ids.insert(variation.id) {
                errors.push(format!("duplicate variation id {}", variation.id));
            }
            match self.products.iter().find(|p| p.id == variation.product_id) {
                None => errors.push(format!(
                    "variation {} references unknown product {}",
                    variation.id, variation.product_id
                )),
                Some(parent) if parent.kind != ProductKind::Variable => errors.push(format!(
                    "variation {} belongs to non-variable product {}",
                    variation.id, parent.id
                )),
                Some(_) => {}
            }
        }

        let mut codes = HashSet::new();
        for coupon in &self.coupons {
            let code = Coupon::normalize_code(&coupon.code);
            if code.is_empty() {
                errors.push("coupon with empty code".to_owned());
            } else if !codes.insert(code.clone()) {
                errors.push(format!("duplicate coupon code {code}"));
            }
        }

        errors
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ecommerce_api_core::Money;

    use super::*;

    const SEED: &str = r#"
products:
  - id: 1
    name: Cotton Tee
    price: "10.00"
    stock: { quantity: 25 }
  - id: 2
    name: Hoodie
    price: 45
    kind: variable
variations:
  - id: 21
    product_id: 2
    price: "47.50"
    attributes: { size: m }
coupons:
  - code: SAVE10
    kind: percent
    amount: 10
"#;

    #[test]
    fn test_parse_seed() {
        let seed = CatalogSeed::parse(SEED).unwrap();
        assert_eq!(seed.products.len(), 2);
        assert_eq!(seed.products[0].price, Money::from_cents(1000));
        assert_eq!(seed.products[0].stock.quantity, Some(25));
        assert!(seed.products[0].purchasable);
        assert_eq!(seed.variations[0].attributes.get("size").unwrap(), "m");
    }

    #[test]
    fn test_rejects_orphan_variation() {
        let yaml = r#"
products:
  - { id: 1, name: Tee, price: "10.00" }
variations:
  - { id: 5, product_id: 1, price: "10.00" }
  - { id: 6, product_id: 9, price: "10.00" }
"#;
        let Err(SeedError::Invalid(errors)) = CatalogSeed::parse(yaml) else {
            panic!("expected validation failure");
        };
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("non-variable"));
        assert!(errors[1].contains("unknown product 9"));
    }
}
