//! Catalog types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Money, ProductId};

/// Maximum length of a product name.
pub const MAX_NAME_LENGTH: usize = 200;
/// Maximum length of a category name.
pub const MAX_CATEGORY_LENGTH: usize = 100;
/// Maximum number of images per product.
pub const MAX_IMAGES: usize = 20;

/// A product as exchanged with clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: u32,
    pub category: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether at least one unit can be sold.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// A product field failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ProductValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ProductValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Fields an admin supplies to create or replace a product.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Money,
    pub stock: u32,
    pub category: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl ProductInput {
    /// Trim text fields and check every constraint.
    ///
    /// # Errors
    ///
    /// Returns the first field that fails validation.
    pub fn normalized(mut self) -> Result<Self, ProductValidationError> {
        self.name = self.name.trim().to_owned();
        self.category = self.category.trim().to_owned();
        self.description = self.description.trim().to_owned();
        self.images = self
            .images
            .into_iter()
            .map(|url| url.trim().to_owned())
            .filter(|url| !url.is_empty())
            .collect();

        if self.name.is_empty() {
            return Err(ProductValidationError::new("name", "cannot be empty"));
        }
        if self.name.chars().count() > MAX_NAME_LENGTH {
            return Err(ProductValidationError::new(
                "name",
                format!("must be at most {MAX_NAME_LENGTH} characters"),
            ));
        }
        if self.category.is_empty() {
            return Err(ProductValidationError::new("category", "cannot be empty"));
        }
        if self.category.chars().count() > MAX_CATEGORY_LENGTH {
            return Err(ProductValidationError::new(
                "category",
                format!("must be at most {MAX_CATEGORY_LENGTH} characters"),
            ));
        }
        if self.price.is_negative() {
            return Err(ProductValidationError::new("price", "cannot be negative"));
        }
        if self.images.len() > MAX_IMAGES {
            return Err(ProductValidationError::new(
                "images",
                format!("at most {MAX_IMAGES} images are allowed"),
            ));
        }
        if let Some(bad) = self
            .images
            .iter()
            .find(|url| !(url.starts_with("https://") || url.starts_with('/')))
        {
            return Err(ProductValidationError::new(
                "images",
                format!("'{bad}' must be an https URL or a site-relative path"),
            ));
        }

        Ok(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input() -> ProductInput {
        ProductInput {
            name: "  Linen Shirt ".to_owned(),
            description: "Breathable".to_owned(),
            price: Money::from_cents(4500),
            stock: 12,
            category: " Apparel ".to_owned(),
            images: vec!["https://cdn.example.com/shirt.jpg".to_owned(), "  ".to_owned()],
        }
    }

    #[test]
    fn test_normalized_trims_fields() {
        let product = input().normalized().unwrap();
        assert_eq!(product.name, "Linen Shirt");
        assert_eq!(product.category, "Apparel");
        assert_eq!(product.images.len(), 1);
    }

    #[test]
    fn test_in_stock() {
        let input = input().normalized().unwrap();
        let mut product = Product {
            id: ProductId::new(1),
            name: input.name,
            description: input.description,
            price: input.price,
            stock: 1,
            category: input.category,
            images: input.images,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(product.in_stock());
        product.stock = 0;
        assert!(!product.in_stock());
    }

    #[test]
    fn test_rejects_empty_name() {
        let err = ProductInput {
            name: "   ".to_owned(),
            ..input()
        }
        .normalized()
        .unwrap_err();
        assert_eq!(err.field, "name");
    }

    #[test]
    fn test_rejects_negative_price() {
        let err = ProductInput {
            price: Money::from_cents(-1),
            ..input()
        }
        .normalized()
        .unwrap_err();
        assert_eq!(err.field, "price");
    }

    #[test]
    fn test_rejects_insecure_image_urls() {
        let err = ProductInput {
            images: vec!["http://cdn.example.com/a.jpg".to_owned()],
            ..input()
        }
        .normalized()
        .unwrap_err();
        assert_eq!(err.field, "images");
    }
}
