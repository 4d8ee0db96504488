//! Seed the catalog from a YAML file.
//!
//! ```yaml
//! products:
//!   - name: Enamel Mug
//!     description: Holds 350 ml.
//!     price: "14.00"
//!     stock: 40
//!     category: Kitchen
//!     images:
//!       - https://cdn.example.com/mug.jpg
//! ```
//!
//! Products whose name and category already exist are skipped, so the same
//! file can be applied repeatedly.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use shopfront_admin::db::{ProductRepository, RepositoryError};
use shopfront_core::catalog::{ProductInput, ProductValidationError};

use super::{ConnectError, connect};

/// A catalog seed file.
#[derive(Debug, Deserialize)]
pub struct CatalogSeed {
    pub products: Vec<ProductInput>,
}

/// Errors that can occur while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Could not read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid seed file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Product #{index}: {source}")]
    Invalid {
        index: usize,
        source: ProductValidationError,
    },

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Parse and validate a seed file's contents.
fn parse(content: &str) -> Result<Vec<ProductInput>, SeedError> {
    let seed: CatalogSeed = serde_yaml::from_str(content)?;
    seed.products
        .into_iter()
        .enumerate()
        .map(|(i, input)| {
            input
                .normalized()
                .map_err(|source| SeedError::Invalid { index: i + 1, source })
        })
        .collect()
}

/// Insert every product in `file_path` that isn't in the catalog yet.
///
/// The whole file is validated before anything is written.
///
/// # Errors
///
/// Returns an error if the file is missing or invalid, or a query fails.
pub async fn catalog(file_path: &str) -> Result<(), SeedError> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(SeedError::FileNotFound(file_path.to_owned()));
    }

    info!(path = %file_path, "Loading catalog seed");
    let content = tokio::fs::read_to_string(path).await?;
    let products = parse(&content)?;
    info!(products = products.len(), "Seed file validated");

    let pool = connect().await?;
    let repo = ProductRepository::new(&pool);

    let mut created = 0_usize;
    let mut skipped = 0_usize;
    for input in &products {
        if repo.exists(&input.name, &input.category).await? {
            warn!(name = %input.name, category = %input.category, "Already in catalog, skipping");
            skipped += 1;
            continue;
        }
        let product = repo.create(input).await?;
        info!(product_id = %product.id, name = %product.name, "Product created");
        created += 1;
    }

    info!(created, skipped, "Catalog seeding complete");
    Ok(())
}
