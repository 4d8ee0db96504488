//! Catalog route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use shopfront_core::catalog::Product;
use shopfront_core::{PageQuery, PageRequest, ProductId};

use crate::db::products::ProductFilter;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Query parameters for the product listing.
#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub category: Option<String>,
    pub q: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ProductListQuery {
    fn filter(&self) -> ProductFilter {
        ProductFilter {
            category: non_blank(self.category.as_deref()),
            search: non_blank(self.q.as_deref()),
        }
    }

    fn page_request(&self) -> PageRequest {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
        .into()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// List products, optionally filtered by category and search term.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<shopfront_core::Page<Product>>> {
    let page = state
        .catalog()
        .products(state.pool(), query.filter(), query.page_request())
        .await?;
    Ok(Json(page.as_ref().clone()))
}

/// Show one product.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Product>> {
    state
        .catalog()
        .product(state.pool(), ProductId::new(id))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Product not found".to_owned()))
}

/// List category names.
#[instrument(skip(state))]
pub async fn categories(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    let categories = state.catalog().categories(state.pool()).await?;
    Ok(Json(categories.as_ref().clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_filters_are_ignored() {
        let query = ProductListQuery {
            category: Some("  ".to_owned()),
            q: Some(" mug ".to_owned()),
            ..ProductListQuery::default()
        };
        let filter = query.filter();
        assert_eq!(filter.category, None);
        assert_eq!(filter.search.as_deref(), Some("mug"));
    }

    #[test]
    fn test_default_paging() {
        let request = ProductListQuery::default().page_request();
        assert_eq!(request.page(), 1);
        assert_eq!(request.per_page(), PageRequest::DEFAULT_PER_PAGE);
    }
}
