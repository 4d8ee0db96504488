//! Overview tab: revenue, top sellers and stock warnings.

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use shopfront_core::analytics::{DEFAULT_TOP_PRODUCTS, DashboardSummary, DateRange, summarize};
use shopfront_core::catalog::Product;

use crate::db::{OrderRepository, ProductRepository, UserRepository, to_u64};
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// Products with this many units or fewer are reported as low on stock.
pub const LOW_STOCK_THRESHOLD: u32 = 5;

const DEFAULT_DAYS: u32 = 30;
const MAX_DAYS: u32 = 365;

/// Query parameters for the overview.
#[derive(Debug, Default, Deserialize)]
pub struct OverviewQuery {
    pub days: Option<u32>,
}

impl OverviewQuery {
    fn days(&self) -> u32 {
        self.days.unwrap_or(DEFAULT_DAYS).clamp(1, MAX_DAYS)
    }
}

/// Everything the overview tab shows.
#[derive(Debug, Serialize)]
pub struct Overview {
    #[serde(flatten)]
    pub summary: DashboardSummary,
    pub product_count: u64,
    pub user_count: u64,
    pub low_stock: Vec<Product>,
}

/// Aggregate the orders of the last `days` days (default 30).
#[instrument(skip(state, _admin))]
pub async fn show(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(query): Query<OverviewQuery>,
) -> Result<Json<Overview>> {
    let pool = state.pool();
    let range = DateRange::last_days(Utc::now().date_naive(), query.days());

    let orders = OrderRepository::new(pool).snapshots(range).await?;
    let products = ProductRepository::new(pool);

    Ok(Json(Overview {
        summary: summarize(&orders, range, DEFAULT_TOP_PRODUCTS),
        product_count: to_u64(products.count().await?),
        user_count: to_u64(UserRepository::new(pool).count().await?),
        low_stock: products.low_stock(LOW_STOCK_THRESHOLD).await?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_defaults_and_clamps() {
        assert_eq!(OverviewQuery::default().days(), 30);
        assert_eq!(OverviewQuery { days: Some(0) }.days(), 1);
        assert_eq!(OverviewQuery { days: Some(7) }.days(), 7);
        assert_eq!(OverviewQuery { days: Some(10_000) }.days(), MAX_DAYS);
    }
}
