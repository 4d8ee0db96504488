//! Orders tab: listing and fulfilment status.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use shopfront_core::order::Order;
use shopfront_core::{OrderId, OrderStatus, Page, PageQuery, PageRequest};

use crate::db::OrderRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::services::OrderListKey;
use crate::state::AppState;

/// Query parameters for the order listing.
#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl OrderListQuery {
    fn key(&self) -> Result<OrderListKey> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("" | "all") => None,
            Some(s) => Some(parse_status(s)?),
        };
        let page: PageRequest = PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
        .into();
        Ok(OrderListKey { status, page })
    }
}

/// Body of a status change.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

fn parse_status(s: &str) -> Result<OrderStatus> {
    s.parse().map_err(AppError::BadRequest)
}

/// List orders, newest first. Pages are served from a 60 second cache.
#[instrument(skip(state, _admin))]
pub async fn index(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Page<Order>>> {
    let key = query.key()?;
    let pool = state.pool();

    let page = state
        .orders()
        .get_or_load(key, || async move {
            OrderRepository::new(pool).list(key.status, key.page).await
        })
        .await?;

    Ok(Json(page.as_ref().clone()))
}

/// Show one order with its items.
#[instrument(skip(state, _admin))]
pub async fn show(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(id): Path<i32>,
) -> Result<Json<Order>> {
    OrderRepository::new(state.pool())
        .get(OrderId::new(id))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Order".to_owned()))
}

/// Move an order along its lifecycle. Cancelling restocks its items.
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, status = %body.status))]
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i32>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<Order>> {
    let next = parse_status(body.status.trim())?;
    let order = OrderRepository::new(state.pool())
        .update_status(OrderId::new(id), next)
        .await?;
    state.orders().invalidate_all();

    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        status = %order.status,
        "Order status changed"
    );
    Ok(Json(order))
}
