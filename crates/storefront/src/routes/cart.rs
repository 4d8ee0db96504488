//! Cart route handlers.
//!
//! Every mutation responds with the updated priced cart.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use shopfront_core::ProductId;
use shopfront_core::cart::PricedCart;

use crate::error::{Result, add_breadcrumb};
use crate::middleware::OptionalAuth;
use crate::services::cart::CartService;
use crate::state::AppState;

/// Body of `POST /api/cart/items`.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: i32,
    #[serde(default = "one")]
    pub quantity: u32,
}

const fn one() -> u32 {
    1
}

/// Body of `PUT /api/cart/items/{product_id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

/// Show the cart with current prices.
#[instrument(skip(state, session, user))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<PricedCart>> {
    let carts = CartService::new(state.pool(), &session, user.map(|u| u.id));
    Ok(Json(carts.priced().await?))
}

/// Add a product to the cart.
#[instrument(skip(state, session, user))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(body): Json<AddItemRequest>,
) -> Result<Json<PricedCart>> {
    let carts = CartService::new(state.pool(), &session, user.map(|u| u.id));
    let cart = carts
        .add(ProductId::new(body.product_id), body.quantity)
        .await?;

    add_breadcrumb(
        "cart",
        "Added to cart",
        &[
            ("product_id", body.product_id.to_string()),
            ("quantity", body.quantity.to_string()),
        ],
    );
    Ok(Json(cart))
}

/// Change the quantity of a cart line.
#[instrument(skip(state, session, user))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(product_id): Path<i32>,
    Json(body): Json<UpdateItemRequest>,
) -> Result<Json<PricedCart>> {
    let carts = CartService::new(state.pool(), &session, user.map(|u| u.id));
    let cart = carts
        .set_quantity(ProductId::new(product_id), body.quantity)
        .await?;
    Ok(Json(cart))
}

/// Remove a cart line.
#[instrument(skip(state, session, user))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(product_id): Path<i32>,
) -> Result<Json<PricedCart>> {
    let carts = CartService::new(state.pool(), &session, user.map(|u| u.id));
    Ok(Json(carts.remove(ProductId::new(product_id)).await?))
}

/// Empty the cart.
#[instrument(skip(state, session, user))]
pub async fn clear(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<StatusCode> {
    CartService::new(state.pool(), &session, user.map(|u| u.id))
        .clear()
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
