//! HTTP route handlers for admin.
//!
//! # Route Structure
//!
//! ```text
//! # Auth
//! POST   /api/auth/login             - Sign in (admin role required)
//! POST   /api/auth/logout            - Sign out
//! GET    /api/auth/session           - Current sign-in or 401
//!
//! # Overview
//! GET    /api/overview               - Revenue, top sellers, low stock (?days=)
//!
//! # Products
//! GET    /api/products               - Product listing (?category=&page=&per_page=)
//! POST   /api/products               - Add a product
//! GET    /api/products/{id}          - Product detail
//! PUT    /api/products/{id}          - Replace a product
//! DELETE /api/products/{id}          - Delete a product
//!
//! # Orders
//! GET    /api/orders                 - Order listing, cached 60s (?status=&page=&per_page=)
//! GET    /api/orders/{id}            - Order detail
//! PATCH  /api/orders/{id}/status     - Change status
//!
//! # Users
//! GET    /api/users                  - Account listing (?page=&per_page=)
//! PATCH  /api/users/{id}/role        - Grant or revoke admin
//! ```

pub mod auth;
pub mod orders;
pub mod overview;
pub mod products;
pub mod users;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/session", get(auth::session))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index).post(products::create))
        .route(
            "/{id}",
            get(products::show)
                .put(products::update)
                .delete(products::delete),
        )
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/{id}", get(orders::show))
        .route("/{id}/status", patch(orders::update_status))
}

/// Create the user routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(users::index))
        .route("/{id}/role", patch(users::update_role))
}

/// Create all routes for admin.
pub fn routes() -> Router<AppState> {
    Router::new().nest(
        "/api",
        Router::new()
            .route("/overview", get(overview::show))
            .nest("/auth", auth_routes())
            .nest("/products", product_routes())
            .nest("/orders", order_routes())
            .nest("/users", user_routes()),
    )
}
