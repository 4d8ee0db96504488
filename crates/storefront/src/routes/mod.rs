//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! # Catalog
//! GET    /api/products                      - Product listing (?category=&q=&page=&per_page=)
//! GET    /api/products/{id}                 - Product detail
//! GET    /api/categories                    - Category names
//!
//! # Cart
//! GET    /api/cart                          - Priced cart
//! DELETE /api/cart                          - Empty the cart
//! POST   /api/cart/items                    - Add a product
//! PUT    /api/cart/items/{product_id}       - Set quantity
//! DELETE /api/cart/items/{product_id}       - Remove a line
//!
//! # Auth (strict rate limit)
//! POST   /api/auth/register                 - Create account and sign in
//! POST   /api/auth/login                    - Sign in
//! POST   /api/auth/logout                   - Sign out
//! GET    /api/auth/session                  - Current sign-in or 401
//! POST   /api/auth/forgot-password          - Email a reset link
//! POST   /api/auth/reset-password           - Set a new password
//!
//! # Checkout
//! GET    /api/checkout                      - Wizard state
//! POST   /api/checkout/verification         - Email a code (rate limited)
//! POST   /api/checkout/verification/confirm - Check a code (rate limited)
//! PUT    /api/checkout/identity             - Step 1
//! PUT    /api/checkout/shipping             - Step 2
//! POST   /api/checkout/review               - Step 3
//! PUT    /api/checkout/payment              - Step 4
//! POST   /api/checkout/back                 - Return to an earlier step
//! POST   /api/checkout/submit               - Place the order
//!
//! # Orders
//! GET    /api/orders                        - Signed-in customer's orders
//! GET    /api/orders/{order_number}         - Track an order (?email=)
//! GET    /orders/{order_number}/invoice     - HTML receipt (?email=)
//! ```

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod orders;
pub mod products;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::middleware::{api_rate_limiter, auth_rate_limiter, verification_rate_limiter};
use crate::state::AppState;

/// Create the catalog routes router.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(products::index))
        .route("/products/{id}", get(products::show))
        .route("/categories", get(products::categories))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add))
        .route(
            "/items/{product_id}",
            put(cart::update).delete(cart::remove),
        )
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    let limited = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .route_layer(auth_rate_limiter());

    Router::new()
        .route("/logout", post(auth::logout))
        .route("/session", get(auth::session))
        .merge(limited)
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    let verification = Router::new()
        .route("/verification", post(checkout::send_verification))
        .route("/verification/confirm", post(checkout::confirm_verification))
        .route_layer(verification_rate_limiter());

    Router::new()
        .route("/", get(checkout::show))
        .route("/identity", put(checkout::identity))
        .route("/shipping", put(checkout::shipping))
        .route("/review", post(checkout::review))
        .route("/payment", put(checkout::payment))
        .route("/back", post(checkout::back))
        .route("/submit", post(checkout::submit))
        .merge(verification)
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/{order_number}", get(orders::show))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest(
            "/api",
            catalog_routes()
                .nest("/cart", cart_routes())
                .nest("/auth", auth_routes())
                .nest("/checkout", checkout_routes())
                .nest("/orders", order_routes())
                .layer(api_rate_limiter()),
        )
        .route("/orders/{order_number}/invoice", get(orders::invoice))
}
