//! Checkout wizard route handlers.
//!
//! Four steps in order: identity, shipping, review, payment. Every handler
//! answers with the refreshed [`CheckoutView`]. Guests must verify their
//! email with a one-time code before the identity step is accepted;
//! signed-in customers using their account email skip that.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use shopfront_core::cart::PricedCart;
use shopfront_core::checkout::{CheckoutError, CheckoutSession, CheckoutStep, Identity};
use shopfront_core::order::ShippingAddress;
use shopfront_core::{Email, Money, PaymentMethod};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::OptionalAuth;
use crate::models::CurrentUser;
use crate::services::cart::CartService;
use crate::services::checkout::{self, PlaceOrderContext, PlacedOrder};
use crate::state::AppState;

// =============================================================================
// Request / Response Types
// =============================================================================

/// Snapshot of the wizard for the client.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutView {
    pub step: CheckoutStep,
    pub verified_email: Option<Email>,
    pub identity: Option<Identity>,
    pub shipping: Option<ShippingAddress>,
    pub reviewed: bool,
    pub payment_method: Option<PaymentMethod>,
    pub cart: PricedCart,
    pub shipping_cost: Money,
    pub total: Money,
}

/// Body of `POST /api/checkout/verification`.
#[derive(Debug, Deserialize)]
pub struct VerificationRequest {
    pub email: String,
}

/// Body of `POST /api/checkout/verification/confirm`.
#[derive(Debug, Deserialize)]
pub struct ConfirmVerificationRequest {
    pub email: String,
    pub code: String,
}

/// Body of `PUT /api/checkout/identity`.
#[derive(Debug, Deserialize)]
pub struct IdentityRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Body of `PUT /api/checkout/payment`.
#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub method: PaymentMethod,
}

/// Body of `POST /api/checkout/back`.
#[derive(Debug, Deserialize)]
pub struct BackRequest {
    pub step: CheckoutStep,
}

fn parse_email(raw: &str) -> std::result::Result<Email, CheckoutError> {
    Email::parse(raw).map_err(|_| CheckoutError::InvalidField {
        field: "email",
        reason: "is not a valid email address",
    })
}

// =============================================================================
// Helpers
// =============================================================================

fn view(state: &AppState, checkout: &CheckoutSession, cart: PricedCart) -> CheckoutView {
    let shipping_cost = state.config().shipping.cost_for(&cart);
    CheckoutView {
        step: checkout.current_step(),
        verified_email: checkout.verified_email().cloned(),
        identity: checkout.identity().cloned(),
        shipping: checkout.shipping().cloned(),
        reviewed: checkout.is_reviewed(),
        payment_method: checkout.payment_method(),
        total: cart.subtotal + shipping_cost,
        shipping_cost,
        cart,
    }
}

/// Load the wizard and cart, apply `change`, and store the wizard again.
///
/// The wizard is stored even when `change` fails, since a failed payment
/// step can still move the shopper back to review.
async fn update<F>(
    state: &AppState,
    session: &Session,
    user: Option<&CurrentUser>,
    change: F,
) -> Result<Json<CheckoutView>>
where
    F: FnOnce(&mut CheckoutSession, &PricedCart) -> std::result::Result<(), CheckoutError>,
{
    let mut wizard = checkout::load(session).await?;
    let cart = CartService::new(state.pool(), session, user.map(|u| u.id))
        .priced()
        .await?;

    let outcome = change(&mut wizard, &cart);
    checkout::save(session, &wizard).await?;
    outcome?;

    Ok(Json(view(state, &wizard, cart)))
}

// =============================================================================
// Handlers
// =============================================================================

/// Current step and everything collected so far.
#[instrument(skip(state, session, user))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<CheckoutView>> {
    let wizard = checkout::load(&session).await?;
    let cart = CartService::new(state.pool(), &session, user.as_ref().map(|u| u.id))
        .priced()
        .await?;
    Ok(Json(view(&state, &wizard, cart)))
}

/// Email a verification code to a guest.
#[instrument(skip(state, body))]
pub async fn send_verification(
    State(state): State<AppState>,
    Json(body): Json<VerificationRequest>,
) -> Result<StatusCode> {
    let email = parse_email(&body.email)?;
    checkout::send_verification_code(
        state.pool(),
        &state.config().session_secret,
        state.email(),
        &email,
    )
    .await?;
    Ok(StatusCode::ACCEPTED)
}

/// Check a verification code and remember the email as verified.
#[instrument(skip(state, session, user, body))]
pub async fn confirm_verification(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(body): Json<ConfirmVerificationRequest>,
) -> Result<Json<CheckoutView>> {
    let email = parse_email(&body.email)?;
    checkout::confirm_verification_code(
        state.pool(),
        &state.config().session_secret,
        &email,
        &body.code,
    )
    .await?;

    update(&state, &session, user.as_ref(), |wizard, _| {
        wizard.mark_email_verified(email);
        Ok(())
    })
    .await
}

/// Submit who is buying.
#[instrument(skip(state, session, user, body))]
pub async fn identity(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(body): Json<IdentityRequest>,
) -> Result<Json<CheckoutView>> {
    let identity = Identity {
        name: body.name,
        email: parse_email(&body.email)?,
        phone: body.phone,
    };
    let account_email = user.as_ref().map(|u| u.email.clone());

    update(&state, &session, user.as_ref(), |wizard, _| {
        wizard.submit_identity(identity, account_email.as_ref())
    })
    .await
}

/// Submit the shipping address.
#[instrument(skip(state, session, user, address))]
pub async fn shipping(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(address): Json<ShippingAddress>,
) -> Result<Json<CheckoutView>> {
    update(&state, &session, user.as_ref(), |wizard, _| {
        wizard.submit_shipping(address)
    })
    .await
}

/// Confirm the order summary.
///
/// Lines that exceed current stock are rejected here rather than at submit.
#[instrument(skip(state, session, user))]
pub async fn review(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<CheckoutView>> {
    let cart = CartService::new(state.pool(), &session, user.as_ref().map(|u| u.id))
        .priced()
        .await?;
    if let Some((_, shortfall)) = cart.stock_shortfalls().into_iter().next() {
        return Err(AppError::from(shortfall));
    }

    update(&state, &session, user.as_ref(), |wizard, cart| {
        wizard.confirm_review(cart)
    })
    .await
}

/// Choose a payment method.
#[instrument(skip(state, session, user))]
pub async fn payment(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(body): Json<PaymentRequest>,
) -> Result<Json<CheckoutView>> {
    update(&state, &session, user.as_ref(), |wizard, cart| {
        wizard.submit_payment(body.method, cart)
    })
    .await
}

/// Return to an earlier step.
#[instrument(skip(state, session, user))]
pub async fn back(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Json(body): Json<BackRequest>,
) -> Result<Json<CheckoutView>> {
    update(&state, &session, user.as_ref(), |wizard, _| {
        wizard.go_to(body.step)
    })
    .await
}

/// Place the order.
#[instrument(skip(state, session, user))]
pub async fn submit(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> Result<(StatusCode, Json<PlacedOrder>)> {
    let ctx = PlaceOrderContext {
        pool: state.pool(),
        shipping: &state.config().shipping,
        email_service: state.email(),
        base_url: &state.config().base_url,
    };
    let placed = checkout::place_order(&ctx, &session, user.as_ref()).await?;
    state.catalog().invalidate_all();

    add_breadcrumb(
        "checkout",
        "Order placed",
        &[("order_number", placed.order.order_number.clone())],
    );
    Ok((StatusCode::CREATED, Json(placed)))
}
