//! Checkout wizard persistence, guest email verification and order
//! placement.
//!
//! The wizard state (`CheckoutSession`) lives in the visitor's session under
//! [`session_keys::CHECKOUT`]. Placing the order happens in a single
//! database transaction; see [`OrderRepository::create`].

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;
use tower_sessions::Session;
use tracing::instrument;
use url::Url;

use shopfront_core::cart::PricedCart;
use shopfront_core::checkout::{CheckoutError, CheckoutSession, ShippingPolicy};
use shopfront_core::order::{self, Order};
use shopfront_core::Email;

use crate::db::orders::DUPLICATE_ORDER_NUMBER;
use crate::db::{OrderRepository, RepositoryError, TokenRepository};
use crate::models::{CurrentUser, session_keys};
use crate::services::cart::{CartService, CartServiceError};
use crate::services::email::{EmailError, EmailService};
use crate::services::tokens;

/// How long a verification code can be used.
pub const VERIFICATION_CODE_TTL: Duration = Duration::minutes(10);
/// Wrong guesses allowed per code.
pub const MAX_VERIFICATION_ATTEMPTS: i32 = 5;
/// Attempts at finding an unused order number.
const ORDER_NUMBER_ATTEMPTS: usize = 3;

/// Errors from checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutServiceError {
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Cart(#[from] CartServiceError),

    /// The code does not match the latest one sent.
    #[error("invalid verification code")]
    InvalidCode,

    /// The code is past its expiry.
    #[error("verification code has expired")]
    CodeExpired,

    /// Too many wrong guesses.
    #[error("too many attempts, request a new code")]
    TooManyAttempts,

    /// Stock ran out between review and submit.
    #[error("{0}")]
    OutOfStock(String),

    #[error("failed to send email: {0}")]
    Email(#[from] EmailError),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

/// Read the wizard state, starting a fresh one if absent.
///
/// # Errors
///
/// Returns an error if the session cannot be read.
pub async fn load(session: &Session) -> Result<CheckoutSession, tower_sessions::session::Error> {
    Ok(session
        .get::<CheckoutSession>(session_keys::CHECKOUT)
        .await?
        .unwrap_or_default())
}

/// Write the wizard state back to the session.
///
/// # Errors
///
/// Returns an error if the session cannot be written.
pub async fn save(
    session: &Session,
    checkout: &CheckoutSession,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CHECKOUT, checkout).await
}

/// Email a fresh verification code, replacing any earlier one.
///
/// # Errors
///
/// Returns an error if the code cannot be stored or the email fails.
#[instrument(skip(pool, server_secret, email_service), fields(email = %email))]
pub async fn send_verification_code(
    pool: &PgPool,
    server_secret: &SecretString,
    email_service: &EmailService,
    email: &Email,
) -> Result<(), CheckoutServiceError> {
    let code = tokens::generate_verification_code();
    let code_hash = tokens::hash_token(server_secret, &code);

    TokenRepository::new(pool)
        .create_verification_code(email, &code_hash, Utc::now() + VERIFICATION_CODE_TTL)
        .await?;

    email_service
        .send_verification_code(email.as_str(), &code, VERIFICATION_CODE_TTL.num_minutes())
        .await?;

    tracing::info!("Verification code sent");
    Ok(())
}

/// Check a verification code, consuming it on success.
///
/// # Errors
///
/// Returns `InvalidCode`, `CodeExpired` or `TooManyAttempts` when the code
/// is not accepted.
#[instrument(skip(pool, server_secret, code), fields(email = %email))]
pub async fn confirm_verification_code(
    pool: &PgPool,
    server_secret: &SecretString,
    email: &Email,
    code: &str,
) -> Result<(), CheckoutServiceError> {
    let repo = TokenRepository::new(pool);
    let stored = repo
        .active_verification_code(email)
        .await?
        .ok_or(CheckoutServiceError::InvalidCode)?;

    check_code_usable(stored.expires_at, stored.attempts, Utc::now())?;

    if tokens::hash_token(server_secret, code) != stored.code_hash {
        repo.record_failed_attempt(stored.id).await?;
        tracing::warn!(attempts = stored.attempts + 1, "Wrong verification code");
        return Err(CheckoutServiceError::InvalidCode);
    }

    repo.consume_verification_code(stored.id).await?;
    Ok(())
}

fn check_code_usable(
    expires_at: DateTime<Utc>,
    attempts: i32,
    now: DateTime<Utc>,
) -> Result<(), CheckoutServiceError> {
    if expires_at <= now {
        return Err(CheckoutServiceError::CodeExpired);
    }
    if attempts >= MAX_VERIFICATION_ATTEMPTS {
        return Err(CheckoutServiceError::TooManyAttempts);
    }
    Ok(())
}

/// A placed order and where its receipt can be viewed.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PlacedOrder {
    pub order: Order,
    pub receipt_url: String,
}

/// Everything `place_order` needs besides the visitor's session.
pub struct PlaceOrderContext<'a> {
    pub pool: &'a PgPool,
    pub shipping: &'a ShippingPolicy,
    pub email_service: &'a EmailService,
    pub base_url: &'a str,
}

/// Turn a completed checkout into an order.
///
/// On success the cart and the wizard state are cleared and a confirmation
/// email is sent. A failed email is logged, not returned.
///
/// # Errors
///
/// Returns `CheckoutError` variants while the wizard is incomplete or the
/// cart changed, and `OutOfStock` if stock ran out.
#[instrument(skip(ctx, session, user), fields(user_id = ?user.map(|u| u.id)))]
pub async fn place_order(
    ctx: &PlaceOrderContext<'_>,
    session: &Session,
    user: Option<&CurrentUser>,
) -> Result<PlacedOrder, CheckoutServiceError> {
    let mut checkout = load(session).await?;
    let user_id = user.map(|u| u.id);
    let cart_service = CartService::new(ctx.pool, session, user_id);
    let cart = cart_service.priced().await?;

    let draft = match checkout.ready_order(&cart, ctx.shipping) {
        Ok(draft) => draft,
        Err(CheckoutError::CartChanged) => {
            checkout.invalidate_review();
            save(session, &checkout).await?;
            return Err(CheckoutError::CartChanged.into());
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(message) = shortfall_message(&cart) {
        return Err(CheckoutServiceError::OutOfStock(message));
    }

    let repo = OrderRepository::new(ctx.pool);
    let mut attempt = 0;
    let order = loop {
        attempt += 1;
        let number = order::order_number(Utc::now(), &tokens::generate_order_suffix());
        match repo.create(user_id, &number, &draft).await {
            Ok(order) => break order,
            Err(RepositoryError::Conflict(message))
                if message == DUPLICATE_ORDER_NUMBER && attempt < ORDER_NUMBER_ATTEMPTS =>
            {
                tracing::warn!(order_number = %number, "Order number collision, retrying");
            }
            Err(RepositoryError::Conflict(message)) if message != DUPLICATE_ORDER_NUMBER => {
                return Err(CheckoutServiceError::OutOfStock(message));
            }
            Err(e) => return Err(e.into()),
        }
    };

    if user_id.is_none() {
        cart_service.clear().await?;
    }
    session.remove::<CheckoutSession>(session_keys::CHECKOUT).await?;

    let receipt_url = receipt_url(ctx.base_url, &order);
    if let Err(e) = ctx
        .email_service
        .send_order_confirmation(&order, &receipt_url)
        .await
    {
        tracing::warn!(error = %e, order_number = %order.order_number, "Failed to send order confirmation");
    }

    tracing::info!(
        order_number = %order.order_number,
        total = %order.total,
        items = order.item_count(),
        "Order placed"
    );

    Ok(PlacedOrder { order, receipt_url })
}

fn shortfall_message(cart: &PricedCart) -> Option<String> {
    let (product_id, error) = cart.stock_shortfalls().into_iter().next()?;
    let name = cart
        .items
        .iter()
        .find(|item| item.product.id == product_id)
        .map_or("a product", |item| item.product.name.as_str());
    Some(format!("{name}: {error}"))
}

/// Public link to an order's receipt.
///
/// Carries the customer email so guests can open it.
#[must_use]
pub fn receipt_url(base_url: &str, order: &Order) -> String {
    let path = format!(
        "{}/orders/{}/invoice",
        base_url.trim_end_matches('/'),
        order.order_number
    );
    match Url::parse(&path) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_pair("email", order.customer_email.as_str());
            url.into()
        }
        Err(_) => path,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_code_is_rejected() {
        let now = Utc::now();
        assert!(matches!(
            check_code_usable(now - Duration::seconds(1), 0, now),
            Err(CheckoutServiceError::CodeExpired)
        ));
        assert!(matches!(
            check_code_usable(now, 0, now),
            Err(CheckoutServiceError::CodeExpired)
        ));
    }

    #[test]
    fn test_attempt_limit() {
        let now = Utc::now();
        let later = now + VERIFICATION_CODE_TTL;
        assert!(check_code_usable(later, MAX_VERIFICATION_ATTEMPTS - 1, now).is_ok());
        assert!(matches!(
            check_code_usable(later, MAX_VERIFICATION_ATTEMPTS, now),
            Err(CheckoutServiceError::TooManyAttempts)
        ));
    }
}
