//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client with a JSON body `{"error": "..."}`.
//! All route handlers should return `Result<T, AppError>`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use shopfront_core::cart::CartError;
use shopfront_core::checkout::CheckoutError;

use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::cart::CartServiceError;
use crate::services::checkout::CheckoutServiceError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartServiceError),

    /// Checkout operation failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutServiceError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        Self::Checkout(err.into())
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        Self::Cart(err.into())
    }
}

const INTERNAL: &str = "Internal server error";

impl AppError {
    /// Status code and client-safe message.
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Database(err) => repository_status(err),
            Self::Auth(err) => auth_status(err),
            Self::Cart(err) => cart_status(err),
            Self::Checkout(err) => checkout_status(err),
            Self::Session(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_owned()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        }
    }
}

fn repository_status(err: &RepositoryError) -> (StatusCode, String) {
    match err {
        RepositoryError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_owned()),
        RepositoryError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        RepositoryError::Shared(inner) => repository_status(inner),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_owned())
        }
    }
}

fn auth_status(err: &AuthError) -> (StatusCode, String) {
    match err {
        AuthError::InvalidCredentials => {
            (StatusCode::UNAUTHORIZED, "Invalid email or password".to_owned())
        }
        AuthError::UserAlreadyExists => (
            StatusCode::CONFLICT,
            "An account with this email already exists".to_owned(),
        ),
        AuthError::WeakPassword(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        AuthError::InvalidEmail(_) => (StatusCode::BAD_REQUEST, "Invalid email address".to_owned()),
        AuthError::InvalidName(msg) => (StatusCode::BAD_REQUEST, (*msg).to_owned()),
        AuthError::InvalidResetToken => (
            StatusCode::BAD_REQUEST,
            "This reset link is invalid or has expired".to_owned(),
        ),
        AuthError::Repository(err) => repository_status(err),
        AuthError::PasswordHash => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_owned()),
    }
}

fn cart_status(err: &CartServiceError) -> (StatusCode, String) {
    match err {
        CartServiceError::Cart(err) => {
            let status = match err {
                CartError::ZeroQuantity | CartError::QuantityTooLarge => StatusCode::BAD_REQUEST,
                CartError::InsufficientStock { .. } => StatusCode::CONFLICT,
                CartError::NotInCart(_) => StatusCode::NOT_FOUND,
            };
            (status, err.to_string())
        }
        CartServiceError::ProductNotFound(_) => {
            (StatusCode::NOT_FOUND, "Product not found".to_owned())
        }
        CartServiceError::Repository(err) => repository_status(err),
        CartServiceError::Session(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_owned()),
    }
}

fn checkout_status(err: &CheckoutServiceError) -> (StatusCode, String) {
    match err {
        CheckoutServiceError::Checkout(err) => {
            let status = match err {
                CheckoutError::EmailNotVerified => StatusCode::FORBIDDEN,
                CheckoutError::StepNotReached { .. } | CheckoutError::CartChanged => {
                    StatusCode::CONFLICT
                }
                CheckoutError::InvalidField { .. } | CheckoutError::EmptyCart => {
                    StatusCode::BAD_REQUEST
                }
            };
            (status, err.to_string())
        }
        CheckoutServiceError::Cart(err) => cart_status(err),
        CheckoutServiceError::InvalidCode | CheckoutServiceError::CodeExpired => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        CheckoutServiceError::TooManyAttempts => (StatusCode::TOO_MANY_REQUESTS, err.to_string()),
        CheckoutServiceError::OutOfStock(msg) => (StatusCode::CONFLICT, msg.clone()),
        CheckoutServiceError::Email(_) => (
            StatusCode::BAD_GATEWAY,
            "Could not send email, please try again".to_owned(),
        ),
        CheckoutServiceError::Repository(err) => repository_status(err),
        CheckoutServiceError::Session(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL.to_owned())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for a shopper action.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, String)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data {
        breadcrumb
            .data
            .insert((*key).to_string(), serde_json::Value::String(value.clone()));
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use shopfront_core::ProductId;
    use shopfront_core::checkout::CheckoutStep;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product 12".to_string());
        assert_eq!(err.to_string(), "Not found: product 12");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::Unauthorized("test".to_string())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::Database(RepositoryError::DataCorruption(
                "bad row".to_string()
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            get_status(AppError::Database(RepositoryError::Shared(
                std::sync::Arc::new(RepositoryError::Conflict("taken".to_string()))
            ))),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_domain_error_status_codes() {
        assert_eq!(
            get_status(CheckoutError::EmailNotVerified.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(
                CheckoutError::StepNotReached {
                    requested: CheckoutStep::Review,
                    current: CheckoutStep::Identity,
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(
                CartError::InsufficientStock {
                    requested: 3,
                    available: 1
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(CartError::NotInCart(ProductId::new(4)).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AuthError::UserAlreadyExists.into()),
            StatusCode::CONFLICT
        );
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let response = AppError::Database(RepositoryError::DataCorruption(
            "negative stock on product 12".to_string(),
        ))
        .into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }
}
