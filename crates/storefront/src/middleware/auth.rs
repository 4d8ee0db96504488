//! Authentication extractors.
//!
//! Sign-ins last a fixed 24 hours from `authenticated_at`, whatever the
//! activity in between. An expired sign-in is removed from the session the
//! first time an extractor sees it, together with any checkout in progress.
//! The guest cart is left alone.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tower_sessions::Session;

use shopfront_core::checkout::CheckoutSession;

use crate::models::{CurrentUser, session_keys};

/// Extractor that requires a signed-in customer.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.name)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Rejection when a signed-in customer is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// No sign-in in the session.
    Unauthorized,
    /// The sign-in is older than 24 hours.
    SessionExpired,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::Unauthorized => "Sign in required",
            Self::SessionExpired => "Session expired, please sign in again",
        };
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(AuthRejection::Unauthorized)?;

        match load_current_user(session, Utc::now()).await {
            SignIn::Active(user) => Ok(Self(user)),
            SignIn::Expired => Err(AuthRejection::SessionExpired),
            SignIn::None => Err(AuthRejection::Unauthorized),
        }
    }
}

/// Extractor that optionally gets the signed-in customer.
///
/// Unlike `RequireAuth`, this does not reject the request if nobody is
/// signed in. Expired sign-ins are treated as absent.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = match parts.extensions.get::<Session>() {
            Some(session) => match load_current_user(session, Utc::now()).await {
                SignIn::Active(user) => Some(user),
                SignIn::Expired | SignIn::None => None,
            },
            None => None,
        };

        Ok(Self(user))
    }
}

/// Sign-in state found in a session.
#[derive(Debug)]
pub enum SignIn {
    Active(CurrentUser),
    Expired,
    None,
}

/// Read the signed-in customer, clearing it if the 24 hour window is over.
pub async fn load_current_user(session: &Session, now: DateTime<Utc>) -> SignIn {
    let user = session
        .get::<CurrentUser>(session_keys::CURRENT_USER)
        .await
        .ok()
        .flatten();

    match user {
        Some(user) if user.window().is_expired(now) => {
            tracing::info!(user_id = %user.id, "Sign-in expired");
            if let Err(e) = clear_current_user(session).await {
                tracing::warn!(error = %e, "Failed to clear expired sign-in");
            }
            SignIn::Expired
        }
        Some(user) => SignIn::Active(user),
        None => SignIn::None,
    }
}

/// Helper to set the signed-in customer in the session.
///
/// The session id is cycled first to prevent fixation.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Helper to clear the signed-in customer from the session (logout).
///
/// The checkout wizard goes with it: its identity may have been accepted on
/// the strength of the account's email. A guest cart stays.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session
        .remove::<CurrentUser>(session_keys::CURRENT_USER)
        .await?;
    session
        .remove::<CheckoutSession>(session_keys::CHECKOUT)
        .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use shopfront_core::{Email, UserId, UserRole};
    use tower_sessions::MemoryStore;

    use super::*;

    fn user(authenticated_at: DateTime<Utc>) -> CurrentUser {
        CurrentUser {
            id: UserId::new(7),
            name: "Ada".to_owned(),
            email: Email::parse("ada@example.com").unwrap(),
            role: UserRole::Customer,
            authenticated_at,
        }
    }

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[tokio::test]
    async fn test_active_sign_in_is_returned() {
        let session = session();
        let now = Utc::now();
        session
            .insert(session_keys::CURRENT_USER, user(now - Duration::hours(23)))
            .await
            .unwrap();

        assert!(matches!(
            load_current_user(&session, now).await,
            SignIn::Active(u) if u.id == UserId::new(7)
        ));
    }

    #[tokio::test]
    async fn test_expired_sign_in_is_cleared() {
        let session = session();
        let now = Utc::now();
        session
            .insert(session_keys::CURRENT_USER, user(now - Duration::hours(24)))
            .await
            .unwrap();
        session
            .insert(session_keys::GUEST_CART, vec![1, 2])
            .await
            .unwrap();
        session
            .insert(session_keys::CHECKOUT, CheckoutSession::new())
            .await
            .unwrap();

        assert!(matches!(
            load_current_user(&session, now).await,
            SignIn::Expired
        ));
        assert!(matches!(
            load_current_user(&session, now).await,
            SignIn::None
        ));
        let cart: Option<Vec<i32>> = session.get(session_keys::GUEST_CART).await.unwrap();
        assert_eq!(cart, Some(vec![1, 2]));
        let checkout: Option<CheckoutSession> =
            session.get(session_keys::CHECKOUT).await.unwrap();
        assert_eq!(checkout, None);
    }

    #[test]
    fn test_rejection_is_unauthorized() {
        assert_eq!(
            AuthRejection::SessionExpired.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
