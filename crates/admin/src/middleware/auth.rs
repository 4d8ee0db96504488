//! Authentication extractor for admin.
//!
//! Every dashboard API route except sign-in takes `RequireAdmin`. A sign-in
//! lapses 24 hours after it was made; the first request after that clears it.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tower_sessions::Session;

use crate::models::{CurrentAdmin, session_keys};

/// Extractor that requires a signed-in admin.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAdmin(admin): RequireAdmin,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", admin.name)
/// }
/// ```
pub struct RequireAdmin(pub CurrentAdmin);

/// Error returned when admin authentication is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAuthRejection {
    /// Nobody is signed in.
    Unauthorized,
    /// The sign-in is older than 24 hours.
    SessionExpired,
}

impl IntoResponse for AdminAuthRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::Unauthorized => "Sign in required",
            Self::SessionExpired => "Session expired, please sign in again",
        };
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
    }
}

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AdminAuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(AdminAuthRejection::Unauthorized)?;

        current_admin(session, Utc::now()).await.map(Self)
    }
}

/// Read the signed-in admin, clearing it if the 24 hour window is over.
///
/// # Errors
///
/// Returns the rejection to send when no valid sign-in exists.
pub async fn current_admin(
    session: &Session,
    now: DateTime<Utc>,
) -> Result<CurrentAdmin, AdminAuthRejection> {
    let admin = session
        .get::<CurrentAdmin>(session_keys::CURRENT_ADMIN)
        .await
        .ok()
        .flatten()
        .ok_or(AdminAuthRejection::Unauthorized)?;

    if admin.window().is_expired(now) {
        tracing::info!(admin_id = %admin.id, "Admin sign-in expired");
        if let Err(e) = clear_current_admin(session).await {
            tracing::warn!(error = %e, "Failed to clear expired admin sign-in");
        }
        return Err(AdminAuthRejection::SessionExpired);
    }

    Ok(admin)
}

/// Helper to set the current admin in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_admin(
    session: &Session,
    admin: &CurrentAdmin,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_ADMIN, admin).await
}

/// Helper to clear the current admin from the session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_admin(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}
