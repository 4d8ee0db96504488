//! Authentication route handlers.
//!
//! JSON endpoints for registration, sign-in, sign-out, the session check used
//! to keep browser tabs in sync, and password resets.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use shopfront_core::{Email, UserId, UserRole};

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireAuth, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::services::auth::AuthService;
use crate::services::cart::merge_guest_cart;
use crate::state::AppState;

// =============================================================================
// Request / Response Types
// =============================================================================

/// Registration request.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Forgot password request.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Reset password request.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// Public view of the signed-in user.
#[derive(Debug, Clone, Serialize)]
pub struct SessionUser {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    pub role: UserRole,
}

/// Response describing an active sign-in.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub user: SessionUser,
    pub expires_at: DateTime<Utc>,
}

impl From<&CurrentUser> for SessionResponse {
    fn from(current: &CurrentUser) -> Self {
        Self {
            user: SessionUser {
                id: current.id,
                name: current.name.clone(),
                email: current.email.clone(),
                role: current.role,
            },
            expires_at: current.window().expires_at(),
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Create an account and sign in.
#[instrument(skip(state, session, body), fields(email = %body.email))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    let user = AuthService::new(state.pool())
        .register(&body.name, &body.email, &body.password)
        .await?;

    tracing::info!(user_id = %user.id, "Account created");
    let response = sign_in(&state, &session, &user).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Sign in with email and password.
#[instrument(skip(state, session, body), fields(email = %body.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    let user = AuthService::new(state.pool())
        .login(&body.email, &body.password)
        .await?;

    tracing::info!(user_id = %user.id, "Signed in");
    Ok(Json(sign_in(&state, &session, &user).await?))
}

async fn sign_in(state: &AppState, session: &Session, user: &User) -> Result<SessionResponse> {
    let current = CurrentUser::signed_in(user, Utc::now());
    set_current_user(session, &current).await?;
    merge_guest_cart(state.pool(), session, user.id).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(SessionResponse::from(&current))
}

/// Sign out.
///
/// The sign-in and any checkout in progress are removed; a guest cart kept in
/// the session is not.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// The current sign-in, or 401 once it has expired.
pub async fn session(RequireAuth(user): RequireAuth) -> Json<SessionResponse> {
    Json(SessionResponse::from(&user))
}

/// Request a password reset email.
///
/// Always answers 202 so the response does not reveal whether the email
/// belongs to an account.
#[instrument(skip(state, body))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<StatusCode> {
    let config = state.config();
    let issued = AuthService::new(state.pool())
        .start_password_reset(&body.email, &config.session_secret)
        .await?;

    if let Some((user, token)) = issued {
        let reset_url = format!(
            "{}/reset-password?token={token}",
            config.base_url.trim_end_matches('/')
        );
        let email = state.email().clone();
        tokio::spawn(async move {
            if let Err(e) = email
                .send_password_reset(user.email.as_str(), &user.name, &reset_url)
                .await
            {
                tracing::error!(error = %e, user_id = %user.id, "Failed to send password reset email");
            }
        });
    }

    Ok(StatusCode::ACCEPTED)
}

/// Set a new password with a reset token.
#[instrument(skip(state, body))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<StatusCode> {
    if body.token.trim().is_empty() {
        return Err(AppError::BadRequest("Reset token is required".to_owned()));
    }

    let user = AuthService::new(state.pool())
        .reset_password(&body.token, &body.password, &state.config().session_secret)
        .await?;

    tracing::info!(user_id = %user.id, "Password reset");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use shopfront_core::checkout::{CheckoutSession, CheckoutStep, Identity};
    use tower_sessions::MemoryStore;

    use super::*;
    use crate::models::session_keys;
    use crate::services::checkout;

    #[tokio::test]
    async fn test_logout_drops_account_backed_checkout() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        let account_email = Email::parse("owner@example.com").unwrap();
        let current = CurrentUser {
            id: UserId::new(3),
            name: "Owner".to_owned(),
            email: account_email.clone(),
            role: UserRole::Customer,
            authenticated_at: Utc::now(),
        };
        session
            .insert(session_keys::CURRENT_USER, &current)
            .await
            .unwrap();

        let mut wizard = CheckoutSession::new();
        wizard
            .submit_identity(
                Identity {
                    name: "Owner".to_owned(),
                    email: account_email.clone(),
                    phone: Some("555-123-4567".to_owned()),
                },
                Some(&account_email),
            )
            .unwrap();
        checkout::save(&session, &wizard).await.unwrap();

        assert_eq!(logout(session.clone()).await.unwrap(), StatusCode::NO_CONTENT);

        let after = checkout::load(&session).await.unwrap();
        assert_eq!(after.current_step(), CheckoutStep::Identity);
        assert_eq!(after.identity(), None);
        let signed_in: Option<CurrentUser> =
            session.get(session_keys::CURRENT_USER).await.unwrap();
        assert!(signed_in.is_none());
    }
}
