//! Dashboard sign-in routes.

use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use shopfront_core::{Email, UserId};

use crate::error::{Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{RequireAdmin, clear_current_admin, set_current_admin};
use crate::models::CurrentAdmin;
use crate::services::AdminAuthService;
use crate::state::AppState;

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// The signed-in admin and when the sign-in lapses.
#[derive(Debug, Clone, Serialize)]
pub struct AdminSession {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    pub expires_at: DateTime<Utc>,
}

impl From<&CurrentAdmin> for AdminSession {
    fn from(admin: &CurrentAdmin) -> Self {
        Self {
            id: admin.id,
            name: admin.name.clone(),
            email: admin.email.clone(),
            expires_at: admin.window().expires_at(),
        }
    }
}

/// Sign in. Accounts without the admin role get 403.
#[instrument(skip(state, session, body), fields(email = %body.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AdminSession>> {
    let user = AdminAuthService::new(state.pool())
        .login(&body.email, &body.password)
        .await?;

    let admin = CurrentAdmin::signed_in(&user, Utc::now());
    set_current_admin(&session, &admin).await?;
    set_sentry_user(user.id.as_i32(), user.email.as_str());

    tracing::info!(admin_id = %user.id, "Admin signed in");
    Ok(Json(AdminSession::from(&admin)))
}

/// Sign out.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_admin(&session).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// The current sign-in, or 401.
pub async fn session(RequireAdmin(admin): RequireAdmin) -> Json<AdminSession> {
    Json(AdminSession::from(&admin))
}
