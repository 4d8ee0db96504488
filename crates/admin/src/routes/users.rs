//! Users tab: accounts and roles.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use shopfront_core::{Page, PageQuery, UserId, UserRole};

use crate::db::UserRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{CurrentAdmin, User};
use crate::state::AppState;

/// Body of a role change.
#[derive(Debug, Deserialize)]
pub struct RoleUpdate {
    pub role: String,
}

fn parse_role(admin: &CurrentAdmin, target: UserId, role: &str) -> Result<UserRole> {
    if admin.id == target {
        return Err(AppError::BadRequest(
            "You cannot change your own role".to_owned(),
        ));
    }
    role.trim().parse().map_err(AppError::BadRequest)
}

/// List accounts, newest first, with their order counts.
#[instrument(skip(state, _admin))]
pub async fn index(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<User>>> {
    let page = UserRepository::new(state.pool())
        .list(query.into())
        .await?;
    Ok(Json(page))
}

/// Grant or revoke the admin role.
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, role = %body.role))]
pub async fn update_role(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i32>,
    Json(body): Json<RoleUpdate>,
) -> Result<Json<User>> {
    let target = UserId::new(id);
    let role = parse_role(&admin, target, &body.role)?;

    let user = UserRepository::new(state.pool())
        .set_role(target, role)
        .await?;

    tracing::info!(user_id = %user.id, role = %user.role, "User role changed");
    Ok(Json(user))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use shopfront_core::Email;

    use super::*;

    fn admin() -> CurrentAdmin {
        CurrentAdmin {
            id: UserId::new(1),
            email: Email::parse("owner@example.com").unwrap(),
            name: "Owner".to_owned(),
            authenticated_at: Utc::now(),
        }
    }

    #[test]
    fn test_cannot_change_own_role() {
        let err = parse_role(&admin(), UserId::new(1), "customer").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(
            parse_role(&admin(), UserId::new(2), " admin ").unwrap(),
            UserRole::Admin
        );
        assert!(matches!(
            parse_role(&admin(), UserId::new(2), "owner"),
            Err(AppError::BadRequest(_))
        ));
    }
}
