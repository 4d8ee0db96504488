//! Account management commands.

use thiserror::Error;

use shopfront_admin::db::{RepositoryError, UserRepository};
use shopfront_admin::services::{AdminAuthError, AdminAuthService};
use shopfront_core::{Email, UserRole};

use super::{ConnectError, connect};

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Invalid role: {0}. Valid roles: customer, admin")]
    InvalidRole(String),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("No account with email: {0}")]
    NotFound(String),

    #[error(transparent)]
    Auth(#[from] AdminAuthError),

    #[error(transparent)]
    Repository(RepositoryError),
}

/// Create an account with a password.
///
/// # Errors
///
/// Returns an error for an invalid role, a taken email, a weak password or a
/// database failure.
pub async fn create(email: &str, name: &str, password: &str, role: &str) -> Result<(), UserError> {
    let role: UserRole = role
        .parse()
        .map_err(|_| UserError::InvalidRole(role.to_owned()))?;

    let pool = connect().await?;
    let user = AdminAuthService::new(&pool)
        .create_user(name, email, password, role)
        .await?;

    tracing::info!(
        "Account created. ID: {}, Email: {}, Role: {}",
        user.id,
        user.email,
        user.role
    );
    Ok(())
}

/// Give an existing account the admin role.
///
/// # Errors
///
/// Returns an error if no account has the email or the database fails.
pub async fn promote(email: &str) -> Result<(), UserError> {
    let parsed = Email::parse(email).map_err(|_| UserError::InvalidEmail(email.to_owned()))?;

    let pool = connect().await?;
    let user = UserRepository::new(&pool)
        .set_role_by_email(&parsed, UserRole::Admin)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => UserError::NotFound(email.to_owned()),
            other => UserError::Repository(other),
        })?;

    tracing::info!("{} ({}) is now an admin", user.name, user.email);
    Ok(())
}
