//! One-time verification codes and password reset tokens.
//!
//! Only hashes are stored; see `services::tokens`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use shopfront_core::{Email, UserId};

use super::RepositoryError;

/// An outstanding email verification code.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VerificationCode {
    pub id: i32,
    pub code_hash: String,
    pub attempts: i32,
    pub expires_at: DateTime<Utc>,
}

/// Repository for token tables.
pub struct TokenRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TokenRepository<'a> {
    /// Create a new token repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store a new verification code, retiring any earlier one for the email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn create_verification_code(
        &self,
        email: &Email,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            UPDATE storefront.email_verification_code
            SET consumed_at = now()
            WHERE email = $1 AND consumed_at IS NULL
            ",
        )
        .bind(email.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            INSERT INTO storefront.email_verification_code (email, code_hash, expires_at)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(email.as_str())
        .bind(code_hash)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// The newest unconsumed code for an email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn active_verification_code(
        &self,
        email: &Email,
    ) -> Result<Option<VerificationCode>, RepositoryError> {
        let code = sqlx::query_as::<_, VerificationCode>(
            r"
            SELECT id, code_hash, attempts, expires_at
            FROM storefront.email_verification_code
            WHERE email = $1 AND consumed_at IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            ",
        )
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;
        Ok(code)
    }

    /// Count a failed attempt against a code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn record_failed_attempt(&self, id: i32) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE storefront.email_verification_code SET attempts = attempts + 1 WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Mark a code as used.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn consume_verification_code(&self, id: i32) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE storefront.email_verification_code SET consumed_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Store a password reset token hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create_reset_token(
        &self,
        user_id: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO storefront.password_reset_token (token_hash, user_id, expires_at)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Use up a reset token, returning its user if it was valid.
    ///
    /// A token is valid once, and only before it expires.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn consume_reset_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<UserId>, RepositoryError> {
        let user_id = sqlx::query_scalar::<_, UserId>(
            r"
            UPDATE storefront.password_reset_token
            SET used_at = now()
            WHERE token_hash = $1 AND used_at IS NULL AND expires_at > now()
            RETURNING user_id
            ",
        )
        .bind(token_hash)
        .fetch_optional(self.pool)
        .await?;
        Ok(user_id)
    }
}
