//! Account as shown in the dashboard.

use chrono::{DateTime, Utc};
use serde::Serialize;

use shopfront_core::{Email, UserId, UserRole};

/// A customer or admin account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    pub role: UserRole,
    /// Number of orders placed while signed in.
    pub order_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether the account may use the dashboard.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}
