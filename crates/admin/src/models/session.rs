//! Session-related types for admin authentication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfront_core::session::SessionWindow;
use shopfront_core::{Email, UserId};

use super::User;

/// Session-stored admin identity.
///
/// Only accounts with the admin role at sign-in time get one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentAdmin {
    /// Admin's user ID.
    pub id: UserId,
    /// Admin's email address.
    pub email: Email,
    /// Admin's display name.
    pub name: String,
    /// When the admin signed in. The sign-in lapses 24 hours later.
    pub authenticated_at: DateTime<Utc>,
}

impl CurrentAdmin {
    /// Identity for an admin who just signed in.
    #[must_use]
    pub fn signed_in(user: &User, now: DateTime<Utc>) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            authenticated_at: now,
        }
    }

    /// The validity window of this sign-in.
    #[must_use]
    pub const fn window(&self) -> SessionWindow {
        SessionWindow::starting_at(self.authenticated_at)
    }
}

/// Session keys for admin authentication data.
pub mod keys {
    /// Key for storing the current signed-in admin.
    pub const CURRENT_ADMIN: &str = "current_admin";
}
