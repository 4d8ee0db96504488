//! Session-related types.
//!
//! Types stored in the session for authentication and shopping state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopfront_core::session::SessionWindow;
use shopfront_core::{Email, UserId, UserRole};

use super::User;

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// User's display name.
    pub name: String,
    /// User's email address.
    pub email: Email,
    /// User's role at sign-in time.
    pub role: UserRole,
    /// When the user signed in. The sign-in lapses 24 hours later.
    pub authenticated_at: DateTime<Utc>,
}

impl CurrentUser {
    /// Identity for a user who just signed in.
    #[must_use]
    pub fn signed_in(user: &User, now: DateTime<Utc>) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            authenticated_at: now,
        }
    }

    /// The validity window of this sign-in.
    #[must_use]
    pub const fn window(&self) -> SessionWindow {
        SessionWindow::starting_at(self.authenticated_at)
    }
}

/// Session keys.
pub mod keys {
    /// Key for storing the current signed-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the guest cart.
    pub const GUEST_CART: &str = "guest_cart";

    /// Key for the checkout wizard state.
    pub const CHECKOUT: &str = "checkout";
}
