//! Sign-in lifetime.
//!
//! A sign-in is valid for a fixed 24 hours from the moment the user
//! authenticated. Activity does not extend it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long a sign-in stays valid.
pub const SESSION_TTL: Duration = Duration::hours(24);

/// The validity window of one sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub authenticated_at: DateTime<Utc>,
}

impl SessionWindow {
    /// A window starting at `authenticated_at`.
    #[must_use]
    pub const fn starting_at(authenticated_at: DateTime<Utc>) -> Self {
        Self { authenticated_at }
    }

    /// When the sign-in stops being valid.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.authenticated_at + SESSION_TTL
    }

    /// Whether the sign-in has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Time left at `now`, zero once expired.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at() - now).max(Duration::zero())
    }
}
