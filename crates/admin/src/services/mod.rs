//! Business logic services for admin.
//!
//! # Services
//!
//! - `auth` - Password sign-in for admin accounts
//! - `order_cache` - 60 second cache of order listings

pub mod auth;
pub mod order_cache;

pub use auth::{AdminAuthError, AdminAuthService};
pub use order_cache::{OrderListCache, OrderListKey};
