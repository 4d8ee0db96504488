//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Registration, password sign-in and password resets
//! - `cart` - Carts of signed-in customers and guests
//! - `catalog` - Cached product reads
//! - `checkout` - Wizard state, email verification and order placement
//! - `email` - Transactional email
//! - `tokens` - One-time secrets and their hashes

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod email;
pub mod tokens;
