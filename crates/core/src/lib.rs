//! Shopfront Core - Shared domain types and logic.
//!
//! This crate provides the domain layer used across all Shopfront components:
//! - `storefront` - Public catalog, cart, checkout and order tracking API
//! - `admin` - Administrative dashboard API
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no database
//! access, no HTTP. Services load state, hand it to these types, and persist
//! whatever comes back.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, money, emails, statuses and paging
//! - [`catalog`] - Products and product input validation
//! - [`cart`] - The cart model and its stock invariant
//! - [`checkout`] - The four-step checkout wizard
//! - [`order`] - Orders, order items and shipping addresses
//! - [`session`] - The fixed 24-hour session window
//! - [`analytics`] - In-memory aggregation of orders for the dashboard

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod analytics;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod order;
pub mod session;
pub mod types;

pub use types::*;
