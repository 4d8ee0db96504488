//! Core types for Shopfront.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod page;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::Money;
pub use page::{Page, PageQuery, PageRequest};
pub use status::*;
