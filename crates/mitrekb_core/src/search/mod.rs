//! Read-only lookup entry points over the normalized store.
//!
//! # Responsibility
//! - Expose exact/prefix/substring queries and technique detail hydration.
//! - Keep result shaping inside core; callers get plain structs.

pub mod query;
