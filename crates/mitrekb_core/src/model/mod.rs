//! Domain model for the normalized threat-intelligence store.
//!
//! # Responsibility
//! - Define the canonical records shared by ingestion and query layers.
//! - Keep one entity shape for the four knowledge-base kinds.
//!
//! # Invariants
//! - `Entity::id` is an opaque bundle-owned identifier, never minted here.
//! - Records are immutable after ingestion; a refresh replaces, never patches.

pub mod entity;
