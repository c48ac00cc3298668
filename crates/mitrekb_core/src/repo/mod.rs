//! Repository layer over the normalized store.
//!
//! # Responsibility
//! - Define write and bulk-read contracts for the nine logical tables.
//! - Isolate SQLite query details from ingestion/search/graph orchestration.
//!
//! # Invariants
//! - Writes are performed only by the ingester inside a rebuild transaction.
//! - Read paths reject invalid persisted state instead of masking it.

pub mod entity_repo;
pub mod relationship_repo;
