//! Consumer-facing facade over ingestion and query operations.
//!
//! # Responsibility
//! - Bundle the connection, configuration and ingester into one handle for
//!   front ends (chat bot, web form) to call.
//! - Keep those callers decoupled from storage details.

pub mod intel_service;
