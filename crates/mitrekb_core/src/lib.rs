//! Core domain logic for the mitrekb threat-intelligence knowledge base.
//!
//! Ingests a standardized knowledge bundle (techniques, groups, software,
//! campaigns and the directed relationships between them) into a normalized
//! SQLite store, and answers identifier, prefix, substring and one-hop
//! graph queries over it. Presentation layers (chat bots, web forms,
//! renderers) are external collaborators calling through [`IntelService`].

pub mod classify;
pub mod config;
pub mod db;
pub mod graph;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod repo;
pub mod search;
pub mod service;

pub use classify::{classify, QueryKind};
pub use config::{KbConfig, NameSearchScope};
pub use graph::{GraphError, GraphView};
pub use ingest::{bundle::Bundle, IngestError, IngestReport, Ingester};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entity::{
    Entity, EntityId, EntityKind, ExternalReference, Relationship, SoftwareKind,
};
pub use repo::entity_repo::EntityInfo;
pub use search::query::{EntityHit, SearchError, TechniqueDetail, TechniqueRef};
pub use service::intel_service::IntelService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
