//! Knowledge-base facade for external front ends.
//!
//! # Responsibility
//! - Expose the consumer operations (classify, searches, expand, rebuild)
//!   as plain-value APIs over one owned connection.
//!
//! # Invariants
//! - `rebuild_from_bundle` takes `&mut self`: exclusive access is the
//!   single-writer guard around a rebuild.
//! - Read operations never mutate the store.

use crate::classify::{classify, QueryKind};
use crate::config::KbConfig;
use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::graph::{expand, GraphResult, GraphView};
use crate::ingest::{IngestError, IngestReport, Ingester};
use crate::model::entity::EntityKind;
use crate::search::query::{
    get_technique_detail, search_by_id_prefix, search_by_text, search_campaigns, search_groups,
    search_software, EntityHit, SearchResult, TechniqueDetail, TechniqueRef,
};
use rusqlite::Connection;
use std::path::Path;

/// One handle over the normalized store for query-side callers.
pub struct IntelService {
    conn: Connection,
    config: KbConfig,
    ingester: Ingester,
}

impl IntelService {
    /// Opens (and migrates) the store at `path`.
    pub fn open(path: impl AsRef<Path>, config: KbConfig) -> DbResult<Self> {
        let conn = open_db(path)?;
        Ok(Self::with_connection(conn, config))
    }

    /// Opens an in-memory store, mainly for tests and ephemeral rebuilds.
    pub fn open_in_memory(config: KbConfig) -> DbResult<Self> {
        let conn = open_db_in_memory()?;
        Ok(Self::with_connection(conn, config))
    }

    /// Wraps an already-opened, migrated connection.
    pub fn with_connection(conn: Connection, config: KbConfig) -> Self {
        let ingester = Ingester::new(&config);
        Self {
            conn,
            config,
            ingester,
        }
    }

    pub fn config(&self) -> &KbConfig {
        &self.config
    }

    /// Classifies a raw query string. Pure; no store access.
    pub fn classify(&self, query: &str) -> QueryKind {
        classify(query)
    }

    /// Rebuilds the whole store from a bundle file.
    ///
    /// On failure the previous store contents keep serving queries.
    pub fn rebuild_from_bundle(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<IngestReport, IngestError> {
        self.ingester.ingest_file(&mut self.conn, path)
    }

    pub fn search_by_id_prefix(&self, term: &str) -> SearchResult<Vec<TechniqueRef>> {
        search_by_id_prefix(&self.conn, &self.config, term)
    }

    pub fn search_by_text(&self, kind: EntityKind, term: &str) -> SearchResult<Vec<EntityHit>> {
        search_by_text(&self.conn, &self.config, kind, term)
    }

    pub fn get_technique_detail(&self, ttp_id: &str) -> SearchResult<Option<TechniqueDetail>> {
        get_technique_detail(&self.conn, &self.config, ttp_id)
    }

    pub fn search_groups(&self, term: &str) -> SearchResult<Vec<EntityHit>> {
        search_groups(&self.conn, &self.config, term)
    }

    pub fn search_software(&self, term: &str) -> SearchResult<Vec<EntityHit>> {
        search_software(&self.conn, &self.config, term)
    }

    pub fn search_campaigns(&self, term: &str) -> SearchResult<Vec<EntityHit>> {
        search_campaigns(&self.conn, &self.config, term)
    }

    /// Expands a query into its 1-hop neighborhood graph.
    pub fn expand(&self, query: &str) -> GraphResult<Option<GraphView>> {
        expand(&self.conn, &self.config, query)
    }
}
