//! One-hop neighborhood expansion for visualization front ends.
//!
//! # Responsibility
//! - Resolve a focal entity from a raw query string.
//! - Expand its undirected 1-hop neighborhood into a node map + edge list.
//!
//! # Invariants
//! - An unresolved focal entity yields `Ok(None)`, never an error.
//! - Every emitted edge has both endpoints in the node map; dangling
//!   relationship endpoints are filtered out by contract.
//! - Edge direction is preserved even though adjacency is scanned both ways.

use crate::classify::classify;
use crate::config::{KbConfig, NameSearchScope};
use crate::db::DbError;
use crate::model::entity::{EntityId, EntityKind, Relationship};
use crate::repo::entity_repo::{
    entity_table, owner_column, reference_table, EntityInfo, EntityRepository, RepoError,
    SqliteEntityRepository,
};
use crate::repo::relationship_repo::{RelationshipRepository, SqliteRelationshipRepository};
use crate::search::query::escape_like;
use log::debug;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type GraphResult<T> = Result<T, GraphError>;

/// Graph-layer error for store interaction during expansion.
#[derive(Debug)]
pub enum GraphError {
    Db(DbError),
    Store(RepoError),
}

impl Display for GraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GraphError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<DbError> for GraphError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for GraphError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<RepoError> for GraphError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

/// Node map plus edge list for a focal entity's 1-hop neighborhood.
///
/// Nodes are keyed by internal entity id; the map is ordered for
/// deterministic rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphView {
    pub focal_id: EntityId,
    pub nodes: BTreeMap<EntityId, EntityInfo>,
    pub edges: Vec<Relationship>,
}

/// Expands `query` into its 1-hop neighborhood graph.
///
/// Id-formatted queries resolve by exact canonical reference in the
/// matching entity table; anything else falls back to a name substring
/// lookup scoped by `config.name_search_scope`.
pub fn expand(conn: &Connection, config: &KbConfig, query: &str) -> GraphResult<Option<GraphView>> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(None);
    }

    let entities = SqliteEntityRepository::new(conn, &config.canonical_source, config.graph_batch_size);

    let focal = match classify(query).entity_kind() {
        Some(kind) => entities.resolve_by_external_id(kind, query)?,
        None => resolve_by_name(conn, config, query)?,
    };
    let Some(focal) = focal else {
        debug!("event=graph_expand module=graph status=ok outcome=unresolved");
        return Ok(None);
    };

    let relationships = SqliteRelationshipRepository::new(conn);
    let adjacency = relationships.neighbors_of(&focal.id)?;

    let mut neighbor_set: BTreeSet<EntityId> = BTreeSet::new();
    for relationship in &adjacency {
        for endpoint in [&relationship.source_id, &relationship.target_id] {
            if *endpoint != focal.id {
                neighbor_set.insert(endpoint.clone());
            }
        }
    }
    let neighbor_ids: Vec<EntityId> = neighbor_set.into_iter().collect();

    let mut nodes = BTreeMap::new();
    nodes.insert(focal.id.clone(), focal.clone());
    for kind in EntityKind::ALL {
        for (id, info) in entities.fetch_info_by_ids(kind, &neighbor_ids)? {
            nodes.entry(id).or_insert(info);
        }
    }

    // Both endpoints must have resolved to a known entity; a dangling
    // relationship endpoint never appears as a half-edge.
    let edges: Vec<Relationship> = adjacency
        .into_iter()
        .filter(|edge| nodes.contains_key(&edge.source_id) && nodes.contains_key(&edge.target_id))
        .collect();

    debug!(
        "event=graph_expand module=graph status=ok focal={} nodes={} edges={}",
        focal.id,
        nodes.len(),
        edges.len()
    );

    Ok(Some(GraphView {
        focal_id: focal.id,
        nodes,
        edges,
    }))
}

fn resolve_by_name(
    conn: &Connection,
    config: &KbConfig,
    term: &str,
) -> GraphResult<Option<EntityInfo>> {
    match config.name_search_scope {
        NameSearchScope::Groups => resolve_kind_by_name(conn, config, EntityKind::Group, term),
        NameSearchScope::AllKinds => {
            for kind in EntityKind::ALL {
                if let Some(info) = resolve_kind_by_name(conn, config, kind, term)? {
                    return Ok(Some(info));
                }
            }
            Ok(None)
        }
    }
}

fn resolve_kind_by_name(
    conn: &Connection,
    config: &KbConfig,
    kind: EntityKind,
    term: &str,
) -> GraphResult<Option<EntityInfo>> {
    let sql = format!(
        "SELECT e.id, e.name, MIN(er.external_id)
         FROM {table} e
         LEFT JOIN {ref_table} er
           ON er.{owner_column} = e.id AND er.source_name = ?1
         WHERE e.name LIKE ?2 ESCAPE '\\'
         GROUP BY e.id, e.name
         ORDER BY e.name, e.id
         LIMIT 1;",
        table = entity_table(kind),
        ref_table = reference_table(kind),
        owner_column = owner_column(kind),
    );

    let pattern = format!("%{}%", escape_like(term));
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![config.canonical_source, pattern])?;

    if let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let label: Option<String> = row.get(2)?;
        let label = label.unwrap_or_else(|| id.clone());
        return Ok(Some(EntityInfo {
            id,
            name,
            label,
            kind,
        }));
    }

    Ok(None)
}
