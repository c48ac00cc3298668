//! Search queries: id-prefix, free-text, technique detail, hydrated lookups.
//!
//! # Responsibility
//! - Provide the read-side lookup operations consumed by front ends.
//! - Distinguish empty results from store failures.
//!
//! # Invariants
//! - Result ordering is deterministic (external id, then internal id).
//! - LIKE wildcard characters in user terms are matched literally.
//! - Zero matches is `Ok` with an empty collection, never an error.

use crate::classify::classify;
use crate::config::KbConfig;
use crate::db::DbError;
use crate::model::entity::{EntityId, EntityKind};
use crate::repo::entity_repo::{entity_table, owner_column, reference_table};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type for search APIs.
pub type SearchResult<T> = Result<T, SearchError>;

/// Search-layer error for store interaction and result decoding.
#[derive(Debug)]
pub enum SearchError {
    Db(DbError),
    InvalidData(String),
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid search row: {message}"),
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for SearchError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Lightweight technique handle used in prefix search and hydration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechniqueRef {
    pub id: EntityId,
    /// Canonical external id, or the internal id when none is recorded.
    pub external_id: String,
    pub name: String,
}

/// Full technique view with related techniques by shared tactic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechniqueDetail {
    pub id: EntityId,
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub tactics: Vec<String>,
    pub platforms: Vec<String>,
    pub detection: Option<String>,
    /// Other techniques sharing at least one exact tactic, focal excluded.
    pub related: Vec<TechniqueRef>,
}

/// One entity match from a text or exact-id search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityHit {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Canonical external id, or the internal id when none is recorded.
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    /// Techniques linked via the kind's typed projection. Empty for plain
    /// text searches.
    pub techniques: Vec<TechniqueRef>,
}

/// Matches canonical technique external ids starting with `term`.
///
/// A base-technique query also returns its sub-techniques: `T1055` matches
/// `T1055.011` but never `T1056`.
pub fn search_by_id_prefix(
    conn: &Connection,
    config: &KbConfig,
    term: &str,
) -> SearchResult<Vec<TechniqueRef>> {
    let term = term.trim();
    if term.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT t.id, er.external_id, t.name
         FROM technique_references er
         JOIN techniques t ON t.id = er.technique_id
         WHERE er.source_name = ?1
           AND er.external_id LIKE ?2 ESCAPE '\\'
         ORDER BY er.external_id, t.id;",
    )?;
    let pattern = format!("{}%", escape_like(term));
    let mut rows = stmt.query(params![config.canonical_source, pattern])?;

    let mut refs = Vec::new();
    while let Some(row) = rows.next()? {
        refs.push(TechniqueRef {
            id: row.get(0)?,
            external_id: row.get(1)?,
            name: row.get(2)?,
        });
    }

    Ok(refs)
}

/// Case-insensitive substring search over name OR description of one kind.
///
/// Ordered by internal id; hits carry no hydrated techniques.
pub fn search_by_text(
    conn: &Connection,
    config: &KbConfig,
    kind: EntityKind,
    term: &str,
) -> SearchResult<Vec<EntityHit>> {
    let term = term.trim();
    if term.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT e.id, e.name, e.description, MIN(er.external_id)
         FROM {table} e
         LEFT JOIN {ref_table} er
           ON er.{owner_column} = e.id AND er.source_name = ?1
         WHERE e.name LIKE ?2 ESCAPE '\\'
            OR e.description LIKE ?2 ESCAPE '\\'
         GROUP BY e.id, e.name, e.description
         ORDER BY e.id
         LIMIT ?3;",
        table = entity_table(kind),
        ref_table = reference_table(kind),
        owner_column = owner_column(kind),
    );

    let pattern = format!("%{}%", escape_like(term));
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![config.canonical_source, pattern, config.search_limit])?;

    let mut hits = Vec::new();
    while let Some(row) = rows.next()? {
        hits.push(parse_entity_hit(row, kind)?);
    }

    Ok(hits)
}

/// Exact technique lookup by canonical external id, with related techniques.
///
/// Related techniques are other techniques sharing at least one exact
/// tactic name, resolved through the multi-valued tactic table.
pub fn get_technique_detail(
    conn: &Connection,
    config: &KbConfig,
    ttp_id: &str,
) -> SearchResult<Option<TechniqueDetail>> {
    let ttp_id = ttp_id.trim();

    let mut stmt = conn.prepare(
        "SELECT t.id, er.external_id, t.name, t.description, t.detection
         FROM techniques t
         JOIN technique_references er ON er.technique_id = t.id
         WHERE er.source_name = ?1 AND er.external_id = ?2
         ORDER BY t.id
         LIMIT 1;",
    )?;
    let mut rows = stmt.query(params![config.canonical_source, ttp_id])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };

    let id: String = row.get(0)?;
    let external_id: String = row.get(1)?;
    let name: String = row.get(2)?;
    let description: Option<String> = row.get(3)?;
    let detection: Option<String> = row.get(4)?;

    let tactics = load_string_column(
        conn,
        "SELECT tactic FROM technique_tactics WHERE technique_id = ?1 ORDER BY rowid;",
        &id,
    )?;
    let platforms = load_string_column(
        conn,
        "SELECT platform FROM technique_platforms WHERE technique_id = ?1 ORDER BY rowid;",
        &id,
    )?;
    let related = related_techniques(conn, config, &id)?;

    Ok(Some(TechniqueDetail {
        id,
        external_id,
        name,
        description,
        tactics,
        platforms,
        detection,
        related,
    }))
}

/// Group lookup: exact canonical id when `term` is a `G####`, else name
/// substring. Hits are hydrated with techniques from `group_techniques`.
pub fn search_groups(
    conn: &Connection,
    config: &KbConfig,
    term: &str,
) -> SearchResult<Vec<EntityHit>> {
    search_kind_with_techniques(conn, config, EntityKind::Group, term)
}

/// Software lookup: exact canonical id when `term` is an `S####`, else name
/// substring. Hits are hydrated with techniques from `software_techniques`.
pub fn search_software(
    conn: &Connection,
    config: &KbConfig,
    term: &str,
) -> SearchResult<Vec<EntityHit>> {
    search_kind_with_techniques(conn, config, EntityKind::Software, term)
}

/// Campaign lookup: exact canonical id when `term` is a `C####`, else name
/// substring. Hits are hydrated with techniques from `campaign_techniques`.
pub fn search_campaigns(
    conn: &Connection,
    config: &KbConfig,
    term: &str,
) -> SearchResult<Vec<EntityHit>> {
    search_kind_with_techniques(conn, config, EntityKind::Campaign, term)
}

fn search_kind_with_techniques(
    conn: &Connection,
    config: &KbConfig,
    kind: EntityKind,
    term: &str,
) -> SearchResult<Vec<EntityHit>> {
    let term = term.trim();
    if term.is_empty() {
        return Ok(Vec::new());
    }

    let mut hits = if classify(term).entity_kind() == Some(kind) {
        find_by_external_id(conn, config, kind, term)?
    } else {
        find_by_name(conn, config, kind, term)?
    };

    for hit in &mut hits {
        hit.techniques = techniques_for_entity(conn, config, kind, &hit.id)?;
    }

    Ok(hits)
}

fn find_by_external_id(
    conn: &Connection,
    config: &KbConfig,
    kind: EntityKind,
    external_id: &str,
) -> SearchResult<Vec<EntityHit>> {
    let sql = format!(
        "SELECT e.id, e.name, e.description, er.external_id
         FROM {table} e
         JOIN {ref_table} er ON er.{owner_column} = e.id
         WHERE er.source_name = ?1 AND er.external_id = ?2
         ORDER BY e.id;",
        table = entity_table(kind),
        ref_table = reference_table(kind),
        owner_column = owner_column(kind),
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![config.canonical_source, external_id])?;

    let mut hits = Vec::new();
    while let Some(row) = rows.next()? {
        hits.push(parse_entity_hit(row, kind)?);
    }

    Ok(hits)
}

fn find_by_name(
    conn: &Connection,
    config: &KbConfig,
    kind: EntityKind,
    term: &str,
) -> SearchResult<Vec<EntityHit>> {
    let sql = format!(
        "SELECT e.id, e.name, e.description, MIN(er.external_id)
         FROM {table} e
         LEFT JOIN {ref_table} er
           ON er.{owner_column} = e.id AND er.source_name = ?1
         WHERE e.name LIKE ?2 ESCAPE '\\'
         GROUP BY e.id, e.name, e.description
         ORDER BY e.id
         LIMIT ?3;",
        table = entity_table(kind),
        ref_table = reference_table(kind),
        owner_column = owner_column(kind),
    );

    let pattern = format!("%{}%", escape_like(term));
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![config.canonical_source, pattern, config.search_limit])?;

    let mut hits = Vec::new();
    while let Some(row) = rows.next()? {
        hits.push(parse_entity_hit(row, kind)?);
    }

    Ok(hits)
}

fn techniques_for_entity(
    conn: &Connection,
    config: &KbConfig,
    kind: EntityKind,
    entity_id: &str,
) -> SearchResult<Vec<TechniqueRef>> {
    let (projection, key_column) = match kind {
        EntityKind::Group => ("group_techniques", "group_id"),
        EntityKind::Software => ("software_techniques", "software_id"),
        EntityKind::Campaign => ("campaign_techniques", "campaign_id"),
        EntityKind::Technique => return Ok(Vec::new()),
    };

    let sql = format!(
        "SELECT t.id, t.name, COALESCE(MIN(er.external_id), t.id) AS label
         FROM {projection} p
         JOIN techniques t ON t.id = p.technique_id
         LEFT JOIN technique_references er
           ON er.technique_id = t.id AND er.source_name = ?1
         WHERE p.{key_column} = ?2
         GROUP BY t.id, t.name
         ORDER BY label, t.id;",
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![config.canonical_source, entity_id])?;

    let mut refs = Vec::new();
    while let Some(row) = rows.next()? {
        refs.push(TechniqueRef {
            id: row.get(0)?,
            name: row.get(1)?,
            external_id: row.get(2)?,
        });
    }

    Ok(refs)
}

fn related_techniques(
    conn: &Connection,
    config: &KbConfig,
    technique_id: &str,
) -> SearchResult<Vec<TechniqueRef>> {
    let mut stmt = conn.prepare(
        "SELECT t2.id, t2.name, COALESCE(MIN(er.external_id), t2.id) AS label
         FROM technique_tactics tt1
         JOIN technique_tactics tt2
           ON tt2.tactic = tt1.tactic AND tt2.technique_id != tt1.technique_id
         JOIN techniques t2 ON t2.id = tt2.technique_id
         LEFT JOIN technique_references er
           ON er.technique_id = t2.id AND er.source_name = ?1
         WHERE tt1.technique_id = ?2
         GROUP BY t2.id, t2.name
         ORDER BY label, t2.id;",
    )?;
    let mut rows = stmt.query(params![config.canonical_source, technique_id])?;

    let mut refs = Vec::new();
    while let Some(row) = rows.next()? {
        refs.push(TechniqueRef {
            id: row.get(0)?,
            name: row.get(1)?,
            external_id: row.get(2)?,
        });
    }

    Ok(refs)
}

fn parse_entity_hit(row: &Row<'_>, kind: EntityKind) -> SearchResult<EntityHit> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let description: Option<String> = row.get(2)?;
    let external_id: Option<String> = row.get(3)?;
    let external_id = external_id.unwrap_or_else(|| id.clone());

    Ok(EntityHit {
        id,
        kind,
        external_id,
        name,
        description,
        techniques: Vec::new(),
    })
}

fn load_string_column(conn: &Connection, sql: &str, id: &str) -> SearchResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params![id])?;
    let mut values = Vec::new();
    while let Some(row) = rows.next()? {
        values.push(row.get(0)?);
    }
    Ok(values)
}

/// Escapes LIKE wildcards so user terms match literally.
pub(crate) fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
