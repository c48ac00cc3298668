//! Entity/reference persistence contracts and SQLite implementation.
//!
//! # Responsibility
//! - Write entity and external-reference rows during a rebuild.
//! - Resolve entities by canonical external id and by bulk id sets.
//!
//! # Invariants
//! - Bulk id lookups are chunked; no unbounded `IN (...)` statement is built.
//! - Display labels fall back to the internal id when no canonical
//!   reference exists.

use crate::db::DbError;
use crate::model::entity::{Entity, EntityId, EntityKind, ExternalReference};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for persistence and bulk-read operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted row: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Read model for resolved entities: enough to label a graph node.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EntityInfo {
    pub id: EntityId,
    pub name: String,
    /// Canonical external id, or the internal id when none is recorded.
    pub label: String,
    pub kind: EntityKind,
}

/// Repository interface for entity tables and their reference tables.
pub trait EntityRepository {
    /// Inserts one entity row plus its multi-valued technique attributes.
    fn insert_entity(&self, entity: &Entity) -> RepoResult<()>;
    /// Inserts one external-reference row for an already-inserted entity.
    fn insert_reference(&self, kind: EntityKind, reference: &ExternalReference) -> RepoResult<()>;
    /// Resolves one entity by exact canonical external id.
    fn resolve_by_external_id(
        &self,
        kind: EntityKind,
        external_id: &str,
    ) -> RepoResult<Option<EntityInfo>>;
    /// Fetches display info for every id in `ids` found in the kind's table.
    ///
    /// Ids absent from the table are silently omitted from the result.
    fn fetch_info_by_ids(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
    ) -> RepoResult<HashMap<EntityId, EntityInfo>>;
    /// Row count of the kind's entity table.
    fn entity_count(&self, kind: EntityKind) -> RepoResult<u64>;
}

/// SQLite-backed entity repository.
pub struct SqliteEntityRepository<'conn> {
    conn: &'conn Connection,
    canonical_source: String,
    batch_size: usize,
}

impl<'conn> SqliteEntityRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// `batch_size` bounds every bulk id lookup and is clamped to at least 1.
    pub fn new(conn: &'conn Connection, canonical_source: &str, batch_size: usize) -> Self {
        Self {
            conn,
            canonical_source: canonical_source.to_string(),
            batch_size: batch_size.max(1),
        }
    }
}

impl EntityRepository for SqliteEntityRepository<'_> {
    fn insert_entity(&self, entity: &Entity) -> RepoResult<()> {
        match entity.kind {
            EntityKind::Technique => {
                self.conn.execute(
                    "INSERT INTO techniques (id, name, description, created, modified, detection)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                    params![
                        entity.id,
                        entity.name,
                        entity.description.as_deref(),
                        entity.created.as_deref(),
                        entity.modified.as_deref(),
                        entity.detection.as_deref(),
                    ],
                )?;
                for tactic in &entity.tactics {
                    self.conn.execute(
                        "INSERT OR IGNORE INTO technique_tactics (technique_id, tactic)
                         VALUES (?1, ?2);",
                        params![entity.id, tactic],
                    )?;
                }
                for platform in &entity.platforms {
                    self.conn.execute(
                        "INSERT OR IGNORE INTO technique_platforms (technique_id, platform)
                         VALUES (?1, ?2);",
                        params![entity.id, platform],
                    )?;
                }
            }
            EntityKind::Group => {
                self.conn.execute(
                    "INSERT INTO groups (id, name, description, created, modified)
                     VALUES (?1, ?2, ?3, ?4, ?5);",
                    params![
                        entity.id,
                        entity.name,
                        entity.description.as_deref(),
                        entity.created.as_deref(),
                        entity.modified.as_deref(),
                    ],
                )?;
            }
            EntityKind::Software => {
                let software_kind = entity.software_kind.ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "software entity `{}` is missing its malware/tool tag",
                        entity.id
                    ))
                })?;
                self.conn.execute(
                    "INSERT INTO software (id, name, description, created, modified, software_kind)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
                    params![
                        entity.id,
                        entity.name,
                        entity.description.as_deref(),
                        entity.created.as_deref(),
                        entity.modified.as_deref(),
                        software_kind.as_str(),
                    ],
                )?;
            }
            EntityKind::Campaign => {
                self.conn.execute(
                    "INSERT INTO campaigns (id, name, description, created, modified)
                     VALUES (?1, ?2, ?3, ?4, ?5);",
                    params![
                        entity.id,
                        entity.name,
                        entity.description.as_deref(),
                        entity.created.as_deref(),
                        entity.modified.as_deref(),
                    ],
                )?;
            }
        }

        Ok(())
    }

    fn insert_reference(&self, kind: EntityKind, reference: &ExternalReference) -> RepoResult<()> {
        let sql = format!(
            "INSERT INTO {ref_table} ({owner_column}, source_name, external_id, url)
             VALUES (?1, ?2, ?3, ?4);",
            ref_table = reference_table(kind),
            owner_column = owner_column(kind),
        );
        self.conn.execute(
            &sql,
            params![
                reference.owner_id,
                reference.source_name.as_deref(),
                reference.external_id.as_deref(),
                reference.url.as_deref(),
            ],
        )?;
        Ok(())
    }

    fn resolve_by_external_id(
        &self,
        kind: EntityKind,
        external_id: &str,
    ) -> RepoResult<Option<EntityInfo>> {
        let sql = format!(
            "SELECT e.id, e.name, er.external_id
             FROM {table} e
             JOIN {ref_table} er ON er.{owner_column} = e.id
             WHERE er.source_name = ?1 AND er.external_id = ?2
             ORDER BY e.id
             LIMIT 1;",
            table = entity_table(kind),
            ref_table = reference_table(kind),
            owner_column = owner_column(kind),
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![self.canonical_source, external_id])?;
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

    fn fetch_info_by_ids(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
    ) -> RepoResult<HashMap<EntityId, EntityInfo>> {
        let mut infos = HashMap::new();

        for chunk in ids.chunks(self.batch_size) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT e.id, e.name, MIN(er.external_id)
                 FROM {table} e
                 LEFT JOIN {ref_table} er
                   ON er.{owner_column} = e.id AND er.source_name = ?1
                 WHERE e.id IN ({placeholders})
                 GROUP BY e.id, e.name;",
                table = entity_table(kind),
                ref_table = reference_table(kind),
                owner_column = owner_column(kind),
            );

            let mut bind_values: Vec<Value> =
                Vec::with_capacity(chunk.len() + 1);
            bind_values.push(Value::Text(self.canonical_source.clone()));
            bind_values.extend(chunk.iter().map(|id| Value::Text(id.clone())));

            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(bind_values))?;
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                let name: String = row.get(1)?;
                let label: Option<String> = row.get(2)?;
                let label = label.unwrap_or_else(|| id.clone());
                infos.insert(
                    id.clone(),
                    EntityInfo {
                        id,
                        name,
                        label,
                        kind,
                    },
                );
            }
        }

        Ok(infos)
    }

    fn entity_count(&self, kind: EntityKind) -> RepoResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {};", entity_table(kind));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

/// Entity table name for a kind. Table names are a closed set defined by
/// the schema, never caller input.
pub fn entity_table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Technique => "techniques",
        EntityKind::Group => "groups",
        EntityKind::Software => "software",
        EntityKind::Campaign => "campaigns",
    }
}

/// External-reference table name for a kind.
pub fn reference_table(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Technique => "technique_references",
        EntityKind::Group => "group_references",
        EntityKind::Software => "software_references",
        EntityKind::Campaign => "campaign_references",
    }
}

/// Owner-id column name inside the kind's reference table.
pub fn owner_column(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Technique => "technique_id",
        EntityKind::Group => "group_id",
        EntityKind::Software => "software_id",
        EntityKind::Campaign => "campaign_id",
    }
}
