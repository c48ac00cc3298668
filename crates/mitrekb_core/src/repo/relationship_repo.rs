//! Relationship/projection persistence contracts and SQLite implementation.
//!
//! # Responsibility
//! - Write the generic relationship table and its typed projections.
//! - Scan the undirected 1-hop neighborhood of an entity id.
//!
//! # Invariants
//! - Every insert is upsert-or-skip; re-running an identical ingest never
//!   errors on duplicates. Conflict keys are documented per statement.
//! - The attribution projection stores `(group_id = target, campaign_id =
//!   source)` of the original `attributed-to` relationship.

use crate::model::entity::{EntityId, Relationship};
use crate::repo::entity_repo::RepoResult;
use rusqlite::{params, Connection};

/// Repository interface for the generic relationship table and projections.
pub trait RelationshipRepository {
    /// Upsert-or-skip into `relationships`.
    ///
    /// Conflict key: `(source_id, target_id, relationship_type)`. Returns
    /// whether a new row was written.
    fn insert_relationship(&self, relationship: &Relationship) -> RepoResult<bool>;
    /// Upsert-or-skip into `group_techniques` on `(group_id, technique_id)`.
    fn insert_group_technique(&self, group_id: &str, technique_id: &str) -> RepoResult<bool>;
    /// Upsert-or-skip into `software_techniques` on `(software_id, technique_id)`.
    fn insert_software_technique(&self, software_id: &str, technique_id: &str) -> RepoResult<bool>;
    /// Upsert-or-skip into `campaign_techniques` on `(campaign_id, technique_id)`.
    fn insert_campaign_technique(&self, campaign_id: &str, technique_id: &str) -> RepoResult<bool>;
    /// Upsert-or-skip into `group_campaigns` on `(group_id, campaign_id)`.
    fn insert_group_campaign(&self, group_id: &str, campaign_id: &str) -> RepoResult<bool>;
    /// Every relationship where `id` appears as source or target.
    ///
    /// Direction is preserved per row; ordering is deterministic.
    fn neighbors_of(&self, id: &EntityId) -> RepoResult<Vec<Relationship>>;
    /// Row count of the generic relationship table.
    fn relationship_count(&self) -> RepoResult<u64>;
    /// Row count of a projection table by name.
    fn projection_count(&self, projection: Projection) -> RepoResult<u64>;
}

/// The four typed projection tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    GroupTechniques,
    SoftwareTechniques,
    CampaignTechniques,
    GroupCampaigns,
}

impl Projection {
    fn table(self) -> &'static str {
        match self {
            Self::GroupTechniques => "group_techniques",
            Self::SoftwareTechniques => "software_techniques",
            Self::CampaignTechniques => "campaign_techniques",
            Self::GroupCampaigns => "group_campaigns",
        }
    }
}

/// SQLite-backed relationship repository.
pub struct SqliteRelationshipRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRelationshipRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn insert_pair(&self, sql: &str, left: &str, right: &str) -> RepoResult<bool> {
        let changed = self.conn.execute(sql, params![left, right])?;
        Ok(changed > 0)
    }
}

impl RelationshipRepository for SqliteRelationshipRepository<'_> {
    fn insert_relationship(&self, relationship: &Relationship) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "INSERT INTO relationships (source_id, target_id, relationship_type)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (source_id, target_id, relationship_type) DO NOTHING;",
            params![
                relationship.source_id,
                relationship.target_id,
                relationship.relationship_type,
            ],
        )?;
        Ok(changed > 0)
    }

    fn insert_group_technique(&self, group_id: &str, technique_id: &str) -> RepoResult<bool> {
        self.insert_pair(
            "INSERT INTO group_techniques (group_id, technique_id)
             VALUES (?1, ?2)
             ON CONFLICT (group_id, technique_id) DO NOTHING;",
            group_id,
            technique_id,
        )
    }

    fn insert_software_technique(&self, software_id: &str, technique_id: &str) -> RepoResult<bool> {
        self.insert_pair(
            "INSERT INTO software_techniques (software_id, technique_id)
             VALUES (?1, ?2)
             ON CONFLICT (software_id, technique_id) DO NOTHING;",
            software_id,
            technique_id,
        )
    }

    fn insert_campaign_technique(&self, campaign_id: &str, technique_id: &str) -> RepoResult<bool> {
        self.insert_pair(
            "INSERT INTO campaign_techniques (campaign_id, technique_id)
             VALUES (?1, ?2)
             ON CONFLICT (campaign_id, technique_id) DO NOTHING;",
            campaign_id,
            technique_id,
        )
    }

    fn insert_group_campaign(&self, group_id: &str, campaign_id: &str) -> RepoResult<bool> {
        self.insert_pair(
            "INSERT INTO group_campaigns (group_id, campaign_id)
             VALUES (?1, ?2)
             ON CONFLICT (group_id, campaign_id) DO NOTHING;",
            group_id,
            campaign_id,
        )
    }

    fn neighbors_of(&self, id: &EntityId) -> RepoResult<Vec<Relationship>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, target_id, relationship_type
             FROM relationships
             WHERE source_id = ?1 OR target_id = ?1
             ORDER BY source_id, target_id, relationship_type;",
        )?;
        let mut rows = stmt.query(params![id])?;
        let mut relationships = Vec::new();

        while let Some(row) = rows.next()? {
            relationships.push(Relationship {
                source_id: row.get(0)?,
                target_id: row.get(1)?,
                relationship_type: row.get(2)?,
            });
        }

        Ok(relationships)
    }

    fn relationship_count(&self) -> RepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM relationships;", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn projection_count(&self, projection: Projection) -> RepoResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {};", projection.table());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}
