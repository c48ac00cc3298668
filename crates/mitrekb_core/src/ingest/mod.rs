//! Bundle ingestion: one run is one atomic rebuild of the whole store.
//!
//! # Responsibility
//! - Read and parse a knowledge bundle file.
//! - Rebuild every table inside a single IMMEDIATE transaction.
//! - Route relationship records into the typed projections.
//!
//! # Invariants
//! - A missing or unparseable bundle is fatal and leaves the previous store
//!   serving queries (transaction rollback).
//! - A malformed or unknown individual record is skipped and counted, never
//!   fatal.
//! - Readers on other connections never observe a partially rebuilt store.

pub mod bundle;

use crate::config::KbConfig;
use crate::db::DbError;
use crate::model::entity::{id_type_prefix, EntityKind, Relationship};
use crate::repo::entity_repo::{EntityRepository, RepoError, SqliteEntityRepository};
use crate::repo::relationship_repo::{RelationshipRepository, SqliteRelationshipRepository};
use bundle::{Bundle, BundleRecord, RecordOutcome};
use log::{info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Fatal ingestion failure. The store keeps its previous contents.
#[derive(Debug)]
pub enum IngestError {
    /// Bundle file does not exist at the given path.
    Missing(PathBuf),
    Io(std::io::Error),
    /// Bundle exists but is not valid JSON of the expected shape.
    Parse(serde_json::Error),
    Db(DbError),
    Store(RepoError),
}

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(path) => write!(f, "bundle file not found: {}", path.display()),
            Self::Io(err) => write!(f, "failed to read bundle: {err}"),
            Self::Parse(err) => write!(f, "failed to parse bundle: {err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IngestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Missing(_) => None,
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for IngestError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<RepoError> for IngestError {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

/// Per-table insert counts plus skip totals for one ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub techniques: u64,
    pub groups: u64,
    pub software: u64,
    pub campaigns: u64,
    pub technique_references: u64,
    pub group_references: u64,
    pub software_references: u64,
    pub campaign_references: u64,
    pub relationships: u64,
    pub group_techniques: u64,
    pub software_techniques: u64,
    pub campaign_techniques: u64,
    pub group_campaigns: u64,
    /// Records whose type tag is outside the recognized set.
    pub skipped_unknown: u64,
    /// Records missing a required field.
    pub skipped_malformed: u64,
}

/// Single-writer batch ingester.
///
/// Exclusive `&mut Connection` access is the single-flight guard around a
/// rebuild; concurrent rebuilds cannot be expressed.
pub struct Ingester {
    config: KbConfig,
}

impl Ingester {
    pub fn new(config: &KbConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Reads a bundle file and rebuilds the store from it.
    pub fn ingest_file(
        &self,
        conn: &mut Connection,
        path: impl AsRef<Path>,
    ) -> Result<IngestReport, IngestError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IngestError::Missing(path.to_path_buf()));
        }

        let raw = std::fs::read_to_string(path)?;
        let bundle: Bundle = serde_json::from_str(&raw)?;
        self.ingest_bundle(conn, &bundle)
    }

    /// Rebuilds the store from an already-parsed bundle.
    ///
    /// The whole rebuild runs in one IMMEDIATE transaction: clear every
    /// table, insert everything, commit.
    pub fn ingest_bundle(
        &self,
        conn: &mut Connection,
        bundle: &Bundle,
    ) -> Result<IngestReport, IngestError> {
        let started_at = Instant::now();
        info!(
            "event=ingest module=ingest status=start objects={}",
            bundle.objects.len()
        );

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let report = match self.rebuild(&tx, bundle) {
            Ok(report) => report,
            Err(err) => {
                warn!(
                    "event=ingest module=ingest status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err);
            }
        };
        tx.commit()?;

        info!(
            "event=ingest module=ingest status=ok duration_ms={} techniques={} groups={} software={} campaigns={} relationships={} skipped_unknown={} skipped_malformed={}",
            started_at.elapsed().as_millis(),
            report.techniques,
            report.groups,
            report.software,
            report.campaigns,
            report.relationships,
            report.skipped_unknown,
            report.skipped_malformed
        );
        Ok(report)
    }

    fn rebuild(&self, tx: &Transaction<'_>, bundle: &Bundle) -> Result<IngestReport, IngestError> {
        clear_store(tx)?;

        let entities = SqliteEntityRepository::new(
            tx,
            &self.config.canonical_source,
            self.config.graph_batch_size,
        );
        let relationships = SqliteRelationshipRepository::new(tx);
        let mut report = IngestReport::default();

        for (index, object) in bundle.objects.iter().enumerate() {
            match bundle::parse_object(object) {
                RecordOutcome::Parsed(BundleRecord::Entity { entity, references }) => {
                    entities.insert_entity(&entity)?;
                    match entity.kind {
                        EntityKind::Technique => report.techniques += 1,
                        EntityKind::Group => report.groups += 1,
                        EntityKind::Software => report.software += 1,
                        EntityKind::Campaign => report.campaigns += 1,
                    }
                    for reference in &references {
                        entities.insert_reference(entity.kind, reference)?;
                        match entity.kind {
                            EntityKind::Technique => report.technique_references += 1,
                            EntityKind::Group => report.group_references += 1,
                            EntityKind::Software => report.software_references += 1,
                            EntityKind::Campaign => report.campaign_references += 1,
                        }
                    }
                }
                RecordOutcome::Parsed(BundleRecord::Relationship(relationship)) => {
                    if relationships.insert_relationship(&relationship)? {
                        report.relationships += 1;
                    }
                    route_projection(&relationships, &relationship, &mut report)?;
                }
                RecordOutcome::Unknown(tag) => {
                    warn!(
                        "event=ingest_skip module=ingest status=ok reason=unknown_type index={index} type={tag}"
                    );
                    report.skipped_unknown += 1;
                }
                RecordOutcome::Malformed(reason) => {
                    warn!(
                        "event=ingest_skip module=ingest status=ok reason=malformed index={index} detail={reason}"
                    );
                    report.skipped_malformed += 1;
                }
            }
        }

        Ok(report)
    }
}

/// Routes a `uses`/`attributed-to` relationship into its typed projection
/// by the STIX type prefix of the endpoint ids. Non-matching combinations
/// stay in the generic table only.
fn route_projection(
    repo: &SqliteRelationshipRepository<'_>,
    relationship: &Relationship,
    report: &mut IngestReport,
) -> Result<(), IngestError> {
    let source_prefix = id_type_prefix(&relationship.source_id).unwrap_or("");
    let target_prefix = id_type_prefix(&relationship.target_id).unwrap_or("");

    match relationship.relationship_type.as_str() {
        "uses" if target_prefix == "attack-pattern" => match source_prefix {
            "intrusion-set" => {
                if repo.insert_group_technique(&relationship.source_id, &relationship.target_id)? {
                    report.group_techniques += 1;
                }
            }
            "malware" | "tool" => {
                if repo
                    .insert_software_technique(&relationship.source_id, &relationship.target_id)?
                {
                    report.software_techniques += 1;
                }
            }
            "campaign" => {
                if repo
                    .insert_campaign_technique(&relationship.source_id, &relationship.target_id)?
                {
                    report.campaign_techniques += 1;
                }
            }
            _ => {}
        },
        // Roles swap on purpose: the projection is keyed by group id while
        // the source relationship reads campaign attributed-to group.
        "attributed-to" if source_prefix == "campaign" && target_prefix == "intrusion-set" => {
            if repo.insert_group_campaign(&relationship.target_id, &relationship.source_id)? {
                report.group_campaigns += 1;
            }
        }
        _ => {}
    }

    Ok(())
}

fn clear_store(tx: &Transaction<'_>) -> Result<(), IngestError> {
    // Children before parents; projections and relationships carry no FKs.
    tx.execute_batch(
        "DELETE FROM technique_tactics;
         DELETE FROM technique_platforms;
         DELETE FROM technique_references;
         DELETE FROM group_references;
         DELETE FROM software_references;
         DELETE FROM campaign_references;
         DELETE FROM techniques;
         DELETE FROM groups;
         DELETE FROM software;
         DELETE FROM campaigns;
         DELETE FROM relationships;
         DELETE FROM group_techniques;
         DELETE FROM software_techniques;
         DELETE FROM campaign_techniques;
         DELETE FROM group_campaigns;",
    )?;
    Ok(())
}
