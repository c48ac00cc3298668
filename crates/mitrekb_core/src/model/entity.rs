//! Canonical entity, reference and relationship records.
//!
//! # Responsibility
//! - Define the record shapes persisted by ingestion and read by queries.
//! - Keep kind-specific attributes optional on one canonical entity shape.
//!
//! # Invariants
//! - `Entity::id` is the bundle's globally unique identifier (e.g.
//!   `attack-pattern--<uuid>`); the core never generates or rewrites it.
//! - `tactics`/`platforms` are meaningful only for `EntityKind::Technique`.
//! - `software_kind` is required for `EntityKind::Software`, absent otherwise.

use serde::{Deserialize, Serialize};

/// Stable identifier for a knowledge-base entity, as found in the bundle.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type EntityId = String;

/// The four entity kinds held by the normalized store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Adversary technique or sub-technique (`T####`, `T####.###`).
    Technique,
    /// Threat-actor group (`G####`).
    Group,
    /// Malware or tool (`S####`).
    Software,
    /// Named campaign (`C####`).
    Campaign,
}

impl EntityKind {
    /// All kinds in the fixed resolution order used by query layers.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Technique,
        EntityKind::Group,
        EntityKind::Software,
        EntityKind::Campaign,
    ];

    /// Stable lowercase label used in logs and query results.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Technique => "technique",
            Self::Group => "group",
            Self::Software => "software",
            Self::Campaign => "campaign",
        }
    }
}

/// Source bundle distinction between the two software record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftwareKind {
    Malware,
    Tool,
}

impl SoftwareKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Malware => "malware",
            Self::Tool => "tool",
        }
    }
}

/// Canonical record for all four entity kinds.
///
/// One storage shape supports all kinds without copying; kind-specific
/// fields stay empty where they do not apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Bundle-owned globally unique id.
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    pub description: Option<String>,
    /// Creation timestamp as an opaque RFC 3339 string from the bundle.
    pub created: Option<String>,
    /// Modification timestamp as an opaque RFC 3339 string from the bundle.
    pub modified: Option<String>,
    /// Ordered, deduplicated tactic names. Techniques only.
    pub tactics: Vec<String>,
    /// Platform names. Techniques only.
    pub platforms: Vec<String>,
    /// Free-text detection guidance. Techniques only.
    pub detection: Option<String>,
    /// Malware/tool tag. Software only.
    pub software_kind: Option<SoftwareKind>,
}

impl Entity {
    /// Creates an entity with only the base fields populated.
    pub fn new(id: impl Into<EntityId>, kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            description: None,
            created: None,
            modified: None,
            tactics: Vec::new(),
            platforms: Vec::new(),
            detection: None,
            software_kind: None,
        }
    }
}

/// External reference attached to an entity.
///
/// An entity may carry many references; at most one per source is expected
/// to use the canonical source name, but malformed data with zero or
/// several is tolerated throughout the query layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalReference {
    pub owner_id: EntityId,
    pub source_name: Option<String>,
    /// Human-facing identifier, e.g. `T1059.001`.
    pub external_id: Option<String>,
    pub url: Option<String>,
}

/// Directed relationship between two entities.
///
/// Conflict key is the full `(source_id, target_id, relationship_type)`
/// triple: distinct verbs between the same ordered pair are all retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: EntityId,
    pub target_id: EntityId,
    /// Free-text verb, e.g. `uses`, `attributed-to`, `mitigates`.
    pub relationship_type: String,
}

/// Splits the type prefix off a bundle id (`attack-pattern--abc` -> `attack-pattern`).
///
/// Returns `None` when the id carries no `--` separator.
pub fn id_type_prefix(id: &str) -> Option<&str> {
    id.split_once("--").map(|(prefix, _)| prefix)
}
