//! Bundle record parsing and type-tag dispatch.
//!
//! # Responsibility
//! - Deserialize the bundle envelope and its tagged records.
//! - Map raw records onto canonical model records, or a skip outcome.
//!
//! # Invariants
//! - The type tag is dispatched through one closed enum with an exhaustive
//!   match; string comparisons appear in exactly one place.
//! - A malformed record yields `RecordOutcome::Malformed`, never a panic or
//!   a run-level error.

use crate::model::entity::{Entity, EntityKind, ExternalReference, Relationship, SoftwareKind};
use serde::Deserialize;
use serde_json::Value;

/// Knowledge bundle envelope: a flat sequence of tagged records.
#[derive(Debug, Clone, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub objects: Vec<Value>,
}

/// The closed set of recognized record tags, plus the explicit unknown arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordKind {
    AttackPattern,
    IntrusionSet,
    Malware,
    Tool,
    Campaign,
    Relationship,
    Unknown,
}

impl RecordKind {
    fn from_tag(tag: &str) -> Self {
        match tag {
            "attack-pattern" => Self::AttackPattern,
            "intrusion-set" => Self::IntrusionSet,
            "malware" => Self::Malware,
            "tool" => Self::Tool,
            "campaign" => Self::Campaign,
            "relationship" => Self::Relationship,
            _ => Self::Unknown,
        }
    }
}

/// One successfully parsed bundle record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleRecord {
    Entity {
        entity: Entity,
        references: Vec<ExternalReference>,
    },
    Relationship(Relationship),
}

/// Outcome of parsing one raw object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Parsed(BundleRecord),
    /// Type tag outside the recognized set; skipped and counted.
    Unknown(String),
    /// Required field missing or wrong shape; skipped and counted.
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    created: Option<String>,
    modified: Option<String>,
    #[serde(default)]
    kill_chain_phases: Vec<RawKillChainPhase>,
    #[serde(default, rename = "x_mitre_platforms")]
    platforms: Vec<String>,
    #[serde(rename = "x_mitre_detection")]
    detection: Option<String>,
    #[serde(default)]
    external_references: Vec<RawReference>,
}

#[derive(Debug, Deserialize)]
struct RawKillChainPhase {
    phase_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawReference {
    source_name: Option<String>,
    external_id: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRelationship {
    source_ref: Option<String>,
    target_ref: Option<String>,
    relationship_type: Option<String>,
}

/// Parses one raw bundle object by its type tag.
pub fn parse_object(object: &Value) -> RecordOutcome {
    let Some(tag) = object.get("type").and_then(Value::as_str) else {
        return RecordOutcome::Malformed("record has no type tag".to_string());
    };

    match RecordKind::from_tag(tag) {
        RecordKind::AttackPattern => parse_entity(object, EntityKind::Technique, None),
        RecordKind::IntrusionSet => parse_entity(object, EntityKind::Group, None),
        RecordKind::Malware => {
            parse_entity(object, EntityKind::Software, Some(SoftwareKind::Malware))
        }
        RecordKind::Tool => parse_entity(object, EntityKind::Software, Some(SoftwareKind::Tool)),
        RecordKind::Campaign => parse_entity(object, EntityKind::Campaign, None),
        RecordKind::Relationship => parse_relationship(object),
        RecordKind::Unknown => RecordOutcome::Unknown(tag.to_string()),
    }
}

fn parse_entity(
    object: &Value,
    kind: EntityKind,
    software_kind: Option<SoftwareKind>,
) -> RecordOutcome {
    let raw: RawEntity = match serde_json::from_value(object.clone()) {
        Ok(raw) => raw,
        Err(err) => return RecordOutcome::Malformed(err.to_string()),
    };

    let Some(id) = raw.id.filter(|id| !id.is_empty()) else {
        return RecordOutcome::Malformed(format!("{} record has no id", kind.as_str()));
    };
    let Some(name) = raw.name.filter(|name| !name.is_empty()) else {
        return RecordOutcome::Malformed(format!("{} record `{id}` has no name", kind.as_str()));
    };

    let mut entity = Entity::new(id.clone(), kind, name);
    entity.description = raw.description;
    entity.created = raw.created;
    entity.modified = raw.modified;
    entity.software_kind = software_kind;

    if kind == EntityKind::Technique {
        entity.tactics = dedup_in_order(
            raw.kill_chain_phases
                .into_iter()
                .filter_map(|phase| phase.phase_name)
                .filter(|name| !name.is_empty()),
        );
        entity.platforms = dedup_in_order(raw.platforms.into_iter());
        entity.detection = raw.detection;
    }

    let references = raw
        .external_references
        .into_iter()
        .map(|reference| ExternalReference {
            owner_id: id.clone(),
            source_name: reference.source_name,
            external_id: reference.external_id,
            url: reference.url,
        })
        .collect();

    RecordOutcome::Parsed(BundleRecord::Entity { entity, references })
}

fn parse_relationship(object: &Value) -> RecordOutcome {
    let raw: RawRelationship = match serde_json::from_value(object.clone()) {
        Ok(raw) => raw,
        Err(err) => return RecordOutcome::Malformed(err.to_string()),
    };

    let Some(source_id) = raw.source_ref.filter(|id| !id.is_empty()) else {
        return RecordOutcome::Malformed("relationship record has no source_ref".to_string());
    };
    let Some(target_id) = raw.target_ref.filter(|id| !id.is_empty()) else {
        return RecordOutcome::Malformed("relationship record has no target_ref".to_string());
    };
    let Some(relationship_type) = raw.relationship_type.filter(|verb| !verb.is_empty()) else {
        return RecordOutcome::Malformed(
            "relationship record has no relationship_type".to_string(),
        );
    };

    RecordOutcome::Parsed(BundleRecord::Relationship(Relationship {
        source_id,
        target_id,
        relationship_type,
    }))
}

fn dedup_in_order(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::new();
    for value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::{parse_object, BundleRecord, RecordOutcome};
    use crate::model::entity::{EntityKind, SoftwareKind};
    use serde_json::json;

    #[test]
    fn technique_record_maps_tactics_and_platforms() {
        let outcome = parse_object(&json!({
            "type": "attack-pattern",
            "id": "attack-pattern--a1",
            "name": "Process Injection",
            "description": "Injects code",
            "created": "2020-01-01T00:00:00.000Z",
            "modified": "2021-01-01T00:00:00.000Z",
            "kill_chain_phases": [
                {"kill_chain_name": "mitre-attack", "phase_name": "defense-evasion"},
                {"kill_chain_name": "mitre-attack", "phase_name": "privilege-escalation"},
                {"kill_chain_name": "mitre-attack", "phase_name": "defense-evasion"}
            ],
            "x_mitre_platforms": ["Windows", "Linux"],
            "x_mitre_detection": "Monitor API calls",
            "external_references": [
                {"source_name": "mitre-attack", "external_id": "T1055", "url": "https://example/T1055"}
            ]
        }));

        let RecordOutcome::Parsed(BundleRecord::Entity { entity, references }) = outcome else {
            panic!("expected parsed entity, got {outcome:?}");
        };
        assert_eq!(entity.kind, EntityKind::Technique);
        assert_eq!(entity.tactics, vec!["defense-evasion", "privilege-escalation"]);
        assert_eq!(entity.platforms, vec!["Windows", "Linux"]);
        assert_eq!(entity.detection.as_deref(), Some("Monitor API calls"));
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].owner_id, "attack-pattern--a1");
    }

    #[test]
    fn malware_and_tool_map_to_software_kinds() {
        let malware = parse_object(&json!({
            "type": "malware", "id": "malware--m1", "name": "Emotet"
        }));
        let RecordOutcome::Parsed(BundleRecord::Entity { entity, .. }) = malware else {
            panic!("expected parsed entity");
        };
        assert_eq!(entity.software_kind, Some(SoftwareKind::Malware));

        let tool = parse_object(&json!({
            "type": "tool", "id": "tool--t1", "name": "Mimikatz"
        }));
        let RecordOutcome::Parsed(BundleRecord::Entity { entity, .. }) = tool else {
            panic!("expected parsed entity");
        };
        assert_eq!(entity.software_kind, Some(SoftwareKind::Tool));
    }

    #[test]
    fn unknown_tag_is_reported_not_failed() {
        let outcome = parse_object(&json!({"type": "course-of-action", "id": "x", "name": "y"}));
        assert_eq!(outcome, RecordOutcome::Unknown("course-of-action".to_string()));
    }

    #[test]
    fn missing_required_fields_are_malformed() {
        assert!(matches!(
            parse_object(&json!({"type": "intrusion-set", "name": "APT29"})),
            RecordOutcome::Malformed(_)
        ));
        assert!(matches!(
            parse_object(&json!({"type": "relationship", "source_ref": "a"})),
            RecordOutcome::Malformed(_)
        ));
        assert!(matches!(
            parse_object(&json!({"id": "no-tag"})),
            RecordOutcome::Malformed(_)
        ));
    }
}
