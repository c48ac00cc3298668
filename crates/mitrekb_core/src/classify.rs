//! Query-string classification into knowledge-base lookup kinds.
//!
//! # Responsibility
//! - Map a raw user query onto one of the four id formats or a name search.
//!
//! # Invariants
//! - Classification is pure and total; unmatched input is `NameSearch`,
//!   never an error.
//! - Only technique ids accept the dotted sub-technique suffix.

use crate::model::entity::EntityKind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Outcome of classifying a raw query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// `T####` or `T####.###`.
    Technique,
    /// `G####`.
    Group,
    /// `S####`.
    Software,
    /// `C####`.
    Campaign,
    /// Anything else; resolved by name lookup downstream.
    NameSearch,
}

impl QueryKind {
    /// Entity kind this query resolves against, when it is an id format.
    pub fn entity_kind(self) -> Option<EntityKind> {
        match self {
            Self::Technique => Some(EntityKind::Technique),
            Self::Group => Some(EntityKind::Group),
            Self::Software => Some(EntityKind::Software),
            Self::Campaign => Some(EntityKind::Campaign),
            Self::NameSearch => None,
        }
    }
}

static TECHNIQUE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^T\d{4}(\.\d{3})?$").expect("technique id pattern must compile"));
static GROUP_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^G\d{4}$").expect("group id pattern must compile"));
static SOFTWARE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^S\d{4}$").expect("software id pattern must compile"));
static CAMPAIGN_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^C\d{4}$").expect("campaign id pattern must compile"));

/// Classifies a raw query string by its identifier format.
///
/// Rules are checked in fixed priority order; the sub-technique suffix
/// (exactly three decimal digits after a dot) is valid only for techniques.
pub fn classify(query: &str) -> QueryKind {
    let trimmed = query.trim();
    if TECHNIQUE_ID.is_match(trimmed) {
        QueryKind::Technique
    } else if GROUP_ID.is_match(trimmed) {
        QueryKind::Group
    } else if SOFTWARE_ID.is_match(trimmed) {
        QueryKind::Software
    } else if CAMPAIGN_ID.is_match(trimmed) {
        QueryKind::Campaign
    } else {
        QueryKind::NameSearch
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, QueryKind};

    #[test]
    fn technique_ids_with_and_without_suffix() {
        assert_eq!(classify("T1059"), QueryKind::Technique);
        assert_eq!(classify("T1059.001"), QueryKind::Technique);
    }

    #[test]
    fn group_software_campaign_ids() {
        assert_eq!(classify("G0007"), QueryKind::Group);
        assert_eq!(classify("S0154"), QueryKind::Software);
        assert_eq!(classify("C0001"), QueryKind::Campaign);
    }

    #[test]
    fn suffix_is_rejected_outside_techniques() {
        assert_eq!(classify("G0007.001"), QueryKind::NameSearch);
        assert_eq!(classify("S0154.002"), QueryKind::NameSearch);
    }

    #[test]
    fn malformed_widths_fall_back_to_name_search() {
        assert_eq!(classify("T105"), QueryKind::NameSearch);
        assert_eq!(classify("T10599"), QueryKind::NameSearch);
        assert_eq!(classify("T1059.01"), QueryKind::NameSearch);
        assert_eq!(classify("APT29"), QueryKind::NameSearch);
        assert_eq!(classify(""), QueryKind::NameSearch);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(classify("  T1055 "), QueryKind::Technique);
    }
}
