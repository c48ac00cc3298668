//! Runtime configuration injected into store and query constructors.
//!
//! # Responsibility
//! - Carry the tunable knobs of the core as an explicit value.
//! - Keep connection/source settings out of module-level globals.

use serde::{Deserialize, Serialize};

/// Scope of the name-search fallback used by graph expansion.
///
/// The narrow group-only scope matches the historical behavior of the
/// system; `AllKinds` widens resolution to every entity table in fixed
/// kind order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSearchScope {
    Groups,
    AllKinds,
}

/// Configuration for the knowledge-base core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbConfig {
    /// Reference source name treated as canonical for external ids.
    pub canonical_source: String,
    /// Name-search fallback scope for graph expansion.
    pub name_search_scope: NameSearchScope,
    /// Maximum ids bound into one bulk `IN (...)` lookup.
    pub graph_batch_size: usize,
    /// Maximum rows returned by text searches.
    pub search_limit: u32,
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            canonical_source: "mitre-attack".to_string(),
            name_search_scope: NameSearchScope::Groups,
            // Stays under SQLite's historical 999 bound-parameter limit.
            graph_batch_size: 400,
            search_limit: 25,
        }
    }
}

impl KbConfig {
    /// Builds a configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            canonical_source: std::env::var("MITREKB_CANONICAL_SOURCE")
                .unwrap_or(defaults.canonical_source),
            name_search_scope: match std::env::var("MITREKB_NAME_SEARCH_SCOPE").as_deref() {
                Ok("all_kinds") => NameSearchScope::AllKinds,
                _ => defaults.name_search_scope,
            },
            graph_batch_size: std::env::var("MITREKB_GRAPH_BATCH_SIZE")
                .ok()
                .and_then(|value| value.parse().ok())
                .filter(|&size| size > 0)
                .unwrap_or(defaults.graph_batch_size),
            search_limit: std::env::var("MITREKB_SEARCH_LIMIT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.search_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{KbConfig, NameSearchScope};

    #[test]
    fn defaults_match_documented_values() {
        let config = KbConfig::default();
        assert_eq!(config.canonical_source, "mitre-attack");
        assert_eq!(config.name_search_scope, NameSearchScope::Groups);
        assert_eq!(config.graph_batch_size, 400);
        assert_eq!(config.search_limit, 25);
    }
}
