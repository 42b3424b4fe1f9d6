//! Handle normalization and the closed project catalog.

use std::fmt;

/// Projects offered when no catalog is configured.
pub const DEFAULT_PROJECTS: &[&str] = &[
    "Orange Dynasty",
    "Sign",
    "Monad",
    "Berachain",
    "Succinct",
    "Hyperliquid",
    "EigenLayer",
];

/// Strip surrounding whitespace and a single leading `@`.
///
/// Case is preserved; use [`handle_key`] to compare handles.
pub fn normalize_handle(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('@')
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

/// Identity key for a handle: normalized and ASCII lower-cased.
pub fn handle_key(raw: &str) -> String {
    normalize_handle(raw).to_ascii_lowercase()
}

/// A project name resolved against the catalog, stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Affinity(String);

impl Affinity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of supported project names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectCatalog {
    names: Vec<String>,
}

impl ProjectCatalog {
    /// Build a catalog, dropping blank names and case-insensitive duplicates.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kept: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || kept.iter().any(|k| k.eq_ignore_ascii_case(name)) {
                continue;
            }
            kept.push(name.to_string());
        }
        Self { names: kept }
    }

    /// Display names in catalog order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Match `raw` case-insensitively against the catalog.
    pub fn resolve(&self, raw: &str) -> Option<Affinity> {
        let wanted = raw.trim();
        self.names
            .iter()
            .find(|name| name.eq_ignore_ascii_case(wanted))
            .map(|name| Affinity(name.to_lowercase()))
    }
}

impl Default for ProjectCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_PROJECTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_at_and_whitespace() {
        for raw in ["alice", "@alice", "  alice ", " @alice\t", "@ alice"] {
            assert_eq!(normalize_handle(raw), "alice", "input {raw:?}");
        }
    }

    #[test]
    fn normalize_keeps_case_and_inner_at() {
        assert_eq!(normalize_handle("@Alice"), "Alice");
        assert_eq!(normalize_handle("a@b"), "a@b");
        assert_eq!(normalize_handle("@@x"), "@x");
    }

    #[test]
    fn normalize_blank_inputs_to_empty() {
        assert_eq!(normalize_handle(""), "");
        assert_eq!(normalize_handle("   "), "");
        assert_eq!(normalize_handle(" @ "), "");
    }

    #[test]
    fn key_folds_case() {
        assert_eq!(handle_key("@Alice "), "alice");
        assert_eq!(handle_key("BOB"), handle_key("bob"));
    }

    #[test]
    fn catalog_resolves_case_insensitively_to_lowercase() {
        let catalog = ProjectCatalog::new(["SomeProject", "Other"]);
        let affinity = catalog.resolve(" someproject ").expect("resolved");
        assert_eq!(affinity.as_str(), "someproject");
        assert!(catalog.resolve("missing").is_none());
        assert!(catalog.resolve("").is_none());
    }

    #[test]
    fn catalog_drops_blank_and_duplicate_names() {
        let catalog = ProjectCatalog::new(["Monad", " ", "monad", "Sign"]);
        assert_eq!(catalog.names(), ["Monad".to_string(), "Sign".to_string()]);
    }
}
