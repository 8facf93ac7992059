//! Identifier minting
//!
//! Every uploaded object gets a fresh `urn:uuid:` identifier. The minter
//! remembers what it has issued during a run, so two records without a
//! natural key can never be handed the same package id.

use emlx_common::types::SourceRecord;
use std::collections::HashSet;
use uuid::Uuid;

pub const UUID_PREFIX: &str = "urn:uuid:";
pub const RESOURCE_MAP_PREFIX: &str = "resource_map_";

#[derive(Debug, Default)]
pub struct IdentifierMinter {
    issued: HashSet<String>,
}

impl IdentifierMinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new `urn:uuid:` identifier
    pub fn mint(&mut self) -> String {
        loop {
            let id = format!("{UUID_PREFIX}{}", Uuid::new_v4());
            if self.issued.insert(id.clone()) {
                return id;
            }
        }
    }

    /// Identifier for a resource map object
    pub fn mint_resource_map(&mut self) -> String {
        loop {
            let id = format!("{RESOURCE_MAP_PREFIX}{UUID_PREFIX}{}", Uuid::new_v4());
            if self.issued.insert(id.clone()) {
                return id;
            }
        }
    }

    /// `packageId` for a record: `doi:<doi>` when the record has one
    pub fn package_id(&mut self, record: &SourceRecord) -> String {
        match record.doi() {
            Some(doi) => {
                let id = format!("doi:{doi}");
                self.issued.insert(id.clone());
                id
            },
            None => self.mint(),
        }
    }

    /// Mark an identifier as taken, returning false when it already was
    pub fn reserve(&mut self, id: &str) -> bool {
        self.issued.insert(id.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minted_ids_are_unique() {
        let mut minter = IdentifierMinter::new();
        let ids: HashSet<String> = (0..500).map(|_| minter.mint()).collect();
        assert_eq!(ids.len(), 500);
        assert!(ids.iter().all(|id| id.starts_with(UUID_PREFIX)));
    }

    #[test]
    fn test_resource_map_prefix() {
        let id = IdentifierMinter::new().mint_resource_map();
        assert!(id.starts_with("resource_map_urn:uuid:"));
    }

    #[test]
    fn test_package_id() {
        let mut minter = IdentifierMinter::new();
        let with_doi: SourceRecord = serde_json::from_value(json!({"doi": "10.1/x"})).unwrap();
        let without: SourceRecord = serde_json::from_value(json!({"id": 5})).unwrap();

        assert_eq!(minter.package_id(&with_doi), "doi:10.1/x");
        let a = minter.package_id(&without);
        let b = minter.package_id(&without);
        assert!(a.starts_with(UUID_PREFIX));
        assert_ne!(a, b);
        assert!(!minter.reserve("doi:10.1/x"));
    }
}
