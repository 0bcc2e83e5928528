//! Alias expansion
//!
//! An alias is a virtual identity backed by every profile that lists it in
//! its `alternatives`. The table is derived from the directory and rebuilt
//! wholesale on every reload.

use indexmap::IndexMap;

use super::IdentityDirectory;

/// Alias name to member identities
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliasTable {
    groups: IndexMap<String, Vec<String>>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from a directory
    pub fn build(directory: &IdentityDirectory) -> Self {
        let mut table = Self::new();
        table.rebuild(directory);
        table
    }

    /// Discard all groups and derive them again from `directory`
    ///
    /// Members are appended in profile scan order, then alternatives order
    /// within a profile. A profile listing an alias twice appears twice.
    pub fn rebuild(&mut self, directory: &IdentityDirectory) {
        self.groups.clear();
        for (identity, profile) in directory.iter() {
            for alias in &profile.alternatives {
                self.groups
                    .entry(alias.clone())
                    .or_default()
                    .push(identity.clone());
            }
        }
    }

    /// Members backing `alias`, if it is one
    pub fn resolve(&self, alias: &str) -> Option<&[String]> {
        self.groups.get(alias).map(Vec::as_slice)
    }

    /// Number of alias groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StaticProfile;

    fn profile(alternatives: &[&str]) -> StaticProfile {
        StaticProfile {
            alternatives: alternatives.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_rebuild_orders_members_by_scan() {
        let directory: IdentityDirectory = vec![
            ("carol".to_string(), profile(&["support", "sales"])),
            ("alice".to_string(), profile(&["sales"])),
            ("bob".to_string(), profile(&[])),
            ("dave".to_string(), profile(&["sales", "sales"])),
        ]
        .into_iter()
        .collect();

        let table = AliasTable::build(&directory);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.resolve("sales").unwrap(),
            &["carol", "alice", "dave", "dave"]
        );
        assert_eq!(table.resolve("support").unwrap(), &["carol"]);
        assert!(table.resolve("bob").is_none());
    }

    #[test]
    fn test_rebuild_discards_old_groups() {
        let before: IdentityDirectory = vec![("alice".to_string(), profile(&["sales"]))]
            .into_iter()
            .collect();
        let after: IdentityDirectory = vec![("alice".to_string(), profile(&["billing"]))]
            .into_iter()
            .collect();

        let mut table = AliasTable::build(&before);
        table.rebuild(&after);
        assert!(table.resolve("sales").is_none());
        assert_eq!(table.resolve("billing").unwrap(), &["alice"]);
    }
}
