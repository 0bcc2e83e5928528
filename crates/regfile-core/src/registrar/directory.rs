//! Static identity directory

use indexmap::IndexMap;
use tracing::warn;

use crate::sections::SectionDocument;
use crate::types::{is_valid_identity, StaticProfile};

/// Read-only profiles keyed by identity, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityDirectory {
    profiles: IndexMap<String, StaticProfile>,
}

impl IdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from profile file sections; the reserved section is skipped
    pub fn from_sections(doc: SectionDocument) -> Self {
        let mut directory = Self::new();
        for (identity, section) in doc {
            if !is_valid_identity(&identity) {
                continue;
            }
            directory.insert(identity, StaticProfile::from_params(section));
        }
        directory
    }

    /// Add or replace a profile
    pub fn insert(&mut self, identity: impl Into<String>, profile: StaticProfile) {
        let identity = identity.into();
        if !is_valid_identity(&identity) {
            warn!("Refusing profile for reserved identity '{}'", identity);
            return;
        }
        self.profiles.insert(identity, profile);
    }

    pub fn get(&self, identity: &str) -> Option<&StaticProfile> {
        self.profiles.get(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.profiles.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Profiles in scan order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &StaticProfile)> {
        self.profiles.iter()
    }
}

impl FromIterator<(String, StaticProfile)> for IdentityDirectory {
    fn from_iter<I: IntoIterator<Item = (String, StaticProfile)>>(iter: I) -> Self {
        let mut directory = Self::new();
        for (identity, profile) in iter {
            directory.insert(identity, profile);
        }
        directory
    }
}
