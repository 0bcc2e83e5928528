//! Registration table

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::storage::RegistrationSet;
use crate::types::{is_valid_identity, Registration};

/// Active registrations keyed by identity
///
/// Holds no lock of its own; the owning [`Registrar`](super::Registrar)
/// serializes every access.
#[derive(Debug, Clone, Default)]
pub struct RegistrationTable {
    entries: IndexMap<String, Registration>,
}

impl RegistrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from persisted registrations, dropping reserved identities
    pub fn from_set(set: RegistrationSet) -> Self {
        let entries = set
            .into_iter()
            .filter(|(identity, _)| is_valid_identity(identity))
            .collect();
        Self { entries }
    }

    /// Insert or fully replace the registration of `identity`
    pub fn upsert(&mut self, identity: &str, registration: Registration) -> Option<Registration> {
        self.entries.insert(identity.to_string(), registration)
    }

    pub fn remove(&mut self, identity: &str) -> Option<Registration> {
        self.entries.shift_remove(identity)
    }

    pub fn get(&self, identity: &str) -> Option<&Registration> {
        self.entries.get(identity)
    }

    /// Registration of `identity` unless it lapsed before `now`
    pub fn live(&self, identity: &str, now: DateTime<Utc>) -> Option<&Registration> {
        self.entries.get(identity).filter(|reg| !reg.is_expired(now))
    }

    /// Remove registrations that expired before `now`, returning their identities
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut expired = Vec::new();
        self.entries.retain(|identity, reg| {
            if is_valid_identity(identity) && reg.is_expired(now) {
                warn!("Removing user {}, reason: registration expired", identity);
                expired.push(identity.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    /// Remove registrations for which `keep` is false, returning their identities
    pub fn prune<F>(&mut self, mut keep: F) -> Vec<String>
    where
        F: FnMut(&str) -> bool,
    {
        let mut pruned = Vec::new();
        self.entries.retain(|identity, _| {
            if keep(identity) {
                true
            } else {
                debug!("Removing user {}, reason: no longer configured", identity);
                pruned.push(identity.clone());
                false
            }
        });
        pruned
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Registration)> {
        self.entries.iter()
    }

    /// Copy of every registration, for persistence
    pub fn to_set(&self) -> RegistrationSet {
        self.entries.clone()
    }
}
