//! File storage implementation for registrations
//!
//! One section per identity:
//!
//! ```toml
//! [alice]
//! driver = "sip"
//! data = "sip:alice@192.168.1.100:5060"
//! expires = "1700000000"
//! ```
//!
//! `expires` is absolute epoch seconds; missing or `0` never expires.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{RegistrarError, Result};
use crate::sections::{read_sections, render_sections, Section, SectionDocument};
use crate::storage::{RegistrationSet, Storage};
use crate::types::{is_valid_identity, Registration, PARAM_DATA, PARAM_DRIVER, PARAM_EXPIRES};

/// Registrations stored in a TOML section file
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn load(&self) -> Result<RegistrationSet> {
        if !self.path.exists() {
            debug!("Registration file {} does not exist yet", self.path.display());
            return Ok(RegistrationSet::new());
        }
        let doc = read_sections(&self.path)?;
        let registrations = decode_registrations(doc);
        debug!(
            "Loaded {} registrations from {}",
            registrations.len(),
            self.path.display()
        );
        Ok(registrations)
    }

    fn save(&self, registrations: &RegistrationSet) -> Result<()> {
        let text = render_sections(&encode_registrations(registrations))?;

        // Write next to the target and rename so readers never see half a file
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, text).map_err(|e| {
            RegistrarError::StorageError(format!("cannot write {}: {}", tmp.display(), e))
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            RegistrarError::StorageError(format!("cannot replace {}: {}", self.path.display(), e))
        })?;

        debug!(
            "Saved {} registrations to {}",
            registrations.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Convert registrations into sections
pub fn encode_registrations(registrations: &RegistrationSet) -> SectionDocument {
    registrations
        .iter()
        .map(|(identity, reg)| {
            let mut section = Section::new();
            if let Some(driver) = &reg.driver {
                section.insert(PARAM_DRIVER.to_string(), driver.clone());
            }
            section.insert(PARAM_DATA.to_string(), reg.contact.clone());
            if let Some(at) = reg.expires_at {
                section.insert(PARAM_EXPIRES.to_string(), at.timestamp().to_string());
            }
            (identity.clone(), section)
        })
        .collect()
}

/// Convert sections into registrations, skipping malformed entries
pub fn decode_registrations(doc: SectionDocument) -> RegistrationSet {
    let mut registrations = RegistrationSet::new();

    for (identity, mut section) in doc {
        if !is_valid_identity(&identity) {
            continue;
        }

        let contact = match section.shift_remove(PARAM_DATA) {
            Some(contact) if !contact.is_empty() => contact,
            _ => {
                warn!("Dropping stored registration for {}: no contact", identity);
                continue;
            }
        };

        let expires_at = match section.get(PARAM_EXPIRES).map(|s| s.trim()) {
            None | Some("") | Some("0") => None,
            Some(raw) => match raw
                .parse::<i64>()
                .ok()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            {
                Some(at) => Some(at),
                None => {
                    warn!(
                        "Dropping stored registration for {}: bad expires '{}'",
                        identity, raw
                    );
                    continue;
                }
            },
        };

        let driver = section
            .shift_remove(PARAM_DRIVER)
            .filter(|driver| !driver.is_empty());

        registrations.insert(
            identity,
            Registration {
                driver,
                contact,
                expires_at,
            },
        );
    }

    registrations
}
