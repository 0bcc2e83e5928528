//! Section documents
//!
//! Both the profile file and the registration file are a sequence of named
//! sections, each a flat mapping of parameter name to string value. They
//! are stored as TOML tables; table and key order is preserved so that
//! profile scan order survives a load.

use indexmap::IndexMap;
use std::path::Path;
use toml::Value;
use tracing::warn;

use crate::error::{RegistrarError, Result};

/// One named section: parameter name to value
pub type Section = IndexMap<String, String>;

/// All sections of a file, in file order
pub type SectionDocument = IndexMap<String, Section>;

/// Parse a TOML document into sections
///
/// Scalar values are converted to their string form. Arrays and nested
/// tables have no meaning in a flat section and are skipped.
pub fn parse_sections(text: &str) -> Result<SectionDocument> {
    let table: toml::Table = text.parse()?;
    sections_from_table(table)
}

/// Convert an already parsed TOML table into sections
pub fn sections_from_table(table: toml::Table) -> Result<SectionDocument> {
    let mut doc = SectionDocument::new();

    for (name, value) in table {
        let Value::Table(entries) = value else {
            return Err(RegistrarError::ConfigError(format!(
                "top-level key '{}' is not a section",
                name
            )));
        };

        let mut section = Section::new();
        for (key, value) in entries {
            match scalar_to_string(&value) {
                Some(text) => {
                    section.insert(key, text);
                }
                None => warn!("Ignoring non-scalar parameter {}.{}", name, key),
            }
        }
        doc.insert(name, section);
    }

    Ok(doc)
}

/// Render sections back into TOML
pub fn render_sections(doc: &SectionDocument) -> Result<String> {
    Ok(toml::to_string(doc)?)
}

/// Read and parse a section file
pub fn read_sections(path: &Path) -> Result<SectionDocument> {
    let text = std::fs::read_to_string(path)?;
    parse_sections(&text)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Datetime(d) => Some(d.to_string()),
        Value::Array(_) | Value::Table(_) => None,
    }
}
