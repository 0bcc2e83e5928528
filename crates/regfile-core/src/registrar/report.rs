//! Status reporting

use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Module name reported in the status line
pub const MODULE_NAME: &str = "regfile";

/// Module type reported in the status line
pub const MODULE_TYPE: &str = "misc";

/// Point-in-time view of the registrar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Whether unknown identities may register
    pub auto_create: bool,
    /// Number of configured identities
    pub defined: usize,
    /// Number of registrations held
    pub registered: usize,
    /// Sanitized identity and contact of every registration with a contact
    pub users: Vec<(String, String)>,
}

impl Snapshot {
    /// Render the line-oriented status report
    ///
    /// `name=regfile,type=misc;create=false,defined=3,users=2;alice=sip:a@x,bob=sip:b@y`
    /// followed by CRLF. The per-user part is only present with `details`.
    pub fn render(&self, details: bool) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            "name={},type={};create={},defined={},users={}",
            MODULE_NAME, MODULE_TYPE, self.auto_create, self.defined, self.registered
        );
        if details {
            out.push(';');
            for (i, (identity, contact)) in self.users.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}={}", identity, contact);
            }
        }
        out.push_str("\r\n");
        out
    }
}

/// Replace characters that would break the status line with `?`
pub fn sanitize_contact(contact: &str) -> String {
    contact
        .chars()
        .map(|c| if is_separator(c) { '?' } else { c })
        .collect()
}

/// Like [`sanitize_contact`], also replacing the `=` that separates an
/// identity from its contact
pub fn sanitize_identity(identity: &str) -> String {
    identity
        .chars()
        .map(|c| if is_separator(c) || c == '=' { '?' } else { c })
        .collect()
}

fn is_separator(c: char) -> bool {
    c.is_control() || c == ',' || c == ';'
}
