//! Core types for the file-backed registrar

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Section name that holds module settings; never a valid identity
pub const RESERVED_IDENTITY: &str = "general";

/// Profile parameter holding the plaintext password
pub const PARAM_PASSWORD: &str = "password";

/// Profile parameter holding the comma-separated alias list
pub const PARAM_ALTERNATIVES: &str = "alternatives";

/// Registration parameter holding the channel driver
pub const PARAM_DRIVER: &str = "driver";

/// Registration parameter holding the contact
pub const PARAM_DATA: &str = "data";

/// Registration parameter holding the absolute expiry in epoch seconds
pub const PARAM_EXPIRES: &str = "expires";

/// Call parameter set when a known identity cannot be reached
pub const PARAM_ERROR: &str = "error";

/// Prefix telling the dialing layer to call several contacts in parallel
pub const FORK_MARKER: &str = "fork";

/// Ordered outbound call parameters
pub type CallParams = IndexMap<String, String>;

/// Whether `identity` may be authenticated, registered or routed to
pub fn is_valid_identity(identity: &str) -> bool {
    !identity.is_empty() && identity != RESERVED_IDENTITY
}

// ============ Directory Types ============

/// Static, file-configured profile of one identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticProfile {
    /// Plaintext password answered to authentication requests
    pub password: Option<String>,

    /// Alias names this identity answers for, in configured order
    pub alternatives: Vec<String>,

    /// Every other parameter, overlaid on calls placed by this identity
    pub params: IndexMap<String, String>,
}

impl StaticProfile {
    /// Build a profile from a flat section of parameters
    pub fn from_params(section: IndexMap<String, String>) -> Self {
        let mut profile = StaticProfile::default();
        for (name, value) in section {
            match name.as_str() {
                PARAM_PASSWORD => profile.password = Some(value),
                PARAM_ALTERNATIVES => profile.alternatives = split_alternatives(&value),
                _ => {
                    profile.params.insert(name, value);
                }
            }
        }
        profile
    }

    /// Flatten back into a section, reserved parameters first
    pub fn to_params(&self) -> IndexMap<String, String> {
        let mut section = IndexMap::new();
        if let Some(password) = &self.password {
            section.insert(PARAM_PASSWORD.to_string(), password.clone());
        }
        if !self.alternatives.is_empty() {
            section.insert(PARAM_ALTERNATIVES.to_string(), self.alternatives.join(","));
        }
        for (name, value) in &self.params {
            section.insert(name.clone(), value.clone());
        }
        section
    }
}

/// Split a comma-separated alias list, dropping blank names
///
/// Names are trimmed, so `"sales, support"` yields `support` rather than
/// an alias with a leading space that no call could name.
pub fn split_alternatives(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

// ============ Registration Types ============

/// A live binding of an identity to a contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Channel driver that should place calls to this contact
    pub driver: Option<String>,

    /// Opaque destination descriptor (e.g. "sip:alice@192.168.1.100:5060")
    pub contact: String,

    /// When this registration lapses; `None` never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl Registration {
    /// Expired strictly before `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at < now)
    }
}

/// An inbound register request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub identity: String,
    pub driver: Option<String>,
    pub contact: String,
    /// Lifetime in seconds; 0 never expires
    pub ttl_secs: u32,
}

// ============ Routing Types ============

/// An inbound route request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Calling identity, used to overlay its profile parameters
    pub caller: Option<String>,
    /// Called identity or alias
    pub called: String,
    /// Call parameters as received
    pub params: CallParams,
}

/// Where a routed call should go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Destination {
    /// A single contact
    Single(String),
    /// Several contacts to be dialed in parallel, in alias member order
    Fork(Vec<String>),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Single(contact) => f.write_str(contact),
            Destination::Fork(contacts) => write!(f, "{} {}", FORK_MARKER, contacts.join(" ")),
        }
    }
}

/// Result of resolving a called identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteOutcome {
    /// Destination found
    Routed(Destination),
    /// Identity is known but nothing registered for it
    Offline,
    /// Not an identity or alias this registrar knows
    NoRoute,
}

/// Outcome plus the rewritten call parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResponse {
    pub outcome: RouteOutcome,
    pub params: CallParams,
}

impl RouteResponse {
    /// Destination string as handed to the dialing layer
    pub fn destination(&self) -> Option<String> {
        match &self.outcome {
            RouteOutcome::Routed(dest) => Some(dest.to_string()),
            _ => None,
        }
    }

    /// Whether the host should consider the route request handled
    pub fn is_handled(&self) -> bool {
        matches!(self.outcome, RouteOutcome::Routed(_))
    }
}
