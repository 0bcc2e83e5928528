//! # Regfile Core
//!
//! A file-backed SIP registrar and call router for the rvoip ecosystem.
//!
//! This crate provides:
//! - Plaintext credential lookup from a profile file
//! - Time-limited registrations of identities at contact addresses
//! - Expiry sweeps on a host timer or a background task
//! - Call routing, including alias groups that fork to every registered member
//! - Registration persistence to a TOML section file
//!
//! ```
//! use chrono::Utc;
//! use rvoip_regfile_core::{ProfileFile, Registrar, RouteRequest};
//!
//! let profiles = ProfileFile::parse(r#"
//!     [alice]
//!     alternatives = "sales"
//!
//!     [bob]
//!     alternatives = "sales"
//! "#).unwrap();
//! let registrar = Registrar::new(profiles.config, profiles.directory);
//!
//! let now = Utc::now();
//! registrar.register("alice", None, "sip:alice@x", 3600, now).unwrap();
//! registrar.register("bob", None, "sip:bob@y", 3600, now).unwrap();
//!
//! let route = registrar.route(RouteRequest { called: "sales".into(), ..Default::default() }, now);
//! assert_eq!(route.destination().as_deref(), Some("fork sip:alice@x sip:bob@y"));
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod registrar;
pub mod sections;
pub mod storage;
pub mod types;

pub use storage::{FileStorage, InMemoryStorage, Storage};

// Re-exports for convenience
pub use api::RegfileService;
pub use config::{ProfileFile, RegfileConfig, RegfileConfigBuilder};
pub use error::{RegistrarError, Result};
pub use events::RegistrarEvent;
pub use registrar::{AliasTable, ExpirySweeper, IdentityDirectory, Registrar, Snapshot};
pub use types::{
    CallParams, Destination, RegisterRequest, Registration, RouteOutcome, RouteRequest,
    RouteResponse, StaticProfile, RESERVED_IDENTITY,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
