//! Host-facing service
//!
//! [`RegfileService`] exposes one handler per inbound event kind and owns
//! the lifecycle of the registrar: construction from a profile file,
//! background expiry, directory reload and the final flush at shutdown.

pub mod console;

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{ProfileFile, RegfileConfig};
use crate::error::{RegistrarError, Result};
use crate::registrar::report::{MODULE_NAME, MODULE_TYPE};
use crate::registrar::{ExpirySweeper, IdentityDirectory, Registrar};
use crate::storage::{FileStorage, Storage};
use crate::types::{RegisterRequest, Registration, RouteRequest, RouteResponse};

/// Registrar service driven by the host's event dispatch
pub struct RegfileService {
    registrar: Arc<Registrar>,
    sweeper: Arc<ExpirySweeper>,
    profile_path: Option<PathBuf>,
}

impl RegfileService {
    /// Create a service from settings and a directory
    ///
    /// Registrations are stored in `config.file` when it is set.
    pub fn new(config: RegfileConfig, directory: IdentityDirectory) -> Result<Self> {
        config.validate()?;
        let registrar = match &config.file {
            Some(path) => {
                let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(path));
                Registrar::with_storage(config, directory, storage)?
            }
            None => Registrar::new(config, directory),
        };
        Ok(Self::with_registrar(Arc::new(registrar)))
    }

    /// Create a service from a profile file, remembering it for reloads
    pub fn from_profile_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ProfileFile { config, directory } = ProfileFile::load(path)?;
        info!(
            "Loaded {} profiles from {} (autocreate={})",
            directory.len(),
            path.display(),
            config.auto_create
        );
        let mut service = Self::new(config, directory)?;
        service.profile_path = Some(path.to_path_buf());
        Ok(service)
    }

    /// Wrap an existing registrar
    pub fn with_registrar(registrar: Arc<Registrar>) -> Self {
        let sweeper = Arc::new(ExpirySweeper::new(registrar.clone()));
        Self {
            registrar,
            sweeper,
            profile_path: None,
        }
    }

    pub fn registrar(&self) -> &Arc<Registrar> {
        &self.registrar
    }

    // ============ Lifecycle ============

    /// Start the background expiry task; needs a Tokio runtime
    pub fn start(&self) {
        self.sweeper.start(self.registrar.config().sweep_interval());
    }

    /// Re-read the profile file and swap in its directory
    ///
    /// Settings in `[general]` are only read at construction; a reload
    /// replaces profiles and aliases. Returns the number of registrations
    /// pruned because their identity disappeared.
    pub fn reload(&self) -> Result<usize> {
        let path = self.profile_path.as_deref().ok_or_else(|| {
            RegistrarError::ConfigError("service was not created from a profile file".to_string())
        })?;
        let ProfileFile { directory, .. } = ProfileFile::load(path)?;
        Ok(self.registrar.reload(directory))
    }

    /// Swap in a directory obtained elsewhere
    pub fn reload_directory(&self, directory: IdentityDirectory) -> usize {
        self.registrar.reload(directory)
    }

    /// Stop the expiry task and save registrations
    pub fn shutdown(&self) {
        self.sweeper.stop();
        if self.registrar.flush() {
            info!("Saved registrations at shutdown");
        }
    }

    // ============ Event Handlers ============

    /// Authentication request; `None` lets another handler answer
    pub fn handle_auth(&self, identity: &str) -> Option<String> {
        self.registrar.authenticate(identity).ok()
    }

    pub fn handle_register(&self, request: RegisterRequest) -> Result<Registration> {
        self.registrar.register(
            &request.identity,
            request.driver.as_deref(),
            &request.contact,
            request.ttl_secs,
            Utc::now(),
        )
    }

    pub fn handle_unregister(&self, identity: &str) -> Result<Registration> {
        self.registrar.unregister(identity)
    }

    pub fn handle_route(&self, request: RouteRequest) -> RouteResponse {
        self.registrar.route(request, Utc::now())
    }

    /// Status request, optionally addressed to one module
    ///
    /// Answers for no module, `regfile` or `misc`; anything else is left
    /// to other handlers.
    pub fn handle_status(&self, module: Option<&str>, details: bool) -> Option<String> {
        match module {
            None | Some("") | Some(MODULE_NAME) | Some(MODULE_TYPE) => {}
            Some(other) => {
                debug!("Ignoring status request for module {}", other);
                return None;
            }
        }
        Some(self.registrar.snapshot().render(details))
    }

    /// One tick of the host's recurring timer
    pub fn handle_timer_tick(&self) -> Option<usize> {
        self.sweeper.tick()
    }
}
