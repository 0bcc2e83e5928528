//! Storage trait for registration persistence

pub mod file;

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;
use crate::types::Registration;

pub use file::FileStorage;

/// Registrations keyed by identity, in insertion order
pub type RegistrationSet = IndexMap<String, Registration>;

/// Abstract storage interface for registrations
///
/// The registrar always hands over a complete snapshot; implementations
/// replace whatever they held before.
pub trait Storage: Send + Sync {
    /// Load every persisted registration
    fn load(&self) -> Result<RegistrationSet>;

    /// Replace the persisted registrations with `registrations`
    fn save(&self, registrations: &RegistrationSet) -> Result<()>;
}

/// Storage kept in process memory
#[derive(Default)]
pub struct InMemoryStorage {
    saved: Mutex<RegistrationSet>,
    saves: AtomicUsize,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing set of registrations
    pub fn with_registrations(registrations: RegistrationSet) -> Self {
        Self {
            saved: Mutex::new(registrations),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of times `save` has been called
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Copy of the last saved snapshot
    pub fn snapshot(&self) -> RegistrationSet {
        self.saved.lock().clone()
    }
}

impl Storage for InMemoryStorage {
    fn load(&self) -> Result<RegistrationSet> {
        Ok(self.saved.lock().clone())
    }

    fn save(&self, registrations: &RegistrationSet) -> Result<()> {
        *self.saved.lock() = registrations.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
