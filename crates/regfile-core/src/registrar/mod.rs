//! Registration store, alias expansion and routing
//!
//! [`Registrar`] owns the identity directory, the alias table derived from
//! it and the registration table behind one lock. Every operation takes the
//! lock for its whole critical section; nothing inside it blocks except the
//! in-memory work itself. Persistence snapshots are cut under the lock and
//! written after it is released.

pub mod aliases;
pub mod directory;
pub mod expiry;
pub mod registry;
pub mod report;
pub mod router;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::RegfileConfig;
use crate::error::{RegistrarError, Result};
use crate::events::{EventPublisher, RegistrarEvent};
use crate::storage::{RegistrationSet, Storage};
use crate::types::{is_valid_identity, Registration, RouteRequest, RouteResponse};

pub use aliases::AliasTable;
pub use directory::IdentityDirectory;
pub use expiry::ExpirySweeper;
pub use registry::RegistrationTable;
pub use report::Snapshot;

use report::{sanitize_contact, sanitize_identity};
use router::RouteContext;

/// Everything guarded by the registrar lock
struct RegistrarState {
    directory: IdentityDirectory,
    aliases: AliasTable,
    registrations: RegistrationTable,
    /// Bumped on every change to `registrations`
    version: u64,
}

impl RegistrarState {
    fn touch(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

/// File-backed registrar
pub struct Registrar {
    state: Mutex<RegistrarState>,
    config: RegfileConfig,
    storage: Option<Arc<dyn Storage>>,
    /// Version of the last snapshot written to storage
    persisted: Mutex<u64>,
    events: EventPublisher,
}

impl Registrar {
    /// Create a registrar that keeps registrations in memory only
    pub fn new(config: RegfileConfig, directory: IdentityDirectory) -> Self {
        Self::build(config, directory, RegistrationTable::new(), None)
    }

    /// Create a registrar backed by `storage`
    ///
    /// Previously saved registrations are loaded, then pruned against the
    /// directory like after a reload.
    pub fn with_storage(
        config: RegfileConfig,
        directory: IdentityDirectory,
        storage: Arc<dyn Storage>,
    ) -> Result<Self> {
        let registrations = RegistrationTable::from_set(storage.load()?);
        info!("Loaded {} stored registrations", registrations.len());
        Ok(Self::build(config, directory, registrations, Some(storage)))
    }

    fn build(
        config: RegfileConfig,
        directory: IdentityDirectory,
        registrations: RegistrationTable,
        storage: Option<Arc<dyn Storage>>,
    ) -> Self {
        let aliases = AliasTable::build(&directory);
        let registrar = Self {
            state: Mutex::new(RegistrarState {
                directory,
                aliases,
                registrations,
                version: 0,
            }),
            config,
            storage,
            persisted: Mutex::new(0),
            events: EventPublisher::new(),
        };
        {
            let mut state = registrar.state.lock();
            registrar.prune_orphans(&mut state);
        }
        registrar
    }

    pub fn config(&self) -> &RegfileConfig {
        &self.config
    }

    pub fn auto_create(&self) -> bool {
        self.config.auto_create
    }

    /// Subscribe to registration events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistrarEvent> {
        self.events.subscribe()
    }

    // ============ Credential Lookup ============

    /// Password configured for `identity`
    pub fn authenticate(&self, identity: &str) -> Result<String> {
        if !is_valid_identity(identity) {
            return Err(RegistrarError::Unhandled(format!("identity '{}'", identity)));
        }
        let state = self.state.lock();
        let profile = state
            .directory
            .get(identity)
            .ok_or_else(|| RegistrarError::NotFound(identity.to_string()))?;
        let password = profile
            .password
            .clone()
            .ok_or_else(|| RegistrarError::NotFound(format!("no password for {}", identity)))?;
        debug!(
            "Authenticating user {} with password length {}",
            identity,
            password.len()
        );
        Ok(password)
    }

    // ============ Registration Store ============

    /// Register `identity` at `contact` for `ttl_secs` seconds (0 = forever)
    ///
    /// Any previous registration of the identity is replaced entirely. The
    /// expiry is rounded up to a whole second, the precision of the
    /// registration file.
    pub fn register(
        &self,
        identity: &str,
        driver: Option<&str>,
        contact: &str,
        ttl_secs: u32,
        now: DateTime<Utc>,
    ) -> Result<Registration> {
        if !is_valid_identity(identity) {
            return Err(RegistrarError::Unhandled(format!("identity '{}'", identity)));
        }
        if contact.is_empty() {
            return Err(RegistrarError::Rejected(format!("no contact for {}", identity)));
        }

        let ttl = self.config.clamp_ttl(ttl_secs);
        let registration = Registration {
            driver: driver.filter(|d| !d.is_empty()).map(str::to_string),
            contact: contact.to_string(),
            expires_at: (ttl != 0).then(|| expiry_after(now, ttl)),
        };

        let snapshot = {
            let mut state = self.state.lock();
            if !state.directory.contains(identity) {
                if !self.config.auto_create {
                    return Err(RegistrarError::Rejected(format!("unknown user {}", identity)));
                }
                debug!("Auto creating new user {}", identity);
            }
            state.registrations.upsert(identity, registration.clone());
            let version = state.touch();
            self.events.publish(RegistrarEvent::UserRegistered {
                user: identity.to_string(),
                contact: registration.contact.clone(),
                expires_at: registration.expires_at,
            });
            self.config
                .persist_on_change
                .then(|| (version, state.registrations.to_set()))
        };

        debug!("Registered user {} via {}", identity, contact);
        if let Some((version, set)) = snapshot {
            self.persist(version, &set);
        }
        Ok(registration)
    }

    /// Remove the registration of `identity`
    pub fn unregister(&self, identity: &str) -> Result<Registration> {
        if !is_valid_identity(identity) {
            return Err(RegistrarError::Unhandled(format!("identity '{}'", identity)));
        }

        let (removed, snapshot) = {
            let mut state = self.state.lock();
            let removed = state
                .registrations
                .remove(identity)
                .ok_or_else(|| RegistrarError::NotFound(identity.to_string()))?;
            let version = state.touch();
            self.events.publish(RegistrarEvent::UserUnregistered {
                user: identity.to_string(),
            });
            let snapshot = self
                .config
                .persist_on_change
                .then(|| (version, state.registrations.to_set()));
            (removed, snapshot)
        };

        debug!("Removing user {}, reason: unregistered", identity);
        if let Some((version, set)) = snapshot {
            self.persist(version, &set);
        }
        Ok(removed)
    }

    /// Current registration of `identity`, expired or not
    pub fn lookup(&self, identity: &str) -> Option<Registration> {
        self.state.lock().registrations.get(identity).cloned()
    }

    /// Drop registrations that expired before `now`
    ///
    /// Storage is written once afterwards, and only when registrations
    /// remain; an emptied table is never saved by a sweep.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let (removed, snapshot) = {
            let mut state = self.state.lock();
            let expired = state.registrations.sweep_expired(now);
            let version = if expired.is_empty() {
                state.version
            } else {
                state.touch()
            };
            for user in &expired {
                self.events.publish(RegistrarEvent::RegistrationExpired { user: user.clone() });
            }
            let snapshot =
                (!state.registrations.is_empty()).then(|| (version, state.registrations.to_set()));
            (expired.len(), snapshot)
        };

        if removed > 0 {
            info!("Expired {} registrations", removed);
        }
        if let Some((version, set)) = snapshot {
            self.persist(version, &set);
        }
        removed
    }

    // ============ Directory ============

    /// Swap in a new directory and rebuild the alias table
    ///
    /// Runs under the lock as one step together with orphan pruning, so a
    /// concurrent route never sees a half-built alias table. Returns the
    /// number of pruned registrations.
    pub fn reload(&self, directory: IdentityDirectory) -> usize {
        let (pruned, snapshot) = {
            let mut state = self.state.lock();
            state.aliases = AliasTable::build(&directory);
            state.directory = directory;
            let pruned = self.prune_orphans(&mut state);
            self.events.publish(RegistrarEvent::DirectoryReloaded {
                profiles: state.directory.len(),
                aliases: state.aliases.len(),
            });
            info!(
                "Reloaded {} profiles, {} aliases",
                state.directory.len(),
                state.aliases.len()
            );
            let snapshot = (pruned > 0 && self.config.persist_on_change)
                .then(|| (state.version, state.registrations.to_set()));
            (pruned, snapshot)
        };

        if let Some((version, set)) = snapshot {
            self.persist(version, &set);
        }
        pruned
    }

    /// Drop registrations whose identity has no profile, unless auto-create
    /// made them legitimate
    fn prune_orphans(&self, state: &mut RegistrarState) -> usize {
        if self.config.auto_create {
            return 0;
        }
        let RegistrarState {
            directory,
            registrations,
            ..
        } = &mut *state;
        let pruned = registrations.prune(|identity| directory.contains(identity));
        if !pruned.is_empty() {
            state.touch();
        }
        for user in &pruned {
            self.events.publish(RegistrarEvent::RegistrationPruned { user: user.clone() });
        }
        pruned.len()
    }

    /// Number of configured identities
    pub fn profile_count(&self) -> usize {
        self.state.lock().directory.len()
    }

    // ============ Router ============

    /// Resolve a route request at time `now`
    pub fn route(&self, request: RouteRequest, now: DateTime<Utc>) -> RouteResponse {
        let state = self.state.lock();
        RouteContext {
            directory: &state.directory,
            aliases: &state.aliases,
            registrations: &state.registrations,
        }
        .route(request, now)
    }

    // ============ Reporting ============

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.lock();
        Snapshot {
            auto_create: self.config.auto_create,
            defined: state.directory.len(),
            registered: state.registrations.len(),
            users: state
                .registrations
                .iter()
                .filter(|(_, reg)| !reg.contact.is_empty())
                .map(|(identity, reg)| {
                    (sanitize_identity(identity), sanitize_contact(&reg.contact))
                })
                .collect(),
        }
    }

    // ============ Persistence ============

    /// Save the registrations if any are held; used at shutdown
    pub fn flush(&self) -> bool {
        let (version, set) = {
            let state = self.state.lock();
            if state.registrations.is_empty() {
                return false;
            }
            (state.version, state.registrations.to_set())
        };
        self.persist(version, &set)
    }

    /// Write `set` unless a newer snapshot was already written
    ///
    /// Storage errors are logged, never returned: persistence is
    /// best effort from the registrar's point of view.
    fn persist(&self, version: u64, set: &RegistrationSet) -> bool {
        let Some(storage) = &self.storage else {
            return false;
        };
        let mut persisted = self.persisted.lock();
        if version < *persisted {
            return false;
        }
        match storage.save(set) {
            Ok(()) => {
                *persisted = version;
                true
            }
            Err(e) => {
                warn!("Failed to save registrations: {}", e);
                false
            }
        }
    }
}

/// `now + ttl_secs`, rounded up to a whole second
fn expiry_after(now: DateTime<Utc>, ttl_secs: u32) -> DateTime<Utc> {
    let at = now + Duration::seconds(i64::from(ttl_secs));
    if at.timestamp_subsec_nanos() == 0 {
        return at;
    }
    DateTime::<Utc>::from_timestamp(at.timestamp() + 1, 0).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegfileConfigBuilder;
    use crate::storage::file::{decode_registrations, encode_registrations};
    use crate::storage::InMemoryStorage;
    use crate::types::{Destination, RouteOutcome, StaticProfile};

    fn directory(entries: &[(&str, Option<&str>, &[&str])]) -> IdentityDirectory {
        entries
            .iter()
            .map(|(identity, password, alternatives)| {
                (
                    identity.to_string(),
                    StaticProfile {
                        password: password.map(str::to_string),
                        alternatives: alternatives.iter().map(|s| s.to_string()).collect(),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    fn sample() -> IdentityDirectory {
        directory(&[
            ("alice", Some("wonderland"), &["sales"]),
            ("bob", None, &["sales"]),
            ("charlie", Some("chocolate"), &[]),
        ])
    }

    #[test]
    fn test_authenticate() {
        let registrar = Registrar::new(RegfileConfig::default(), sample());
        assert_eq!(registrar.authenticate("alice").unwrap(), "wonderland");
        assert!(matches!(registrar.authenticate("bob"), Err(RegistrarError::NotFound(_))));
        assert!(matches!(registrar.authenticate("zoe"), Err(RegistrarError::NotFound(_))));
        assert!(registrar.authenticate("general").unwrap_err().is_unhandled());
        assert!(registrar.authenticate("").unwrap_err().is_unhandled());
    }

    #[test]
    fn test_register_validation() {
        let registrar = Registrar::new(RegfileConfig::default(), sample());
        let now = Utc::now();

        assert!(registrar.register("", None, "sip:x@y", 60, now).unwrap_err().is_unhandled());
        assert!(registrar
            .register("general", None, "sip:x@y", 60, now)
            .unwrap_err()
            .is_unhandled());
        assert!(matches!(
            registrar.register("alice", None, "", 60, now),
            Err(RegistrarError::Rejected(_))
        ));
        assert!(matches!(
            registrar.register("zoe", None, "sip:zoe@z", 60, now),
            Err(RegistrarError::Rejected(_))
        ));

        let reg = registrar.register("alice", Some("sip"), "sip:alice@x", 60, now).unwrap();
        let expires_at = reg.expires_at.unwrap();
        assert!(expires_at >= now + Duration::seconds(60));
        assert!(expires_at < now + Duration::seconds(61));
        assert_eq!(registrar.lookup("alice"), Some(reg));
    }

    #[test]
    fn test_register_auto_create() {
        let config = RegfileConfigBuilder::new().auto_create(true).build();
        let registrar = Registrar::new(config, sample());
        let now = Utc::now();

        registrar.register("zoe", None, "sip:zoe@z", 0, now).unwrap();
        assert_eq!(registrar.lookup("zoe").unwrap().expires_at, None);
        // self-created identities do not join the directory
        assert_eq!(registrar.profile_count(), 3);
        assert_eq!(
            registrar.route(RouteRequest { called: "zoe".into(), ..Default::default() }, now).outcome,
            RouteOutcome::Routed(crate::types::Destination::Single("sip:zoe@z".into()))
        );
    }

    #[test]
    fn test_expiry_survives_registration_file() {
        let registrar = Registrar::new(RegfileConfig::default(), sample());
        let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 250_000_000).unwrap();

        let reg = registrar.register("alice", None, "sip:alice@x", 60, now).unwrap();
        assert_eq!(reg.expires_at.unwrap().timestamp(), 1_700_000_061);
        assert_eq!(reg.expires_at.unwrap().timestamp_subsec_nanos(), 0);

        let set = registrar.state.lock().registrations.to_set();
        let stored = decode_registrations(encode_registrations(&set));
        assert_eq!(stored["alice"], reg);

        let whole = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(
            expiry_after(whole, 60),
            DateTime::<Utc>::from_timestamp(1_700_000_060, 0).unwrap()
        );
    }

    #[test]
    fn test_unregister() {
        let registrar = Registrar::new(RegfileConfig::default(), sample());
        let now = Utc::now();
        registrar.register("bob", None, "sip:bob@y", 0, now).unwrap();

        assert_eq!(registrar.unregister("bob").unwrap().contact, "sip:bob@y");
        assert!(matches!(registrar.unregister("bob"), Err(RegistrarError::NotFound(_))));
        assert!(registrar.unregister("general").unwrap_err().is_unhandled());
        assert!(registrar.lookup("bob").is_none());
    }

    #[test]
    fn test_sweep_persists_only_non_empty_store() {
        let storage = Arc::new(InMemoryStorage::new());
        let config = RegfileConfigBuilder::new().persist_on_change(false).build();
        let registrar = Registrar::with_storage(config, sample(), storage.clone()).unwrap();
        let t0 = Utc::now();

        registrar.register("alice", None, "sip:alice@x", 30, t0).unwrap();
        assert_eq!(registrar.sweep_expired(t0 + Duration::seconds(31)), 1);
        assert_eq!(storage.save_count(), 0);

        registrar.register("alice", None, "sip:alice@x", 30, t0).unwrap();
        registrar.register("bob", None, "sip:bob@y", 0, t0).unwrap();
        assert_eq!(registrar.sweep_expired(t0 + Duration::seconds(31)), 1);
        assert_eq!(storage.save_count(), 1);
        let saved = storage.snapshot();
        assert_eq!(saved.len(), 1);
        assert!(saved.contains_key("bob"));
    }

    #[test]
    fn test_register_persists_on_change() {
        let storage = Arc::new(InMemoryStorage::new());
        let registrar =
            Registrar::with_storage(RegfileConfig::default(), sample(), storage.clone()).unwrap();

        registrar.register("alice", None, "sip:alice@x", 0, Utc::now()).unwrap();
        assert_eq!(storage.save_count(), 1);
        registrar.unregister("alice").unwrap();
        assert_eq!(storage.save_count(), 2);
        assert!(storage.snapshot().is_empty());
    }

    #[test]
    fn test_stored_orphans_are_pruned_on_load() {
        let mut set = RegistrationSet::new();
        for identity in ["alice", "mallory"] {
            set.insert(
                identity.to_string(),
                Registration {
                    driver: None,
                    contact: format!("sip:{}@x", identity),
                    expires_at: None,
                },
            );
        }
        let storage = Arc::new(InMemoryStorage::with_registrations(set));
        let registrar =
            Registrar::with_storage(RegfileConfig::default(), sample(), storage).unwrap();

        assert!(registrar.lookup("alice").is_some());
        assert!(registrar.lookup("mallory").is_none());
    }

    #[test]
    fn test_reload_prunes_and_rebuilds_aliases() {
        let registrar = Registrar::new(RegfileConfig::default(), sample());
        let now = Utc::now();
        registrar.register("alice", None, "sip:alice@x", 0, now).unwrap();
        registrar.register("bob", None, "sip:bob@y", 0, now).unwrap();

        let mut events = registrar.subscribe();
        let pruned = registrar.reload(directory(&[("bob", None, &["support"])]));
        assert_eq!(pruned, 1);
        assert!(registrar.lookup("alice").is_none());
        assert_eq!(
            events.try_recv().unwrap(),
            RegistrarEvent::RegistrationPruned { user: "alice".to_string() }
        );

        let sales = RouteRequest { called: "sales".into(), ..Default::default() };
        assert_eq!(registrar.route(sales, now).outcome, RouteOutcome::NoRoute);
        let support = RouteRequest { called: "support".into(), ..Default::default() };
        assert_eq!(
            registrar.route(support, now).destination().as_deref(),
            Some("sip:bob@y")
        );
    }

    #[test]
    fn test_concurrent_reload_never_mixes_alias_groups() {
        let east = directory(&[("alice", None, &["sales"]), ("bob", None, &["sales"])]);
        let west = directory(&[("carol", None, &["sales"]), ("dave", None, &["sales"])]);
        // auto-create keeps the other side's registrations across reloads
        let config = RegfileConfigBuilder::new().auto_create(true).build();
        let registrar = Registrar::new(config, east.clone());
        let now = Utc::now();
        for identity in ["alice", "bob", "carol", "dave"] {
            let contact = format!("sip:{}@x", identity);
            registrar.register(identity, None, &contact, 0, now).unwrap();
        }

        let east_fork = Destination::Fork(vec!["sip:alice@x".into(), "sip:bob@x".into()]);
        let west_fork = Destination::Fork(vec!["sip:carol@x".into(), "sip:dave@x".into()]);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..500 {
                    let next = if i % 2 == 0 { west.clone() } else { east.clone() };
                    assert_eq!(registrar.reload(next), 0);
                }
            });

            for _ in 0..3 {
                scope.spawn(|| {
                    for _ in 0..500 {
                        let request = RouteRequest {
                            called: "sales".into(),
                            ..Default::default()
                        };
                        match registrar.route(request, now).outcome {
                            RouteOutcome::Routed(dest) => {
                                assert!(dest == east_fork || dest == west_fork, "mixed: {}", dest)
                            }
                            other => panic!("unexpected outcome {:?}", other),
                        }
                    }
                });
            }

            scope.spawn(|| {
                for _ in 0..500 {
                    registrar.register("erin", None, "sip:erin@x", 0, now).unwrap();
                    registrar.unregister("erin").unwrap();
                }
            });
        });

        assert!(registrar.lookup("erin").is_none());
        assert_eq!(registrar.snapshot().registered, 4);
    }

    #[test]
    fn test_concurrent_registrations_are_serialized() {
        let storage = Arc::new(InMemoryStorage::new());
        let config = RegfileConfigBuilder::new().auto_create(true).build();
        let registrar = Registrar::with_storage(config, sample(), storage.clone()).unwrap();
        let now = Utc::now();

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let registrar = &registrar;
                scope.spawn(move || {
                    for n in 0..100 {
                        let identity = format!("user{}-{}", worker, n);
                        let contact = format!("sip:{}@x", identity);
                        registrar.register(&identity, None, &contact, 0, now).unwrap();
                        if n % 2 == 1 {
                            registrar.unregister(&identity).unwrap();
                        }
                    }
                });
            }
        });

        assert_eq!(registrar.snapshot().registered, 200);
        // a stale snapshot may be skipped, but the newest always lands
        assert!(storage.save_count() <= 600);
        assert_eq!(storage.snapshot().len(), 200);
    }

    #[test]
    fn test_snapshot() {
        let registrar = Registrar::new(RegfileConfig::default(), sample());
        registrar.register("alice", None, "sip:alice@x,evil", 0, Utc::now()).unwrap();

        let snapshot = registrar.snapshot();
        assert_eq!(snapshot.defined, 3);
        assert_eq!(snapshot.registered, 1);
        assert_eq!(snapshot.users, vec![("alice".to_string(), "sip:alice@x?evil".to_string())]);
    }

    #[test]
    fn test_snapshot_sanitizes_auto_created_identities() {
        let config = RegfileConfigBuilder::new().auto_create(true).build();
        let registrar = Registrar::new(config, sample());
        registrar
            .register("eve=x,mallory\r\n", None, "sip:eve@e", 0, Utc::now())
            .unwrap();

        let snapshot = registrar.snapshot();
        assert_eq!(
            snapshot.users,
            vec![("eve?x?mallory??".to_string(), "sip:eve@e".to_string())]
        );
        assert_eq!(
            snapshot.render(true),
            "name=regfile,type=misc;create=true,defined=3,users=1;eve?x?mallory??=sip:eve@e\r\n"
        );
    }
}
