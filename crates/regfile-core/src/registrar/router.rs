//! Call routing
//!
//! Resolution order for a called identity:
//!
//! 1. its own live registration
//! 2. offline, if it has a profile but no live registration
//! 3. the live registrations of the alias group it names
//!
//! Before resolving, the caller's profile parameters are overlaid on the
//! call parameters.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{AliasTable, IdentityDirectory, RegistrationTable};
use crate::types::{
    is_valid_identity, CallParams, Destination, RouteOutcome, RouteRequest, RouteResponse,
    PARAM_DRIVER, PARAM_ERROR,
};

/// Value of the `error` parameter for a known but unreachable identity
pub const ERROR_OFFLINE: &str = "offline";

/// Read-only view of the tables a route decision needs
pub(crate) struct RouteContext<'a> {
    pub directory: &'a IdentityDirectory,
    pub aliases: &'a AliasTable,
    pub registrations: &'a RegistrationTable,
}

impl RouteContext<'_> {
    pub fn route(&self, request: RouteRequest, now: DateTime<Utc>) -> RouteResponse {
        let RouteRequest {
            caller,
            called,
            mut params,
        } = request;

        if let Some(caller) = caller.as_deref() {
            self.overlay_caller_profile(caller, &mut params);
        }

        let outcome = self.resolve(&called, &mut params, now);
        match &outcome {
            RouteOutcome::Routed(dest) => debug!("Routed '{}' via '{}'", called, dest),
            RouteOutcome::Offline => {
                params.insert(PARAM_ERROR.to_string(), ERROR_OFFLINE.to_string());
                debug!("'{}' is offline", called);
            }
            RouteOutcome::NoRoute => debug!("No route for '{}'", called),
        }

        RouteResponse { outcome, params }
    }

    fn overlay_caller_profile(&self, caller: &str, params: &mut CallParams) {
        let Some(profile) = self.directory.get(caller) else {
            return;
        };
        for (name, template) in &profile.params {
            let value = substitute_params(template, params);
            params.insert(name.clone(), value);
        }
    }

    fn resolve(&self, called: &str, params: &mut CallParams, now: DateTime<Utc>) -> RouteOutcome {
        if !is_valid_identity(called) {
            return RouteOutcome::NoRoute;
        }

        if let Some(reg) = self.registrations.live(called, now) {
            match &reg.driver {
                Some(driver) => {
                    params.insert(PARAM_DRIVER.to_string(), driver.clone());
                }
                None => {
                    params.shift_remove(PARAM_DRIVER);
                }
            }
            return RouteOutcome::Routed(Destination::Single(reg.contact.clone()));
        }

        if self.directory.contains(called) {
            return RouteOutcome::Offline;
        }

        let Some(members) = self.aliases.resolve(called) else {
            return RouteOutcome::NoRoute;
        };

        let mut contacts: Vec<String> = members
            .iter()
            .filter_map(|member| self.registrations.live(member, now))
            .map(|reg| reg.contact.clone())
            .collect();

        match contacts.len() {
            0 => RouteOutcome::Offline,
            1 => RouteOutcome::Routed(Destination::Single(contacts.remove(0))),
            _ => RouteOutcome::Routed(Destination::Fork(contacts)),
        }
    }
}

/// Replace every `${name}` in `template` with the value of call parameter
/// `name`, or nothing when it is not set
///
/// This is a single pass: substituted text is never scanned again, so a
/// parameter whose value contains `${...}` is inserted literally. An
/// unterminated `${` is kept as written.
pub fn substitute_params(template: &str, params: &CallParams) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                if let Some(value) = params.get(after[..end].trim()) {
                    out.push_str(value);
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
