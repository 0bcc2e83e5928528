//! Line-oriented console
//!
//! A minimal text front end for [`RegfileService`], one command per line:
//!
//! ```text
//! auth alice
//! register alice sip:alice@192.168.1.100 3600 sip
//! unregister alice
//! route sales caller=bob
//! status [module] [brief]
//! json
//! tick
//! reload
//! ```

use crate::error::{RegistrarError, Result};
use crate::types::{CallParams, RegisterRequest, RouteOutcome, RouteRequest};

use super::RegfileService;

/// A parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Auth(String),
    Register(RegisterRequest),
    Unregister(String),
    Route(RouteRequest),
    Status { module: Option<String>, details: bool },
    Json,
    Tick,
    Reload,
    Help,
}

const USAGE: &str = "commands: auth <user> | register <user> <contact> [ttl] [driver] | \
unregister <user> | route <called> [name=value ...] | status [module] [brief] | json | tick | reload";

impl Command {
    /// Parse one input line; blank lines parse to `None`
    pub fn parse(line: &str) -> Result<Option<Command>> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (verb, args.as_slice()) {
            ("auth", [identity]) => Command::Auth(identity.to_string()),
            ("register", [identity, contact, rest @ ..]) if rest.len() <= 2 => {
                let ttl_secs = match rest.first() {
                    Some(ttl) => ttl.parse::<u32>().map_err(|_| {
                        RegistrarError::Rejected(format!("bad ttl '{}'", ttl))
                    })?,
                    None => 0,
                };
                Command::Register(RegisterRequest {
                    identity: identity.to_string(),
                    driver: rest.get(1).map(|d| d.to_string()),
                    contact: contact.to_string(),
                    ttl_secs,
                })
            }
            ("unregister", [identity]) => Command::Unregister(identity.to_string()),
            ("route", [called, pairs @ ..]) => {
                let mut params = CallParams::new();
                for pair in pairs {
                    let (name, value) = pair.split_once('=').ok_or_else(|| {
                        RegistrarError::Rejected(format!("expected name=value, got '{}'", pair))
                    })?;
                    params.insert(name.to_string(), value.to_string());
                }
                Command::Route(RouteRequest {
                    caller: params.get("caller").cloned(),
                    called: called.to_string(),
                    params,
                })
            }
            ("status", rest) if rest.len() <= 2 => {
                let details = !rest.contains(&"brief");
                let module = rest.iter().find(|w| **w != "brief").map(|m| m.to_string());
                Command::Status { module, details }
            }
            ("json", []) => Command::Json,
            ("tick", []) => Command::Tick,
            ("reload", []) => Command::Reload,
            ("help", _) => Command::Help,
            _ => return Err(RegistrarError::Rejected(format!("cannot parse '{}'", line.trim()))),
        };
        Ok(Some(command))
    }
}

/// Run `command` against `service` and describe the result
pub fn execute(service: &RegfileService, command: Command) -> String {
    match command {
        Command::Auth(identity) => match service.handle_auth(&identity) {
            Some(password) => format!("password={}", password),
            None => "unhandled".to_string(),
        },
        Command::Register(request) => match service.handle_register(request) {
            Ok(reg) => match reg.expires_at {
                Some(at) => format!("registered until {}", at.to_rfc3339()),
                None => "registered".to_string(),
            },
            Err(e) => format!("error: {}", e),
        },
        Command::Unregister(identity) => match service.handle_unregister(&identity) {
            Ok(reg) => format!("unregistered {}", reg.contact),
            Err(e) => format!("error: {}", e),
        },
        Command::Route(request) => {
            let response = service.handle_route(request);
            let params = response
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(" ");
            let head = match &response.outcome {
                RouteOutcome::Routed(dest) => format!("routed {}", dest),
                RouteOutcome::Offline => "offline".to_string(),
                RouteOutcome::NoRoute => "noroute".to_string(),
            };
            if params.is_empty() {
                head
            } else {
                format!("{} [{}]", head, params)
            }
        }
        Command::Status { module, details } => service
            .handle_status(module.as_deref(), details)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|| "unhandled".to_string()),
        Command::Json => match serde_json::to_string(&service.registrar().snapshot()) {
            Ok(json) => json,
            Err(e) => format!("error: {}", RegistrarError::from(e)),
        },
        Command::Tick => match service.handle_timer_tick() {
            Some(removed) => format!("swept {}", removed),
            None => "tick".to_string(),
        },
        Command::Reload => match service.reload() {
            Ok(pruned) => format!("reloaded, pruned {}", pruned),
            Err(e) => format!("error: {}", e),
        },
        Command::Help => USAGE.to_string(),
    }
}
