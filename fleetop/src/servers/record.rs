//! One monitored peer and its live, independently updated state.

use std::{collections::BTreeMap, fmt, str::FromStr};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerStatus {
    #[default]
    Unknown,
    Online,
    Offline,
    Protected,
    Snmp,
}

impl ServerStatus {
    /// Position used by the overview's status sort.
    pub fn sort_priority(self) -> u8 {
        match self {
            ServerStatus::Unknown => 0,
            ServerStatus::Offline => 1,
            ServerStatus::Protected => 2,
            ServerStatus::Snmp => 3,
            ServerStatus::Online => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServerStatus::Unknown => "UNKNOWN",
            ServerStatus::Online => "ONLINE",
            ServerStatus::Offline => "OFFLINE",
            ServerStatus::Protected => "PROTECTED",
            ServerStatus::Snmp => "SNMP",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Rpc,
    Rest,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Rpc => "rpc",
            Protocol::Rest => "rest",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Rpc => 61209,
            Protocol::Rest => 61208,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rpc" => Ok(Protocol::Rpc),
            "rest" => Ok(Protocol::Rest),
            other => Err(format!("unknown protocol '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Origin {
    Static,
    Dynamic,
}

/// Mutable part of a record. Guarded per record so one slow peer never blocks another.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerState {
    pub status: ServerStatus,
    /// Wire digest of the password, never clear text. `None` until resolved.
    #[serde(skip)]
    pub password: Option<String>,
    pub cpu_percent: Option<String>,
    pub mem_percent: Option<f64>,
    pub load_min5: Option<f64>,
    pub hr_name: Option<String>,
    /// Configured columns beyond the built-in summary fields, keyed `plugin_field[_key]`.
    pub extra: BTreeMap<String, Value>,
}

/// Write routed through the merged list by index.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerField {
    Status(ServerStatus),
    Password(Option<String>),
}

#[derive(Debug)]
pub struct ServerRecord {
    pub key: String,
    pub name: String,
    pub alias: Option<String>,
    pub ip: String,
    pub port: u16,
    pub protocol: Protocol,
    pub origin: Origin,
    pub username: String,
    state: RwLock<ServerState>,
}

pub const DEFAULT_USERNAME: &str = "glances";

impl ServerRecord {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        ip: impl Into<String>,
        port: u16,
        protocol: Protocol,
        origin: Origin,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            alias: None,
            ip: ip.into(),
            port,
            protocol,
            origin,
            username: DEFAULT_USERNAME.to_string(),
            state: RwLock::new(ServerState::default()),
        }
    }

    pub fn with_alias(mut self, alias: Option<String>) -> Self {
        self.alias = alias;
        self
    }

    /// Name shown in the overview.
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Base URI without credentials; safe to log.
    pub fn uri(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }

    pub fn snapshot(&self) -> ServerState {
        self.state.read().clone()
    }

    pub fn status(&self) -> ServerStatus {
        self.state.read().status
    }

    pub fn password(&self) -> Option<String> {
        self.state.read().password.clone()
    }

    pub fn set_status(&self, status: ServerStatus) {
        self.state.write().status = status;
    }

    pub fn set_password(&self, password: Option<String>) {
        self.state.write().password = password;
    }

    pub fn set(&self, field: ServerField) {
        match field {
            ServerField::Status(s) => self.set_status(s),
            ServerField::Password(p) => self.set_password(p),
        }
    }

    /// Apply a closure under the record's write lock.
    pub fn update<F: FnOnce(&mut ServerState)>(&self, f: F) {
        f(&mut self.state.write());
    }

    /// Same identity and address: a re-announcement that needs no reset.
    pub fn same_endpoint(&self, other: &ServerRecord) -> bool {
        self.ip == other.ip && self.port == other.port && self.protocol == other.protocol
    }

    /// Carry cached state over to a replacement record.
    pub fn inherit_state(&self, from: &ServerRecord) {
        *self.state.write() = from.snapshot();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_parsing_is_case_insensitive() {
        assert_eq!("RPC".parse::<Protocol>(), Ok(Protocol::Rpc));
        assert_eq!(" rest ".parse::<Protocol>(), Ok(Protocol::Rest));
        assert!("soap".parse::<Protocol>().is_err());
    }

    #[test]
    fn fields_are_set_independently() {
        let r = ServerRecord::new("a:1", "a", "10.0.0.1", 1, Protocol::Rpc, Origin::Static);
        r.update(|s| s.cpu_percent = Some("12.0".into()));
        r.set(ServerField::Status(ServerStatus::Online));
        let snap = r.snapshot();
        assert_eq!(snap.status, ServerStatus::Online);
        assert_eq!(snap.cpu_percent.as_deref(), Some("12.0"));
        assert!(snap.password.is_none());
    }

    #[test]
    fn alias_wins_for_display() {
        let r = ServerRecord::new("a:1", "a", "10.0.0.1", 1, Protocol::Rpc, Origin::Static)
            .with_alias(Some("Alpha".into()));
        assert_eq!(r.display_name(), "Alpha");
        assert_eq!(r.uri(), "http://10.0.0.1:1");
    }
}
