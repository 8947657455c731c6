//! Connection layer to a monitoring agent. Two wire protocols (XML-RPC and REST) sit behind
//! one [`RemoteServer`] capability; callers switch on [`RemoteError`] rather than on protocol.

pub mod rest;
pub mod rpc;
pub mod xmlrpc;

use std::{net::Ipv6Addr, time::Duration};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::servers::{Protocol, ServerRecord};

pub use rest::RestServer;
pub use rpc::RpcServer;

/// REST API version prefix (`/api/<N>`).
pub const API_VERSION: &str = "4";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    /// Connection refused, timeout, name resolution failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The peer rejected our credentials.
    #[error("authentication failed (HTTP {0})")]
    Auth(u16),
    /// The peer answered with something we cannot use.
    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type ProtocolOutcome<T> = Result<T, RemoteError>;

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() || e.is_body() {
            RemoteError::Protocol(e.to_string())
        } else {
            RemoteError::Transport(e.to_string())
        }
    }
}

pub(crate) fn check_status(status: StatusCode) -> ProtocolOutcome<()> {
    if status == StatusCode::UNAUTHORIZED {
        Err(RemoteError::Auth(status.as_u16()))
    } else if !status.is_success() {
        Err(RemoteError::Protocol(format!("HTTP {status}")))
    } else {
        Ok(())
    }
}

pub(crate) fn parse_json(text: &str) -> ProtocolOutcome<Value> {
    serde_json::from_str(text).map_err(|e| RemoteError::Protocol(format!("bad JSON: {e}")))
}

pub(crate) fn plugin_list(v: Value) -> ProtocolOutcome<Vec<String>> {
    serde_json::from_value(v).map_err(|e| RemoteError::Protocol(format!("bad plugin list: {e}")))
}

#[async_trait]
pub trait RemoteServer: Send + Sync {
    /// Credential-free base URI, safe to log.
    fn uri(&self) -> &str;

    /// Server version string.
    async fn init(&self) -> ProtocolOutcome<String>;

    /// Full metrics blob.
    async fn get_all(&self) -> ProtocolOutcome<Value>;

    async fn get_all_plugins(&self) -> ProtocolOutcome<Vec<String>>;

    /// One plugin's fields (object, or list of items for multi-instance plugins).
    async fn get_plugin(&self, plugin: &str) -> ProtocolOutcome<Value>;

    /// Per-field decorations (`{"field": {"decoration": "WARNING"}}`) for a plugin.
    async fn get_plugin_view(&self, plugin: &str) -> ProtocolOutcome<Value> {
        Err(RemoteError::Protocol(format!("no view for {plugin}")))
    }

    /// One field of a plugin.
    async fn get_field(&self, plugin: &str, field: &str) -> ProtocolOutcome<Value> {
        let v = self.get_plugin(plugin).await?;
        v.get(field)
            .cloned()
            .ok_or_else(|| RemoteError::Protocol(format!("no field {plugin}.{field}")))
    }
}

/// Where and how to reach one agent.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub username: String,
    /// Wire digest sent as the Basic password.
    pub password: Option<String>,
    pub timeout: Duration,
}

impl Endpoint {
    pub fn from_record(rec: &ServerRecord, timeout: Duration) -> Self {
        Self {
            host: rec.ip.clone(),
            port: rec.port,
            protocol: rec.protocol,
            username: rec.username.clone(),
            password: rec.password(),
            timeout,
        }
    }

    pub fn base_url(&self) -> String {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    pub(crate) fn http_client(&self) -> ProtocolOutcome<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))
    }

    pub(crate) fn credentials(&self) -> Option<(String, String)> {
        self.password
            .as_ref()
            .map(|p| (self.username.clone(), p.clone()))
    }
}

/// Pick the implementation matching the endpoint's protocol.
pub fn connect(ep: &Endpoint) -> ProtocolOutcome<Box<dyn RemoteServer>> {
    Ok(match ep.protocol {
        Protocol::Rpc => Box::new(RpcServer::new(ep)?),
        Protocol::Rest => Box::new(RestServer::new(ep)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(host: &str) -> Endpoint {
        Endpoint {
            host: host.into(),
            port: 61209,
            protocol: Protocol::Rpc,
            username: "glances".into(),
            password: None,
            timeout: Duration::from_secs(3),
        }
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        assert_eq!(ep("::1").base_url(), "http://[::1]:61209");
        assert_eq!(ep("10.0.0.1").base_url(), "http://10.0.0.1:61209");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            check_status(StatusCode::UNAUTHORIZED),
            Err(RemoteError::Auth(401))
        );
        assert!(matches!(
            check_status(StatusCode::INTERNAL_SERVER_ERROR),
            Err(RemoteError::Protocol(_))
        ));
        assert!(check_status(StatusCode::OK).is_ok());
    }

    #[test]
    fn no_password_means_no_credentials() {
        assert!(ep("h").credentials().is_none());
        let mut e = ep("h");
        e.password = Some("d".into());
        assert_eq!(e.credentials(), Some(("glances".into(), "d".into())));
    }
}
