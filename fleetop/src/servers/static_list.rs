//! Servers pre-configured in the `[serverlist]` section (`server_N_*` entries).

use std::{
    net::{IpAddr, ToSocketAddrs},
    sync::Arc,
};

use tracing::{debug, error, info, warn};

use super::record::{Origin, Protocol, ServerRecord};
use crate::config::Config;

pub const SECTION: &str = "serverlist";
const MAX_SERVERS: usize = 255;

/// Resolve a hostname, preferring IPv4 like the agents announce.
pub fn resolve_host(name: &str, port: u16) -> std::io::Result<IpAddr> {
    if let Ok(ip) = name.parse::<IpAddr>() {
        return Ok(ip);
    }
    let addrs: Vec<_> = (name, port).to_socket_addrs()?.collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .map(|a| a.ip())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no address"))
}

#[derive(Debug, Default)]
pub struct StaticRegistry {
    servers: Vec<Arc<ServerRecord>>,
}

impl StaticRegistry {
    pub fn from_config(config: &Config) -> Self {
        Self::from_config_with(config, resolve_host)
    }

    /// Same as [`from_config`](Self::from_config) with a pluggable resolver.
    pub fn from_config_with<R>(config: &Config, resolve: R) -> Self
    where
        R: Fn(&str, u16) -> std::io::Result<IpAddr>,
    {
        if !config.has_section(SECTION) {
            warn!("No [{SECTION}] section in the configuration file. Cannot load server list.");
            return Self::default();
        }
        info!("Start reading the [{SECTION}] section in the configuration file");

        let mut servers = Vec::new();
        for i in 1..=MAX_SERVERS {
            let prefix = format!("server_{i}_");
            let get = |field: &str| config.get_value(SECTION, &format!("{prefix}{field}"));
            let Some(name) = get("name") else {
                continue;
            };

            let protocol = match get("protocol") {
                None => Protocol::Rpc,
                Some(p) => match p.parse::<Protocol>() {
                    Ok(p) => p,
                    Err(e) => {
                        error!("{e} for {prefix}, skip it.");
                        continue;
                    }
                },
            };

            let port = match get("port") {
                None => protocol.default_port(),
                Some(p) => match p.trim().parse::<u16>() {
                    Ok(p) => p,
                    Err(_) => {
                        error!("Invalid port '{p}' for {prefix}, skip it.");
                        continue;
                    }
                },
            };

            let key = format!("{name}:{port}");
            if servers.iter().any(|s: &Arc<ServerRecord>| s.key == key) {
                warn!("Server {key} ({prefix}) is already in the list, skip it.");
                continue;
            }

            let ip = match resolve(&name, port) {
                Ok(ip) => ip,
                Err(e) => {
                    error!("Cannot get IP address for server {name} ({e})");
                    continue;
                }
            };

            debug!("Add server {name} to the static list");
            let record = ServerRecord::new(
                key,
                name,
                ip.to_string(),
                port,
                protocol,
                Origin::Static,
            )
            .with_alias(get("alias"));
            servers.push(Arc::new(record));
        }
        info!("{} server(s) loaded from the configuration file", servers.len());
        Self { servers }
    }

    /// Prebuilt records; a repeated key keeps the first one.
    pub fn from_records(records: Vec<ServerRecord>) -> Self {
        let mut servers: Vec<Arc<ServerRecord>> = Vec::with_capacity(records.len());
        for rec in records {
            if servers.iter().any(|s| s.key == rec.key) {
                warn!("Server {} is already in the list, skip it.", rec.key);
                continue;
            }
            servers.push(Arc::new(rec));
        }
        Self { servers }
    }

    pub fn servers(&self) -> &[Arc<ServerRecord>] {
        &self.servers
    }

    pub fn get(&self, index: usize) -> Option<&Arc<ServerRecord>> {
        self.servers.get(index)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
