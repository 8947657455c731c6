//! Merged view over static and discovered servers.

use std::sync::Arc;

use tracing::debug;

use super::columns::{parse_columns, Column, DEFAULT_COLUMNS};
use super::discovery::{DiscoveredServers, DiscoveryRegistry};
use super::record::{ServerField, ServerRecord};
use super::static_list::{StaticRegistry, SECTION};
use crate::config::Config;
use crate::password::PasswordVault;

pub struct ServerList {
    static_servers: StaticRegistry,
    discovery: DiscoveryRegistry,
    passwords: PasswordVault,
    columns: Vec<Column>,
}

impl ServerList {
    /// Build from configuration; discovery is started unless disabled.
    pub fn from_config(config: &Config, autodiscover: bool) -> Self {
        let discovery = if autodiscover {
            DiscoveryRegistry::start()
        } else {
            DiscoveryRegistry::disabled()
        };
        Self::new(
            StaticRegistry::from_config(config),
            discovery,
            PasswordVault::from_config(config),
            load_columns(config),
        )
    }

    pub fn new(
        static_servers: StaticRegistry,
        discovery: DiscoveryRegistry,
        passwords: PasswordVault,
        columns: Vec<Column>,
    ) -> Self {
        discovery
            .servers()
            .reserve(static_servers.servers().iter().map(|s| s.key.clone()));
        Self {
            static_servers,
            discovery,
            passwords,
            columns,
        }
    }

    /// Static records first, then discovered ones; this order is the index space
    /// used by [`set_in_selected`](Self::set_in_selected).
    pub fn get_servers_list(&self) -> Vec<Arc<ServerRecord>> {
        let mut out = self.static_servers.servers().to_vec();
        out.extend(self.discovery.servers().servers());
        out
    }

    pub fn get(&self, index: usize) -> Option<Arc<ServerRecord>> {
        let n_static = self.static_servers.len();
        if index < n_static {
            self.static_servers.get(index).cloned()
        } else {
            self.discovery.servers().get(index - n_static)
        }
    }

    /// Route a write to the backing registry. Returns false when the index no longer exists.
    pub fn set_in_selected(&self, index: usize, field: ServerField) -> bool {
        match self.get(index) {
            Some(rec) => {
                rec.set(field);
                true
            }
            None => {
                debug!("Server {index} no longer in the list");
                false
            }
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn passwords(&self) -> &PasswordVault {
        &self.passwords
    }

    pub fn static_len(&self) -> usize {
        self.static_servers.len()
    }

    pub fn discovered(&self) -> &DiscoveredServers {
        self.discovery.servers()
    }

    pub fn discovery_active(&self) -> bool {
        self.discovery.is_active()
    }

    pub fn close(&mut self) {
        self.discovery.close();
    }
}

pub fn load_columns(config: &Config) -> Vec<Column> {
    let def = config
        .get_value(SECTION, "columns")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_COLUMNS.to_string());
    let cols = parse_columns(&def);
    if cols.is_empty() {
        parse_columns(DEFAULT_COLUMNS)
    } else {
        cols
    }
}
