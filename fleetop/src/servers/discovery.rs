//! Multicast DNS service discovery: browse for agents, and announce our own.
//!
//! Browsing feeds a live list of DYNAMIC records. A re-resolved service replaces its record
//! in place (same index), so readers never see it vanish during an update. Departures are
//! detected from goodbye packets (graceful shutdown) or TTL expiry (the peer went away).

use std::{
    collections::{HashMap, HashSet},
    net::IpAddr,
    sync::Arc,
    thread::JoinHandle,
    time::Duration,
};

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::record::{Origin, Protocol, ServerRecord};

pub const SERVICE_TYPE: &str = "_fleetop._tcp.local.";

/// What the browser reported, decoupled from the mDNS types.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    Resolved {
        fullname: String,
        ip: IpAddr,
        port: u16,
        protocol: Protocol,
    },
    Removed {
        fullname: String,
    },
}

/// Shared list of discovered servers, written by the listener thread.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredServers {
    inner: Arc<RwLock<Vec<Arc<ServerRecord>>>>,
    /// Keys owned by the static list; announcements using them are ignored.
    reserved: Arc<RwLock<HashSet<String>>>,
}

impl DiscoveredServers {
    pub fn servers(&self) -> Vec<Arc<ServerRecord>> {
        self.inner.read().clone()
    }

    pub fn get(&self, index: usize) -> Option<Arc<ServerRecord>> {
        self.inner.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn reserve<I: IntoIterator<Item = String>>(&self, keys: I) {
        self.reserved.write().extend(keys);
    }

    pub fn apply(&self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::Resolved {
                fullname,
                ip,
                port,
                protocol,
            } => self.add_server(&fullname, ip, port, protocol),
            DiscoveryEvent::Removed { fullname } => self.remove_server(&fullname),
        }
    }

    /// Insert a record, or replace the one with the same key at its current index.
    pub fn add_server(&self, fullname: &str, ip: IpAddr, port: u16, protocol: Protocol) {
        if self.reserved.read().contains(fullname) {
            warn!("Server {fullname} is already in the static list, ignore the announcement");
            return;
        }
        let short = fullname.split(':').next().unwrap_or(fullname);
        let record = ServerRecord::new(
            fullname,
            short,
            ip.to_string(),
            port,
            protocol,
            Origin::Dynamic,
        );
        let mut list = self.inner.write();
        match list.iter().position(|s| s.key == fullname) {
            Some(pos) => {
                if record.same_endpoint(&list[pos]) {
                    record.inherit_state(&list[pos]);
                }
                list[pos] = Arc::new(record);
                debug!("Replace server {fullname} in the discovered list");
            }
            None => {
                list.push(Arc::new(record));
                debug!("Updated servers list ({} servers)", list.len());
            }
        }
    }

    pub fn remove_server(&self, fullname: &str) {
        let mut list = self.inner.write();
        let before = list.len();
        list.retain(|s| s.key != fullname);
        if list.len() < before {
            debug!("Remove server {fullname} from the list");
        }
    }
}

fn to_event(ev: ServiceEvent) -> Option<DiscoveryEvent> {
    match ev {
        ServiceEvent::ServiceResolved(info) => {
            let addrs = info.get_addresses();
            let ip = addrs
                .iter()
                .find(|a| a.is_ipv4())
                .or_else(|| addrs.iter().next())
                .copied();
            let Some(ip) = ip else {
                warn!("New server detected, but its service info carries no address");
                return None;
            };
            let protocol = info
                .get_property_val_str("protocol")
                .and_then(|p| p.parse().ok())
                .unwrap_or_default();
            info!(
                "New {protocol} server detected ({} from {ip}:{})",
                info.get_fullname(),
                info.get_port()
            );
            Some(DiscoveryEvent::Resolved {
                fullname: info.get_fullname().to_string(),
                ip,
                port: info.get_port(),
                protocol,
            })
        }
        ServiceEvent::ServiceRemoved(_, fullname) => {
            info!("Server {fullname} removed from the autodetect list");
            Some(DiscoveryEvent::Removed { fullname })
        }
        _ => None,
    }
}

/// Browses [`SERVICE_TYPE`] on a background thread until closed.
pub struct DiscoveryRegistry {
    servers: DiscoveredServers,
    daemon: Option<ServiceDaemon>,
    listener: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl DiscoveryRegistry {
    /// Start browsing. Failure to open the multicast socket leaves an empty, inert registry.
    pub fn start() -> Self {
        let mut reg = Self::disabled();
        info!("Init autodiscover mode (mDNS)");
        let daemon = match ServiceDaemon::new() {
            Ok(d) => d,
            Err(e) => {
                error!("Cannot start mDNS ({e})");
                return reg;
            }
        };
        let rx = match daemon.browse(SERVICE_TYPE) {
            Ok(rx) => rx,
            Err(e) => {
                error!("Cannot browse {SERVICE_TYPE} ({e})");
                let _ = daemon.shutdown();
                return reg;
            }
        };

        let servers = reg.servers.clone();
        let cancel = reg.cancel.clone();
        let handle = std::thread::Builder::new()
            .name("discovery".into())
            .spawn(move || {
                while !cancel.is_cancelled() {
                    match rx.recv_timeout(Duration::from_millis(500)) {
                        Ok(ev) => {
                            if let Some(ev) = to_event(ev) {
                                servers.apply(ev);
                            }
                        }
                        Err(_) if rx.is_disconnected() => break,
                        Err(_) => {}
                    }
                }
            });
        match handle {
            Ok(h) => {
                reg.listener = Some(h);
                reg.daemon = Some(daemon);
            }
            Err(e) => {
                error!("Cannot spawn discovery listener ({e})");
                let _ = daemon.shutdown();
            }
        }
        reg
    }

    pub fn disabled() -> Self {
        Self {
            servers: DiscoveredServers::default(),
            daemon: None,
            listener: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn servers(&self) -> &DiscoveredServers {
        &self.servers
    }

    pub fn is_active(&self) -> bool {
        self.daemon.is_some()
    }

    /// Stop browsing and close the listener.
    pub fn close(&mut self) {
        self.cancel.cancel();
        if let Some(daemon) = self.daemon.take() {
            let _ = daemon.stop_browse(SERVICE_TYPE);
            let _ = daemon.shutdown();
        }
        if let Some(h) = self.listener.take() {
            let _ = h.join();
        }
    }
}

impl Drop for DiscoveryRegistry {
    fn drop(&mut self) {
        self.close();
    }
}

/// Our own announcement, carrying `protocol=rpc|rest`.
pub struct Announcer {
    daemon: ServiceDaemon,
    fullname: String,
}

impl Announcer {
    pub fn announce(
        hostname: &str,
        ip: IpAddr,
        port: u16,
        protocol: Protocol,
    ) -> Result<Self, mdns_sd::Error> {
        let daemon = ServiceDaemon::new()?;
        let instance = format!("{hostname}:{port}");
        let host = format!("{hostname}.local.");
        let mut props = HashMap::new();
        props.insert("protocol".to_string(), protocol.as_str().to_string());
        let info = ServiceInfo::new(
            SERVICE_TYPE,
            &instance,
            &host,
            ip.to_string().as_str(),
            port,
            props,
        )?;
        let fullname = info.get_fullname().to_string();
        daemon.register(info)?;
        info!("Announce the server on the LAN as {fullname} (using {ip} IP address)");
        Ok(Self { daemon, fullname })
    }

    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    /// Send the goodbye and stop the daemon.
    pub fn close(self) {
        match self.daemon.unregister(&self.fullname) {
            Ok(rx) => {
                let _ = rx.recv_timeout(Duration::from_secs(1));
            }
            Err(e) => warn!("Cannot unregister {} ({e})", self.fullname),
        }
        let _ = self.daemon.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servers::record::ServerStatus;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    #[test]
    fn add_update_remove() {
        let d = DiscoveredServers::default();
        d.apply(DiscoveryEvent::Resolved {
            fullname: "web:61209._fleetop._tcp.local.".into(),
            ip: ip(10),
            port: 61209,
            protocol: Protocol::Rpc,
        });
        d.add_server("db:61208._fleetop._tcp.local.", ip(11), 61208, Protocol::Rest);
        assert_eq!(d.len(), 2);
        let first = d.get(0).unwrap();
        assert_eq!(first.name, "web");
        assert_eq!(first.origin, Origin::Dynamic);
        first.set_status(ServerStatus::Online);

        // Same endpoint re-announced: index and cached status kept.
        d.add_server("web:61209._fleetop._tcp.local.", ip(10), 61209, Protocol::Rpc);
        assert_eq!(d.len(), 2);
        assert_eq!(d.get(0).unwrap().status(), ServerStatus::Online);

        // Moved endpoint: same index, fresh state.
        d.add_server("web:61209._fleetop._tcp.local.", ip(20), 61209, Protocol::Rpc);
        let moved = d.get(0).unwrap();
        assert_eq!(moved.ip, "192.168.1.20");
        assert_eq!(moved.status(), ServerStatus::Unknown);

        d.apply(DiscoveryEvent::Removed {
            fullname: "web:61209._fleetop._tcp.local.".into(),
        });
        assert_eq!(d.len(), 1);
        assert_eq!(d.get(0).unwrap().protocol, Protocol::Rest);
        d.remove_server("not-there");
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn disabled_registry_is_empty() {
        let mut reg = DiscoveryRegistry::disabled();
        assert!(!reg.is_active());
        assert!(reg.servers().is_empty());
        reg.close();
    }
}
