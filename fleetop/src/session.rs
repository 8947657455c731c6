//! Full-fidelity session against one server: login with version negotiation and SNMP fallback,
//! then the refresh loop that mirrors all stats, runs exports and drives the display.

use std::{fmt, io, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::export::{export_all, Export};
use crate::limits::Limits;
use crate::remote::{self, Endpoint, RemoteError, RemoteServer};
use crate::servers::{Protocol, ServerRecord};
use crate::snmp::{self, SnmpClient, SnmpError, SnmpStats};
use crate::stats::Stats;
use crate::timer::{adapted_refresh, Counter};

pub const DEFAULT_REFRESH: Duration = Duration::from_secs(2);
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(7);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMode {
    Glances,
    Snmp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Snmp,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Snmp => "SNMP",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Login,
    Running,
    Ended,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Connection to server {uri} failed (bad username/password)")]
    BadCredentials { uri: String },
    #[error("Client and server not compatible: client version {client} / server version {server}")]
    Incompatible { client: String, server: String },
    #[error("Connection to SNMP server {host} failed: {source}")]
    Snmp {
        host: String,
        #[source]
        source: SnmpError,
    },
    #[error("Connection to server {uri} failed: {source}")]
    Remote {
        uri: String,
        #[source]
        source: RemoteError,
    },
    #[error("display error: {0}")]
    Display(#[from] io::Error),
}

/// Where to connect and how to behave.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    pub username: String,
    /// Wire digest, never clear text.
    pub password: Option<String>,
    pub refresh: Duration,
    pub timeout: Duration,
    pub quiet: bool,
    pub snmp_force: bool,
    pub snmp_community: String,
    pub snmp_port: u16,
}

impl SessionConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            protocol: Protocol::Rpc,
            username: crate::servers::record::DEFAULT_USERNAME.to_string(),
            password: None,
            refresh: DEFAULT_REFRESH,
            timeout: SESSION_TIMEOUT,
            quiet: false,
            snmp_force: false,
            snmp_community: snmp::DEFAULT_COMMUNITY.to_string(),
            snmp_port: snmp::DEFAULT_PORT,
        }
    }

    pub fn for_record(record: &ServerRecord, refresh: Duration) -> Self {
        Self {
            protocol: record.protocol,
            username: record.username.clone(),
            password: record.password(),
            refresh,
            ..Self::new(&record.ip, record.port)
        }
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            protocol: self.protocol,
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: self.timeout,
        }
    }
}

/// Whatever shows the session. `update` owns the wait between refreshes and returns
/// `true` when the user asked to leave.
#[async_trait]
pub trait SessionDisplay: Send {
    fn init(&mut self) -> io::Result<()>;

    async fn update(
        &mut self,
        stats: &Stats,
        limits: &Limits,
        status: ConnectionStatus,
        wait: Duration,
    ) -> io::Result<bool>;

    fn end(&mut self);
}

fn major(version: &str) -> &str {
    version.trim().split('.').next().unwrap_or_default()
}

pub struct ClientSession {
    config: SessionConfig,
    client_version: String,
    state: SessionState,
    mode: ClientMode,
    status: ConnectionStatus,
    remote: Option<Box<dyn RemoteServer>>,
    snmp: Option<SnmpStats>,
    stats: Stats,
    plugins: Vec<String>,
    limits: Limits,
    display: Option<Box<dyn SessionDisplay>>,
    exports: Vec<Box<dyn Export>>,
    shutdown: CancellationToken,
}

impl ClientSession {
    pub fn new(config: SessionConfig, limits: Limits) -> Self {
        Self {
            config,
            client_version: crate::VERSION.to_string(),
            state: SessionState::Init,
            mode: ClientMode::Glances,
            status: ConnectionStatus::Disconnected,
            remote: None,
            snmp: None,
            stats: Stats::default(),
            plugins: Vec::new(),
            limits,
            display: None,
            exports: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_display(mut self, display: Box<dyn SessionDisplay>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn with_exports(mut self, exports: Vec<Box<dyn Export>>) -> Self {
        self.exports = exports;
        self
    }

    pub fn with_client_version(mut self, version: &str) -> Self {
        self.client_version = version.to_string();
        self
    }

    /// Token that stops the refresh loop from outside (Ctrl-C in quiet mode).
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn uri(&self) -> String {
        self.config.endpoint().base_url()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> ClientMode {
        self.mode
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    pub async fn login(&mut self) -> Result<ClientMode, SessionError> {
        self.state = SessionState::Login;
        if self.config.snmp_force {
            self.mode = ClientMode::Snmp;
        } else {
            self.login_glances().await?;
        }
        if self.mode == ClientMode::Snmp {
            self.login_snmp().await?;
        }

        debug!("limits: {:?}", self.limits);
        if !self.config.quiet {
            if let Some(d) = self.display.as_mut() {
                d.init()?;
            }
        }
        self.state = SessionState::Running;
        Ok(self.mode)
    }

    async fn login_glances(&mut self) -> Result<(), SessionError> {
        let uri = self.uri();
        let remote = remote::connect(&self.config.endpoint()).map_err(|source| {
            SessionError::Remote {
                uri: uri.clone(),
                source,
            }
        })?;
        match remote.init().await {
            Ok(server_version) => {
                if major(&server_version) != major(&self.client_version) {
                    error!(
                        "Client version {} / server version {server_version} mismatch",
                        self.client_version
                    );
                    return Err(SessionError::Incompatible {
                        client: self.client_version.clone(),
                        server: server_version,
                    });
                }
                self.plugins = remote.get_all_plugins().await.unwrap_or_else(|e| {
                    warn!("cannot list plugins on {uri}: {e}");
                    Vec::new()
                });
                info!("Connected to {uri} (server version {server_version})");
                self.remote = Some(remote);
                self.mode = ClientMode::Glances;
                Ok(())
            }
            Err(RemoteError::Auth(code)) => {
                error!("{uri} rejected our credentials (HTTP {code})");
                Err(SessionError::BadCredentials { uri })
            }
            Err(RemoteError::Transport(e)) => {
                info!("No server found at {uri} ({e}). Trying fallback to SNMP...");
                self.mode = ClientMode::Snmp;
                Ok(())
            }
            Err(source) => Err(SessionError::Remote { uri, source }),
        }
    }

    async fn login_snmp(&mut self) -> Result<(), SessionError> {
        let client = SnmpClient::new(
            &self.config.host,
            self.config.snmp_port,
            &self.config.snmp_community,
            self.config.timeout,
        );
        let src = SnmpStats::new(client);
        src.check().await.map_err(|source| SessionError::Snmp {
            host: self.config.host.clone(),
            source,
        })?;
        info!("Connected to SNMP server {}", self.config.host);
        self.snmp = Some(src);
        Ok(())
    }

    /// Refresh the local mirror once.
    pub async fn update(&mut self) -> ConnectionStatus {
        self.status = match self.mode {
            ClientMode::Glances => match &self.remote {
                Some(remote) => match remote.get_all().await {
                    Ok(blob) if self.stats.update(&blob) => ConnectionStatus::Connected,
                    Ok(_) => {
                        debug!("unusable stats blob from {}", remote.uri());
                        ConnectionStatus::Disconnected
                    }
                    Err(e) => {
                        debug!("cannot get stats from {}: {e}", remote.uri());
                        ConnectionStatus::Disconnected
                    }
                },
                None => ConnectionStatus::Disconnected,
            },
            ClientMode::Snmp => match &self.snmp {
                Some(src) => match src.update(&mut self.stats).await {
                    Ok(()) => ConnectionStatus::Snmp,
                    Err(e) => {
                        debug!("SNMP update failed: {e}");
                        ConnectionStatus::Disconnected
                    }
                },
                None => ConnectionStatus::Disconnected,
            },
        };
        self.status
    }

    /// Refresh loop; returns the mode the session ran in.
    pub async fn serve_forever(&mut self) -> Result<ClientMode, SessionError> {
        let mut counter = Counter::new();
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            counter.reset();
            let status = self.update().await;
            export_all(&mut self.exports, &self.config.host, &self.stats);
            let wait = adapted_refresh(self.config.refresh, counter.get());

            let exit = match self.display.as_mut().filter(|_| !self.config.quiet) {
                Some(d) => d.update(&self.stats, &self.limits, status, wait).await?,
                None => tokio::select! {
                    _ = tokio::time::sleep(wait) => false,
                    _ = self.shutdown.cancelled() => true,
                },
            };
            if exit {
                break;
            }
        }
        Ok(self.mode)
    }

    /// Release the display. Safe to call more than once.
    pub fn end(&mut self) {
        if let Some(d) = self.display.as_mut() {
            d.end();
        }
        self.state = SessionState::Ended;
    }

    /// Login, serve until exit, release the display.
    pub async fn run(mut self) -> Result<ClientMode, SessionError> {
        let res = match self.login().await {
            Ok(_) => self.serve_forever().await,
            Err(e) => Err(e),
        };
        self.end();
        res
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if self.state != SessionState::Ended {
            self.end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_component() {
        assert_eq!(major("4.2.1"), "4");
        assert_eq!(major(" 4 "), "4");
        assert_eq!(major(""), "");
    }

    #[test]
    fn config_from_record_carries_digest() {
        let rec = ServerRecord::new(
            "beta:61208",
            "beta",
            "10.0.0.2",
            61208,
            Protocol::Rest,
            crate::servers::Origin::Dynamic,
        );
        rec.set_password(Some("abc".into()));
        let cfg = SessionConfig::for_record(&rec, Duration::from_secs(5));
        assert_eq!(cfg.host, "10.0.0.2");
        assert_eq!(cfg.protocol, Protocol::Rest);
        assert_eq!(cfg.password.as_deref(), Some("abc"));
        assert_eq!(cfg.refresh, Duration::from_secs(5));
        assert_eq!(cfg.snmp_port, 161);
    }

    struct CountingDisplay {
        frames: usize,
        exit_after: usize,
        ended: bool,
    }

    #[async_trait]
    impl SessionDisplay for CountingDisplay {
        fn init(&mut self) -> io::Result<()> {
            Ok(())
        }
        async fn update(
            &mut self,
            _: &Stats,
            _: &Limits,
            status: ConnectionStatus,
            wait: Duration,
        ) -> io::Result<bool> {
            assert_eq!(status, ConnectionStatus::Disconnected);
            assert!(wait <= Duration::from_millis(20));
            self.frames += 1;
            Ok(self.frames >= self.exit_after)
        }
        fn end(&mut self) {
            self.ended = true;
        }
    }

    #[tokio::test]
    async fn loop_without_login_reports_disconnected_until_exit() {
        let mut cfg = SessionConfig::new("127.0.0.1", 1);
        cfg.refresh = Duration::from_millis(20);
        let mut s = ClientSession::new(cfg, Limits::default()).with_display(Box::new(
            CountingDisplay {
                frames: 0,
                exit_after: 3,
                ended: false,
            },
        ));
        assert_eq!(s.serve_forever().await.unwrap(), ClientMode::Glances);
        assert_eq!(s.status(), ConnectionStatus::Disconnected);
        s.end();
        assert_eq!(s.state(), SessionState::Ended);
    }

    #[tokio::test]
    async fn quiet_loop_stops_on_shutdown() {
        let mut cfg = SessionConfig::new("127.0.0.1", 1);
        cfg.quiet = true;
        cfg.refresh = Duration::from_secs(60);
        let token = CancellationToken::new();
        let mut s = ClientSession::new(cfg, Limits::default()).with_shutdown(token.clone());
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let mode = tokio::time::timeout(Duration::from_secs(5), s.serve_forever())
            .await
            .expect("loop did not stop")
            .unwrap();
        assert_eq!(mode, ClientMode::Glances);
        stopper.await.unwrap();
    }
}
