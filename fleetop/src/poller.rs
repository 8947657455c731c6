//! Background summary polling: one short-lived worker per server record.
//!
//! A worker runs a single cycle (connect, fetch a few plugin values, classify, write back)
//! and exits. [`Poller::update_servers_stats`] is called on every overview refresh and starts
//! a new worker for each record that has none alive, so a slow peer only ever delays itself.

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures_util::future::join_all;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::password::{digest, PasswordVault};
use crate::remote::{self, Endpoint, ProtocolOutcome, RemoteError, RemoteServer};
use crate::servers::columns::Column;
use crate::servers::{ServerList, ServerRecord, ServerStatus};

/// Connect/read bound for one poll cycle, well below any refresh period.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(3);

/// Builds a remote handle for an endpoint. Swappable so tests can script transports.
pub type Connector = Arc<dyn Fn(&Endpoint) -> ProtocolOutcome<Box<dyn RemoteServer>> + Send + Sync>;

/// Values fetched by a successful cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub cpu_percent: String,
    pub mem_percent: f64,
    pub hr_name: String,
    pub load_min5: Option<f64>,
    pub extra: Vec<(String, Value)>,
}

/// For a record that was rejected, look up a configured password and store its digest.
/// Returns true when a password was attached.
pub fn resolve_password(vault: &PasswordVault, record: &ServerRecord) -> bool {
    if record.status() != ServerStatus::Protected || record.password().is_some() {
        return false;
    }
    match vault.lookup(&record.name) {
        Some(clear) => {
            record.set_password(Some(digest(clear)));
            true
        }
        None => false,
    }
}

fn missing(what: &str) -> RemoteError {
    RemoteError::Protocol(format!("missing {what}"))
}

/// Fetch the required summary fields, then the best-effort ones.
pub async fn fetch_summary(
    remote: &dyn RemoteServer,
    columns: &[Column],
) -> ProtocolOutcome<Summary> {
    let cpu = remote.get_plugin("cpu").await?;
    let busy = match cpu.get("idle").and_then(Value::as_f64) {
        Some(idle) => 100.0 - idle,
        None => cpu
            .get("total")
            .and_then(Value::as_f64)
            .ok_or_else(|| missing("cpu.idle"))?,
    };
    let mem_percent = remote
        .get_plugin("mem")
        .await?
        .get("percent")
        .and_then(Value::as_f64)
        .ok_or_else(|| missing("mem.percent"))?;
    let hr_name = remote
        .get_plugin("system")
        .await?
        .get("hr_name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| missing("system.hr_name"))?;

    // Not every platform exposes load
    let load_min5 = match remote.get_plugin("load").await {
        Ok(v) => v.get("min5").and_then(Value::as_f64),
        Err(e) => {
            debug!("load unavailable on {}: {e}", remote.uri());
            None
        }
    };

    let mut extra = Vec::new();
    for col in columns.iter().filter(|c| c.builtin().is_none()) {
        let fetched = match &col.key {
            Some(_) => remote
                .get_plugin(&col.plugin)
                .await
                .map(|payload| col.extract(&payload)),
            None => remote.get_field(&col.plugin, &col.field).await.map(Some),
        };
        match fetched {
            Ok(Some(v)) => extra.push((col.record_key(), v)),
            Ok(None) => debug!("{} has no {}", remote.uri(), col.record_key()),
            Err(e) => debug!("cannot grab {} on {}: {e}", col.record_key(), remote.uri()),
        }
    }

    // Decorations are optional; one view per plugin covers all of its columns
    let mut plugins: Vec<&str> = Vec::new();
    for col in columns {
        if !plugins.contains(&col.plugin.as_str()) {
            plugins.push(&col.plugin);
        }
    }
    for plugin in plugins {
        let view = match remote.get_plugin_view(plugin).await {
            Ok(v) => v,
            Err(e) => {
                debug!("no {plugin} view on {}: {e}", remote.uri());
                continue;
            }
        };
        for col in columns.iter().filter(|c| c.plugin == plugin) {
            if let Some(d) = col.decoration(&view) {
                extra.push((col.decoration_key(), Value::String(d)));
            }
        }
    }

    Ok(Summary {
        cpu_percent: format!("{busy:.1}"),
        mem_percent,
        hr_name,
        load_min5,
        extra,
    })
}

/// One cycle against an already-built remote; writes the outcome into `record`.
pub async fn poll_once(
    record: &ServerRecord,
    remote: &dyn RemoteServer,
    columns: &[Column],
) -> ServerStatus {
    match fetch_summary(remote, columns).await {
        Ok(s) => {
            record.update(|st| {
                st.status = ServerStatus::Online;
                st.cpu_percent = Some(s.cpu_percent);
                st.mem_percent = Some(s.mem_percent);
                st.hr_name = Some(s.hr_name);
                st.load_min5 = s.load_min5;
                for (k, v) in s.extra {
                    st.extra.insert(k, v);
                }
            });
            ServerStatus::Online
        }
        Err(RemoteError::Auth(code)) => {
            debug!("{} rejected our credentials (HTTP {code})", record.uri());
            record.update(|st| {
                st.status = ServerStatus::Protected;
                st.password = None;
            });
            ServerStatus::Protected
        }
        Err(e) => {
            debug!("cannot grab stats from {}: {e}", record.uri());
            record.set_status(ServerStatus::Offline);
            ServerStatus::Offline
        }
    }
}

/// Full cycle: password resolution, connection, poll.
pub async fn poll_record(
    record: &ServerRecord,
    vault: &PasswordVault,
    columns: &[Column],
    connector: &Connector,
    timeout: Duration,
) -> ServerStatus {
    resolve_password(vault, record);
    let ep = Endpoint::from_record(record, timeout);
    match connector(&ep) {
        Ok(remote) => poll_once(record, remote.as_ref(), columns).await,
        Err(e) => {
            warn!("cannot build client for {}: {e}", record.uri());
            record.set_status(ServerStatus::Offline);
            ServerStatus::Offline
        }
    }
}

/// Supervisor for poll workers, keyed by record key.
pub struct Poller {
    workers: HashMap<String, JoinHandle<()>>,
    cancel: CancellationToken,
    connector: Connector,
    vault: Arc<PasswordVault>,
    columns: Arc<[Column]>,
    timeout: Duration,
}

impl Poller {
    pub fn new(list: &ServerList) -> Self {
        Self::with_connector(list, Arc::new(remote::connect))
    }

    pub fn with_connector(list: &ServerList, connector: Connector) -> Self {
        Self {
            workers: HashMap::new(),
            cancel: CancellationToken::new(),
            connector,
            vault: Arc::new(list.passwords().clone()),
            columns: list.columns().to_vec().into(),
            timeout: POLL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Start a cycle for every record without a live worker. Returns how many were started.
    /// Must be called from within a tokio runtime.
    pub fn update_servers_stats(&mut self, list: &ServerList) -> usize {
        let servers = list.get_servers_list();
        self.workers.retain(|_, h| !h.is_finished());
        let mut started = 0;
        for record in servers {
            if self.workers.contains_key(&record.key) || self.cancel.is_cancelled() {
                continue;
            }
            let key = record.key.clone();
            let cancel = self.cancel.clone();
            let connector = self.connector.clone();
            let vault = self.vault.clone();
            let columns = self.columns.clone();
            let timeout = self.timeout;
            let handle = tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => debug!("poll of {} cancelled", record.key),
                    status = poll_record(&record, &vault, &columns, &connector, timeout) => {
                        debug!("{} is {status}", record.key);
                    }
                }
            });
            self.workers.insert(key, handle);
            started += 1;
        }
        started
    }

    /// Cancel outstanding cycles and join every worker.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        let handles: Vec<_> = self.workers.drain().map(|(_, h)| h).collect();
        for res in join_all(handles).await {
            if let Err(e) = res {
                warn!("poll worker ended abnormally: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servers::{Origin, Protocol};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    enum Script {
        Timeout,
        Unauthorized,
        Stats,
    }

    struct FakeRemote(Script);

    #[async_trait]
    impl RemoteServer for FakeRemote {
        fn uri(&self) -> &str {
            "http://fake:1"
        }
        async fn init(&self) -> ProtocolOutcome<String> {
            Ok("4.0.0".into())
        }
        async fn get_all(&self) -> ProtocolOutcome<Value> {
            Ok(json!({}))
        }
        async fn get_all_plugins(&self) -> ProtocolOutcome<Vec<String>> {
            Ok(vec![])
        }
        async fn get_plugin(&self, plugin: &str) -> ProtocolOutcome<Value> {
            match self.0 {
                Script::Timeout => Err(RemoteError::Transport("timed out".into())),
                Script::Unauthorized => Err(RemoteError::Auth(401)),
                Script::Stats => Ok(match plugin {
                    "cpu" => json!({"idle": 87.5, "total": 12.5}),
                    "mem" => json!({"percent": 61.2}),
                    "system" => json!({"hr_name": "Debian 12 64bit"}),
                    "diskio" => json!({"read_bytes": 42}),
                    _ => return Err(RemoteError::Protocol("no such plugin".into())),
                }),
            }
        }
        async fn get_plugin_view(&self, plugin: &str) -> ProtocolOutcome<Value> {
            match plugin {
                "cpu" => Ok(json!({"total": {"decoration": "WARNING"}})),
                _ => Err(RemoteError::Protocol("no view".into())),
            }
        }
    }

    fn record() -> Arc<ServerRecord> {
        Arc::new(ServerRecord::new(
            "alpha:61209",
            "alpha",
            "10.0.0.1",
            61209,
            Protocol::Rpc,
            Origin::Static,
        ))
    }

    #[tokio::test]
    async fn offline_protected_online_in_sequence() {
        let rec = record();
        rec.set_password(Some("stale".into()));
        let cols = crate::servers::columns::parse_columns("cpu:total,diskio:read_bytes");

        let st = poll_once(&rec, &FakeRemote(Script::Timeout), &cols).await;
        assert_eq!(st, ServerStatus::Offline);
        assert_eq!(rec.status(), ServerStatus::Offline);

        let st = poll_once(&rec, &FakeRemote(Script::Unauthorized), &cols).await;
        assert_eq!(st, ServerStatus::Protected);
        assert!(rec.password().is_none());

        let st = poll_once(&rec, &FakeRemote(Script::Stats), &cols).await;
        assert_eq!(st, ServerStatus::Online);
        let snap = rec.snapshot();
        assert_eq!(snap.cpu_percent.as_deref(), Some("12.5"));
        assert_eq!(snap.mem_percent, Some(61.2));
        assert_eq!(snap.hr_name.as_deref(), Some("Debian 12 64bit"));
        assert_eq!(snap.load_min5, None);
        assert_eq!(snap.extra.get("diskio_read_bytes"), Some(&json!(42)));
        assert_eq!(snap.extra.get("cpu_total_decoration"), Some(&json!("WARNING")));
        assert_eq!(snap.extra.get("diskio_read_bytes_decoration"), None);
    }

    #[test]
    fn protected_record_picks_up_vault_password() {
        let vault = PasswordVault::from_entries([("default", "s3cret")]);
        let rec = record();
        assert!(!resolve_password(&vault, &rec), "only PROTECTED records resolve");
        rec.set_status(ServerStatus::Protected);
        assert!(resolve_password(&vault, &rec));
        assert_eq!(rec.password(), Some(digest("s3cret")));
    }

    #[tokio::test]
    async fn connector_failure_marks_offline() {
        let rec = record();
        let connector: Connector =
            Arc::new(|_: &Endpoint| -> ProtocolOutcome<Box<dyn RemoteServer>> {
                Err(RemoteError::Transport("no route".into()))
            });
        let st = poll_record(
            &rec,
            &PasswordVault::default(),
            &[],
            &connector,
            Duration::from_millis(10),
        )
        .await;
        assert_eq!(st, ServerStatus::Offline);
    }

    #[tokio::test]
    async fn connector_sees_record_endpoint() {
        let rec = record();
        let seen = Arc::new(Mutex::new(VecDeque::new()));
        let seen2 = seen.clone();
        let connector: Connector = Arc::new(move |ep: &Endpoint| -> ProtocolOutcome<_> {
            seen2.lock().push_back(ep.base_url());
            Ok(Box::new(FakeRemote(Script::Stats)) as Box<dyn RemoteServer>)
        });
        let st = poll_record(&rec, &PasswordVault::default(), &[], &connector, POLL_TIMEOUT).await;
        assert_eq!(st, ServerStatus::Online);
        assert_eq!(seen.lock().pop_front().as_deref(), Some("http://10.0.0.1:61209"));
    }
}
