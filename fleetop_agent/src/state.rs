//! Shared agent state: sysinfo handles, the cached stats snapshot, and the credential.

use std::{sync::Arc, time::Duration};

use fleetop::limits::Limits;
use fleetop::stats::Stats;
use serde_json::Value;
use sysinfo::{Disks, Networks, System, Users};
use tokio::sync::{Mutex, RwLock};

pub type SharedSystem = Arc<Mutex<System>>;
pub type SharedNetworks = Arc<Mutex<Networks>>;
pub type SharedDisks = Arc<Mutex<Disks>>;
pub type SharedUsers = Arc<Mutex<Users>>;

/// Snapshot served to clients: typed for plugin lookups, plus the JSON blob for `getAll`.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub stats: Stats,
    pub blob: Value,
}

impl Snapshot {
    pub fn new(stats: Stats) -> Self {
        let blob = serde_json::to_value(&stats).unwrap_or(Value::Null);
        Self { stats, blob }
    }

    pub fn plugin(&self, name: &str) -> Option<Value> {
        if !Stats::SECTIONS.contains(&name) {
            return None;
        }
        self.blob.get(name).cloned()
    }
}

#[derive(Clone)]
pub struct AppState {
    // Persistent sysinfo handles
    pub sys: SharedSystem,
    pub networks: SharedNetworks,
    pub disks: SharedDisks,
    pub users: SharedUsers,
    pub hostname: String,

    pub snapshot: Arc<RwLock<Snapshot>>,
    /// Stats are refreshed at most this often.
    pub cached_time: Duration,

    /// `salt$hash` of the wire digest; `None` leaves the agent open.
    pub password: Option<Arc<str>>,
    pub username: Arc<str>,

    /// Thresholds behind plugin view decorations.
    pub limits: Arc<Limits>,
}

impl AppState {
    pub fn new(cached_time: Duration, username: &str, password: Option<String>) -> Self {
        let mut sys = System::new();
        sys.refresh_all();
        Self {
            sys: Arc::new(Mutex::new(sys)),
            networks: Arc::new(Mutex::new(Networks::new_with_refreshed_list())),
            disks: Arc::new(Mutex::new(Disks::new_with_refreshed_list())),
            users: Arc::new(Mutex::new(Users::new_with_refreshed_list())),
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".into()),
            snapshot: Arc::new(RwLock::new(Snapshot::default())),
            cached_time,
            password: password.map(Arc::from),
            username: Arc::from(username),
            limits: Arc::new(Limits::default()),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = Arc::new(limits);
        self
    }
}
