//! Types that mirror the agent's full metrics blob (`getAll`).
//!
//! Decoding is per section: a section that is missing or has an unexpected shape falls back
//! to its default and the rest of the blob is still used. Unknown sections are ignored.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cpu {
    pub total: f64,
    pub user: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: Option<f64>,
    pub cpucore: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerCpu {
    pub cpu_number: u32,
    pub total: f64,
    pub user: f64,
    pub system: f64,
    pub idle: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mem {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemSwap {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Load {
    pub min1: f64,
    pub min5: f64,
    pub min15: f64,
    pub cpucore: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetIface {
    pub interface_name: String,
    // cumulative totals; the display diffs them to compute rates
    pub bytes_recv_gauge: u64,
    pub bytes_sent_gauge: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSystem {
    pub device_name: String,
    pub fs_type: String,
    pub mnt_point: String,
    pub size: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub username: Option<String>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    /// Resident set size in bytes.
    pub memory_rss: u64,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessCount {
    pub total: u64,
    pub running: u64,
    pub sleeping: u64,
    pub thread: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemInfo {
    pub hostname: String,
    pub os_name: String,
    pub platform: Option<String>,
    pub os_version: Option<String>,
    pub linux_distro: Option<String>,
    pub hr_name: String,
}

/// Local mirror of one server's metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub cpu: Cpu,
    pub percpu: Vec<PerCpu>,
    pub mem: Mem,
    pub memswap: MemSwap,
    pub load: Option<Load>,
    pub network: Vec<NetIface>,
    pub fs: Vec<FileSystem>,
    pub processlist: Vec<ProcessInfo>,
    pub processcount: ProcessCount,
    pub system: SystemInfo,
    /// Human-readable uptime, as reported by the server.
    pub uptime: Option<String>,
}

fn section<T: DeserializeOwned + Default>(blob: &Map<String, Value>, name: &str) -> T {
    match blob.get(name) {
        None | Some(Value::Null) => T::default(),
        Some(v) => serde_json::from_value(v.clone()).unwrap_or_else(|e| {
            debug!("ignoring malformed '{name}' section: {e}");
            T::default()
        }),
    }
}

impl Stats {
    /// Plugin names this mirror understands.
    pub const SECTIONS: [&'static str; 11] = [
        "cpu",
        "percpu",
        "mem",
        "memswap",
        "load",
        "network",
        "fs",
        "processlist",
        "processcount",
        "system",
        "uptime",
    ];

    /// Decode a full blob. Returns `None` only when the blob is not a JSON object.
    pub fn from_value(blob: &Value) -> Option<Self> {
        let m = blob.as_object()?;
        Some(Self {
            cpu: section(m, "cpu"),
            percpu: section(m, "percpu"),
            mem: section(m, "mem"),
            memswap: section(m, "memswap"),
            load: section(m, "load"),
            network: section(m, "network"),
            fs: section(m, "fs"),
            processlist: section(m, "processlist"),
            processcount: section(m, "processcount"),
            system: section(m, "system"),
            uptime: section(m, "uptime"),
        })
    }

    /// Replace the mirror with a freshly fetched blob. Returns false when the blob is unusable.
    pub fn update(&mut self, blob: &Value) -> bool {
        match Self::from_value(blob) {
            Some(s) => {
                *self = s;
                true
            }
            None => false,
        }
    }

    /// One plugin's section as JSON, the shape served by `get<Plugin>`.
    pub fn plugin(&self, name: &str) -> Option<Value> {
        let all = serde_json::to_value(self).ok()?;
        all.get(name).cloned()
    }

    pub fn cores(&self) -> usize {
        if !self.percpu.is_empty() {
            self.percpu.len()
        } else {
            self.cpu.cpucore.map(|c| c as usize).unwrap_or(1)
        }
    }
}
