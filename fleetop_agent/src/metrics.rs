//! Metrics collection using sysinfo, shaped as the stats blob clients decode.

use std::cmp::Ordering;

use fleetop::snmp::format_uptime;
use fleetop::stats::{
    Cpu, FileSystem, Load, Mem, MemSwap, NetIface, PerCpu, ProcessCount, ProcessInfo, Stats,
    SystemInfo,
};
use sysinfo::{ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};
use tracing::warn;

use crate::state::AppState;

/// Name `platform.system()` would report for this build target.
fn os_name() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Darwin",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        "openbsd" => "OpenBSD",
        "netbsd" => "NetBSD",
        other => other,
    }
}

fn platform() -> &'static str {
    if cfg!(target_pointer_width = "64") {
        "64bit"
    } else {
        "32bit"
    }
}

/// Short human-readable OS line shown in the overview, e.g. `Ubuntu 22.04 64bit`.
pub fn hr_name(os_name: &str, distro: Option<&str>, version: Option<&str>) -> String {
    match (os_name, distro, version) {
        ("Linux", Some(d), _) if !d.is_empty() => format!("{d} {}", platform()),
        (name, _, Some(v)) if !v.is_empty() => format!("{name} {v} {}", platform()),
        (name, _, _) => format!("{name} {}", platform()),
    }
}

fn system_info(hostname: &str) -> SystemInfo {
    let name = os_name();
    let distro = if name == "Linux" {
        match (System::name(), System::os_version()) {
            (Some(n), Some(v)) => Some(format!("{n} {v}")),
            (Some(n), None) => Some(n),
            _ => None,
        }
    } else {
        None
    };
    let version = System::os_version();
    SystemInfo {
        hostname: hostname.to_string(),
        os_name: name.to_string(),
        platform: Some(platform().to_string()),
        hr_name: hr_name(name, distro.as_deref(), version.as_deref()),
        os_version: version,
        linux_distro: distro,
    }
}

pub async fn collect_stats(state: &AppState) -> Stats {
    let mut sys = state.sys.lock().await;
    sys.refresh_cpu_usage();
    sys.refresh_memory();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing()
            .with_cpu()
            .with_memory()
            .with_user(UpdateKind::OnlyIfNotSet)
            .with_tasks(),
    );

    let cores = sys.cpus().len().max(1);
    let total = f64::from(sys.global_cpu_usage()).clamp(0.0, 100.0);
    let cpu = Cpu {
        total,
        idle: 100.0 - total,
        cpucore: Some(cores as u32),
        ..Default::default()
    };
    let percpu: Vec<PerCpu> = sys
        .cpus()
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let t = f64::from(c.cpu_usage()).clamp(0.0, 100.0);
            PerCpu {
                cpu_number: i as u32,
                total: t,
                idle: 100.0 - t,
                ..Default::default()
            }
        })
        .collect();

    let mem_total = sys.total_memory();
    let available = sys.available_memory();
    let used = mem_total.saturating_sub(available);
    let mem = Mem {
        total: mem_total,
        available,
        used,
        free: sys.free_memory(),
        percent: percent(used, mem_total),
    };
    let memswap = MemSwap {
        total: sys.total_swap(),
        used: sys.used_swap(),
        free: sys.free_swap(),
        percent: percent(sys.used_swap(), sys.total_swap()),
    };

    let load = if cfg!(windows) {
        None
    } else {
        let la = System::load_average();
        Some(Load {
            min1: la.one,
            min5: la.five,
            min15: la.fifteen,
            cpucore: cores as u32,
        })
    };

    let users = state.users.lock().await;
    let mut count = ProcessCount::default();
    let mut processlist: Vec<ProcessInfo> = sys
        .processes()
        .values()
        .filter(|p| p.thread_kind().is_none())
        .map(|p| {
            count.total += 1;
            match p.status() {
                ProcessStatus::Run => count.running += 1,
                ProcessStatus::Sleep | ProcessStatus::Idle => count.sleeping += 1,
                _ => {}
            }
            count.thread += p.tasks().map(|t| t.len() as u64).unwrap_or(0).max(1);
            ProcessInfo {
                pid: p.pid().as_u32(),
                name: p.name().to_string_lossy().into_owned(),
                username: p
                    .user_id()
                    .and_then(|uid| users.get_user_by_id(uid))
                    .map(|u| u.name().to_string()),
                cpu_percent: f64::from(p.cpu_usage()),
                memory_percent: percent(p.memory(), mem_total),
                memory_rss: p.memory(),
                status: Some(p.status().to_string()),
            }
        })
        .collect();
    drop(users);
    drop(sys);
    processlist.sort_by(|a, b| {
        b.cpu_percent
            .partial_cmp(&a.cpu_percent)
            .unwrap_or(Ordering::Equal)
    });

    let network: Vec<NetIface> = {
        let mut nets = state.networks.lock().await;
        nets.refresh(true);
        nets.iter()
            .map(|(name, data)| NetIface {
                interface_name: name.to_string(),
                bytes_recv_gauge: data.total_received(),
                bytes_sent_gauge: data.total_transmitted(),
            })
            .collect()
    };

    let fs: Vec<FileSystem> = {
        let mut disks = state.disks.lock().await;
        disks.refresh(true);
        disks
            .iter()
            .filter(|d| d.total_space() > 0)
            .map(|d| {
                let size = d.total_space();
                let free = d.available_space();
                let used = size.saturating_sub(free);
                FileSystem {
                    device_name: d.name().to_string_lossy().into_owned(),
                    fs_type: d.file_system().to_string_lossy().into_owned(),
                    mnt_point: d.mount_point().to_string_lossy().into_owned(),
                    size,
                    used,
                    free,
                    percent: percent(used, size),
                }
            })
            .collect()
    };

    if percpu.is_empty() {
        warn!("sysinfo reported no CPUs");
    }

    Stats {
        cpu,
        percpu,
        mem,
        memswap,
        load,
        network,
        fs,
        processlist,
        processcount: count,
        system: system_info(&state.hostname),
        uptime: Some(format_uptime(System::uptime() * 100)),
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        ((part as f64 / whole as f64) * 1000.0).round() / 10.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_to_one_decimal() {
        assert_eq!(percent(1, 3), 33.3);
        assert_eq!(percent(5, 0), 0.0);
    }

    #[test]
    fn hr_name_prefers_distro_on_linux() {
        let p = platform();
        assert_eq!(hr_name("Linux", Some("Ubuntu 22.04"), Some("22.04")), format!("Ubuntu 22.04 {p}"));
        assert_eq!(hr_name("Darwin", None, Some("14.1")), format!("Darwin 14.1 {p}"));
        assert_eq!(hr_name("Windows", None, None), format!("Windows {p}"));
    }

    #[tokio::test]
    async fn collected_blob_decodes_on_the_client_side() {
        let state = AppState::new(std::time::Duration::from_secs(1), "glances", None);
        let stats = collect_stats(&state).await;
        let blob = serde_json::to_value(&stats).unwrap();
        let back = Stats::from_value(&blob).unwrap();
        assert_eq!(back.system.hostname, state.hostname);
        assert!(!back.system.hr_name.is_empty());
        assert!(back.mem.total > 0);
    }
}
