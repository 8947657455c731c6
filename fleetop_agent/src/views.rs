//! Plugin views: per-field alert decorations from the agent's configured limits.

use fleetop::limits::Limits;
use fleetop::stats::Stats;
use serde_json::{json, Map, Value};

fn decoration(alert: fleetop::limits::Alert) -> Value {
    json!({ "decoration": alert.as_str() })
}

/// `None` for plugins that have no view.
pub fn plugin_view(stats: &Stats, plugin: &str, limits: &Limits) -> Option<Value> {
    let mut view = Map::new();
    match plugin {
        "cpu" => {
            view.insert("total".into(), decoration(limits.alert("cpu", stats.cpu.total)));
        }
        "mem" => {
            view.insert("percent".into(), decoration(limits.alert("mem", stats.mem.percent)));
        }
        "memswap" => {
            let a = limits.alert("memswap", stats.memswap.percent);
            view.insert("percent".into(), decoration(a));
        }
        "load" => {
            let load = stats.load.as_ref()?;
            let cores = stats.cores();
            for (k, v) in [("min1", load.min1), ("min5", load.min5), ("min15", load.min15)] {
                view.insert(k.into(), decoration(limits.load_alert(v, cores)));
            }
        }
        "fs" => {
            for f in &stats.fs {
                let a = limits.alert("fs", f.percent);
                view.insert(f.mnt_point.clone(), json!({ "used": decoration(a) }));
            }
        }
        _ => return None,
    }
    Some(Value::Object(view))
}
