//! `POST /RPC2`: XML-RPC methods answering with JSON text.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use fleetop::limits::Limits;
use fleetop::remote::xmlrpc;
use fleetop::stats::Stats;
use tracing::debug;

use crate::sampler::current;
use crate::state::{AppState, Snapshot};
use crate::views::plugin_view;

/// Fault codes, as in the standard XML-RPC fault-code conventions.
const FAULT_PARSE: i64 = -32700;
const FAULT_METHOD: i64 = -32601;
const FAULT_PARAMS: i64 = -32602;

type Fault = (i64, String);

fn to_json(v: &serde_json::Value) -> String {
    v.to_string()
}

fn plugin_json(snap: &Snapshot, name: &str) -> Result<String, Fault> {
    snap.plugin(name)
        .map(|v| to_json(&v))
        .ok_or_else(|| (FAULT_PARAMS, format!("unknown plugin '{name}'")))
}

/// Answer one call from a snapshot.
pub fn dispatch(
    method: &str,
    params: &[String],
    snap: &Snapshot,
    limits: &Limits,
) -> Result<String, Fault> {
    match method {
        "init" => Ok(fleetop::VERSION.to_string()),
        "getAll" => Ok(to_json(&snap.blob)),
        "getAllPlugins" => Ok(to_json(&serde_json::json!(Stats::SECTIONS))),
        "getPlugin" | "getPluginView" => {
            let name = params
                .first()
                .ok_or_else(|| (FAULT_PARAMS, format!("{method} needs a plugin name")))?;
            if method == "getPlugin" {
                return plugin_json(snap, name);
            }
            plugin_view(&snap.stats, name, limits)
                .map(|v| to_json(&v))
                .ok_or_else(|| (FAULT_PARAMS, format!("no view for plugin '{name}'")))
        }
        m => match m.strip_prefix("get") {
            Some(rest) if !rest.is_empty() => plugin_json(snap, &rest.to_ascii_lowercase())
                .map_err(|_| (FAULT_METHOD, format!("method '{m}' not supported"))),
            _ => Err((FAULT_METHOD, format!("method '{m}' not supported"))),
        },
    }
}

pub async fn rpc_handler(State(state): State<AppState>, body: String) -> Response {
    let reply = match xmlrpc::decode_call(&body) {
        Ok((method, params)) => {
            debug!("rpc call {method}");
            let snap = current(&state).await;
            match dispatch(&method, &params, &snap, &state.limits) {
                Ok(v) => xmlrpc::encode_response(&v),
                Err((code, msg)) => xmlrpc::encode_fault(code, &msg),
            }
        }
        Err(e) => xmlrpc::encode_fault(FAULT_PARSE, &e.to_string()),
    };
    ([(header::CONTENT_TYPE, "text/xml")], reply).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetop::config::Config;

    fn snap() -> Snapshot {
        let mut s = Stats::default();
        s.cpu.total = 12.0;
        s.mem.percent = 40.0;
        s.system.hr_name = "Linux".into();
        Snapshot::new(s)
    }

    fn call(method: &str, params: &[String]) -> Result<String, Fault> {
        dispatch(method, params, &snap(), &Limits::default())
    }

    #[test]
    fn plugin_getters_map_to_sections() {
        let cpu: serde_json::Value = serde_json::from_str(&call("getCpu", &[]).unwrap()).unwrap();
        assert_eq!(cpu["total"], 12.0);
        let mem = call("getPlugin", &["mem".into()]).unwrap();
        assert!(mem.contains("\"percent\":40.0"));
        assert!(call("getProcesslist", &[]).unwrap().starts_with('['));
    }

    #[test]
    fn unknown_methods_fault() {
        assert_eq!(call("getGpu", &[]).unwrap_err().0, FAULT_METHOD);
        assert_eq!(call("reboot", &[]).unwrap_err().0, FAULT_METHOD);
        assert_eq!(call("getPlugin", &[]).unwrap_err().0, FAULT_PARAMS);
    }

    #[test]
    fn init_and_plugin_list() {
        assert_eq!(call("init", &[]).unwrap(), fleetop::VERSION);
        let list: Vec<String> =
            serde_json::from_str(&call("getAllPlugins", &[]).unwrap()).unwrap();
        assert!(list.iter().any(|p| p == "processlist"));
    }

    #[test]
    fn views_use_configured_limits() {
        let view = |limits: &Limits| -> serde_json::Value {
            let out = dispatch("getPluginView", &["cpu".into()], &snap(), limits).unwrap();
            serde_json::from_str(&out).unwrap()
        };
        assert_eq!(view(&Limits::default())["total"]["decoration"], "OK");

        let cfg = Config::parse("[cpu]\ncareful = 5\nwarning = 10\ncritical = 20\n").unwrap();
        assert_eq!(view(&Limits::from_config(&cfg))["total"]["decoration"], "WARNING");
    }
}
