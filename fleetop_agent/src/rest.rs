//! REST routes under `/api/4`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use fleetop::remote::API_VERSION;
use fleetop::stats::Stats;
use serde_json::{json, Value};

use crate::sampler::current;
use crate::state::AppState;
use crate::views::plugin_view;

type ApiResult = Result<Json<Value>, (StatusCode, String)>;

fn not_found(what: String) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, what)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/all", get(all))
        .route("/pluginslist", get(plugins_list))
        .route("/:plugin", get(plugin))
        .route("/:plugin/:field", get(field))
}

pub fn prefix() -> String {
    format!("/api/{API_VERSION}")
}

async fn status() -> Json<Value> {
    Json(json!({ "version": fleetop::VERSION }))
}

async fn all(State(state): State<AppState>) -> Json<Value> {
    Json(current(&state).await.blob)
}

async fn plugins_list() -> Json<Value> {
    Json(json!(Stats::SECTIONS))
}

async fn plugin(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult {
    current(&state)
        .await
        .plugin(&name)
        .map(Json)
        .ok_or_else(|| not_found(format!("unknown plugin '{name}'")))
}

/// Field of an object plugin, or the field of every item of a list plugin.
pub fn extract_field(section: &Value, field: &str) -> Option<Value> {
    match section {
        Value::Object(m) => m.get(field).cloned(),
        Value::Array(items) => {
            let vals: Vec<Value> = items.iter().filter_map(|i| i.get(field).cloned()).collect();
            (!vals.is_empty()).then_some(Value::Array(vals))
        }
        _ => None,
    }
}

async fn field(
    State(state): State<AppState>,
    Path((name, field)): Path<(String, String)>,
) -> ApiResult {
    let snap = current(&state).await;
    if field == "views" {
        return plugin_view(&snap.stats, &name, &state.limits)
            .map(Json)
            .ok_or_else(|| not_found(format!("no view for plugin '{name}'")));
    }
    let section = snap
        .plugin(&name)
        .ok_or_else(|| not_found(format!("unknown plugin '{name}'")))?;
    let value = extract_field(&section, &field)
        .ok_or_else(|| not_found(format!("unknown field '{name}/{field}'")))?;
    Ok(Json(json!({ field: value })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_of_objects_and_lists() {
        assert_eq!(extract_field(&json!({"total": 3}), "total"), Some(json!(3)));
        assert_eq!(
            extract_field(&json!([{"mnt_point": "/"}, {"mnt_point": "/home"}]), "mnt_point"),
            Some(json!(["/", "/home"]))
        );
        assert_eq!(extract_field(&json!([]), "x"), None);
        assert_eq!(extract_field(&json!("up"), "x"), None);
    }
}
