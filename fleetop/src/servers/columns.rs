//! Overview column selection: `plugin:field[:key]` triples.

use serde_json::Value;

use super::record::ServerState;
use crate::limits::Alert;

pub const DEFAULT_COLUMNS: &str = "system:hr_name,load:min5,cpu:total,mem:percent";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub plugin: String,
    pub field: String,
    pub key: Option<String>,
}

/// Which named summary field a column maps to, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    HrName,
    LoadMin5,
    CpuTotal,
    MemPercent,
}

impl Column {
    pub fn new(plugin: &str, field: &str, key: Option<&str>) -> Self {
        Self {
            plugin: plugin.to_string(),
            field: field.to_string(),
            key: key.map(str::to_string),
        }
    }

    /// Record key: `plugin_field[_key]`.
    pub fn record_key(&self) -> String {
        match &self.key {
            Some(k) => format!("{}_{}_{}", self.plugin, self.field, k),
            None => format!("{}_{}", self.plugin, self.field),
        }
    }

    /// Record key holding the agent's decoration for this column.
    pub fn decoration_key(&self) -> String {
        format!("{}_decoration", self.record_key())
    }

    /// Decoration name for this column out of a plugin view. Keyed columns look under the key.
    pub fn decoration(&self, view: &Value) -> Option<String> {
        let scope = match &self.key {
            Some(k) => view.get(k)?,
            None => view,
        };
        scope
            .get(&self.field)?
            .get("decoration")?
            .as_str()
            .map(str::to_string)
    }

    /// Alert level last reported for this column, if the agent decorates it.
    pub fn alert(&self, state: &ServerState) -> Option<Alert> {
        state
            .extra
            .get(&self.decoration_key())?
            .as_str()
            .and_then(Alert::parse)
    }

    pub fn builtin(&self) -> Option<Builtin> {
        if self.key.is_some() {
            return None;
        }
        match (self.plugin.as_str(), self.field.as_str()) {
            ("system", "hr_name") => Some(Builtin::HrName),
            ("load", "min5") => Some(Builtin::LoadMin5),
            ("cpu", "total") => Some(Builtin::CpuTotal),
            ("mem", "percent") => Some(Builtin::MemPercent),
            _ => None,
        }
    }

    /// Two header lines: plugin name, then field (and key).
    pub fn headers(&self) -> (String, String) {
        let second = match &self.key {
            Some(k) => format!("{} {}", self.field, k),
            None => self.field.clone(),
        };
        (self.plugin.to_uppercase(), second.to_uppercase())
    }

    /// Cell text for a record snapshot; `?` when not polled yet.
    pub fn render(&self, state: &ServerState) -> String {
        match self.builtin() {
            Some(Builtin::HrName) => state.hr_name.clone(),
            Some(Builtin::LoadMin5) => state.load_min5.map(|v| format!("{v:.1}")),
            Some(Builtin::CpuTotal) => state.cpu_percent.clone(),
            Some(Builtin::MemPercent) => state.mem_percent.map(|v| format!("{v:.1}")),
            None => state.extra.get(&self.record_key()).map(render_value),
        }
        .unwrap_or_else(|| "?".into())
    }

    /// Pick this column's value out of a plugin payload (object, or list of keyed items).
    pub fn extract(&self, payload: &Value) -> Option<Value> {
        match &self.key {
            None => payload.get(&self.field).cloned(),
            Some(k) => payload.as_array()?.iter().find_map(|item| {
                let key_name = item.get("key")?.as_str()?;
                let item_key = item.get(key_name)?.as_str()?;
                if item_key.eq_ignore_ascii_case(k) {
                    item.get(&self.field).cloned()
                } else {
                    None
                }
            }),
        }
    }
}

pub fn render_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format!("{f:.1}"),
            _ => n.to_string(),
        },
        Value::Null => "?".into(),
        other => other.to_string(),
    }
}

/// Parse a column selection string; malformed triples are dropped.
pub fn parse_columns(def: &str) -> Vec<Column> {
    def.split(',')
        .filter_map(|item| {
            let mut parts = item.trim().split(':');
            let plugin = parts.next().filter(|s| !s.is_empty())?;
            let field = parts.next().filter(|s| !s.is_empty())?;
            let key = parts.next().filter(|s| !s.is_empty());
            Some(Column::new(plugin, field, key))
        })
        .collect()
}
