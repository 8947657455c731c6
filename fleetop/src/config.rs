//! Configuration: TOML file of sections mapped to flat key/value lookups.
//! Stored under XDG config dir: $XDG_CONFIG_HOME/fleetop/fleetop.toml (fallback ~/.config/fleetop/fleetop.toml)

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("fleetop")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fleetop")
    }
}

pub fn config_path() -> PathBuf {
    config_dir().join("fleetop.toml")
}

/// Parsed configuration. Every scalar is kept as a string; callers parse what they need.
#[derive(Debug, Clone, Default)]
pub struct Config {
    sections: BTreeMap<String, BTreeMap<String, String>>,
    path: Option<PathBuf>,
}

impl Config {
    /// Load the given file, or the default location. A missing default file yields an
    /// empty configuration; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (config_path(), false),
        };
        match fs::read_to_string(&path) {
            Ok(s) => {
                let mut cfg = Self::parse(&s).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?;
                info!("Read configuration file {}", path.display());
                cfg.path = Some(path);
                Ok(cfg)
            }
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No configuration file at {}", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }

    pub fn parse(s: &str) -> Result<Self, toml::de::Error> {
        let table: toml::Table = s.parse()?;
        let mut sections = BTreeMap::new();
        for (name, value) in table {
            let toml::Value::Table(entries) = value else {
                continue;
            };
            let flat: BTreeMap<String, String> = entries
                .into_iter()
                .filter_map(|(k, v)| scalar_to_string(v).map(|s| (k, s)))
                .collect();
            sections.insert(name, flat);
        }
        Ok(Self {
            sections,
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    pub fn get_value(&self, section: &str, key: &str) -> Option<String> {
        self.sections.get(section)?.get(key).cloned()
    }

    pub fn get_float(&self, section: &str, key: &str) -> Option<f64> {
        self.get_value(section, key)?.trim().parse().ok()
    }

    pub fn items(&self, section: &str) -> BTreeMap<String, String> {
        self.sections.get(section).cloned().unwrap_or_default()
    }

    pub fn set_value(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }
}

fn scalar_to_string(v: toml::Value) -> Option<String> {
    match v {
        toml::Value::String(s) => Some(s),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[serverlist]
server_1_name = "localhost"
server_1_port = 61209
columns = "cpu:total,mem:percent"

[passwords]
default = "secret"

[cpu]
careful = 50.0
"#;

    #[test]
    fn scalars_become_strings() {
        let cfg = Config::parse(SAMPLE).unwrap();
        assert!(cfg.has_section("serverlist"));
        assert_eq!(
            cfg.get_value("serverlist", "server_1_port").as_deref(),
            Some("61209")
        );
        assert_eq!(cfg.get_float("cpu", "careful"), Some(50.0));
        assert_eq!(cfg.get_value("passwords", "default").as_deref(), Some("secret"));
        assert!(cfg.get_value("serverlist", "server_2_name").is_none());
        assert!(!cfg.has_section("fs"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let td = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&td.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn loads_file_from_disk() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("fleetop.toml");
        fs::write(&p, SAMPLE).unwrap();
        let cfg = Config::load(Some(&p)).unwrap();
        assert_eq!(cfg.path(), Some(p.as_path()));
        assert_eq!(cfg.items("serverlist").len(), 3);
    }
}
