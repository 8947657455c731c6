//! Client-side alert thresholds. Evaluated locally even against a remote server.

use std::collections::BTreeMap;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Alert {
    Ok,
    Careful,
    Warning,
    Critical,
}

impl Alert {
    /// Decoration name used in plugin views.
    pub fn as_str(self) -> &'static str {
        match self {
            Alert::Ok => "OK",
            Alert::Careful => "CAREFUL",
            Alert::Warning => "WARNING",
            Alert::Critical => "CRITICAL",
        }
    }

    /// Inverse of [`as_str`](Self::as_str); agents may send lower or mixed case.
    pub fn parse(s: &str) -> Option<Self> {
        [Alert::Ok, Alert::Careful, Alert::Warning, Alert::Critical]
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub careful: f64,
    pub warning: f64,
    pub critical: f64,
}

impl Threshold {
    pub const fn new(careful: f64, warning: f64, critical: f64) -> Self {
        Self {
            careful,
            warning,
            critical,
        }
    }

    pub fn classify(&self, value: f64) -> Alert {
        if value >= self.critical {
            Alert::Critical
        } else if value >= self.warning {
            Alert::Warning
        } else if value >= self.careful {
            Alert::Careful
        } else {
            Alert::Ok
        }
    }
}

const PERCENT_DEFAULT: Threshold = Threshold::new(50.0, 70.0, 90.0);
// per core
const LOAD_DEFAULT: Threshold = Threshold::new(0.7, 1.0, 5.0);

#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    by_section: BTreeMap<&'static str, Threshold>,
}

impl Default for Limits {
    fn default() -> Self {
        let mut by_section = BTreeMap::new();
        for s in ["cpu", "mem", "memswap", "fs"] {
            by_section.insert(s, PERCENT_DEFAULT);
        }
        by_section.insert("load", LOAD_DEFAULT);
        Self { by_section }
    }
}

impl Limits {
    /// Defaults overridden by `careful`/`warning`/`critical` keys of each section.
    pub fn from_config(config: &Config) -> Self {
        let mut limits = Self::default();
        for (section, t) in limits.by_section.iter_mut() {
            if let Some(v) = config.get_float(section, "careful") {
                t.careful = v;
            }
            if let Some(v) = config.get_float(section, "warning") {
                t.warning = v;
            }
            if let Some(v) = config.get_float(section, "critical") {
                t.critical = v;
            }
        }
        limits
    }

    pub fn threshold(&self, section: &str) -> Option<&Threshold> {
        self.by_section.get(section)
    }

    /// Alert for a percentage-style value of `section`. Unknown sections are always Ok.
    pub fn alert(&self, section: &str, value: f64) -> Alert {
        self.threshold(section)
            .map(|t| t.classify(value))
            .unwrap_or(Alert::Ok)
    }

    /// Load is judged relative to the core count.
    pub fn load_alert(&self, load: f64, cores: usize) -> Alert {
        self.alert("load", load / cores.max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let cfg = Config::parse("[mem]\ncareful = 10\nwarning = 20\ncritical = 30\n").unwrap();
        let l = Limits::from_config(&cfg);
        assert_eq!(l.alert("mem", 25.0), Alert::Warning);
        assert_eq!(l.alert("cpu", 25.0), Alert::Ok);
        assert_eq!(l.alert("cpu", 95.0), Alert::Critical);
        assert_eq!(l.alert("sensors", 1e9), Alert::Ok);
    }

    #[test]
    fn decoration_names_parse_back() {
        assert_eq!(Alert::parse("warning"), Some(Alert::Warning));
        assert_eq!(Alert::parse(Alert::Critical.as_str()), Some(Alert::Critical));
        assert_eq!(Alert::parse("DEFAULT"), None);
    }

    #[test]
    fn load_is_per_core() {
        let l = Limits::default();
        assert_eq!(l.load_alert(3.0, 4), Alert::Careful);
        assert_eq!(l.load_alert(3.0, 1), Alert::Warning);
        assert_eq!(l.load_alert(3.0, 0), Alert::Warning);
    }
}
