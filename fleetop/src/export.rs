//! Export backends run after each refresh of the local stats mirror.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::warn;

use crate::stats::Stats;

pub trait Export: Send {
    fn name(&self) -> &str;
    fn export(&mut self, host: &str, stats: &Stats) -> io::Result<()>;
}

#[derive(Serialize)]
struct Line<'a> {
    timestamp: String,
    host: &'a str,
    stats: &'a Stats,
}

/// Appends one JSON object per refresh to a file.
pub struct JsonLinesExport {
    path: PathBuf,
    out: BufWriter<File>,
}

impl JsonLinesExport {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Export for JsonLinesExport {
    fn name(&self) -> &str {
        "json"
    }

    fn export(&mut self, host: &str, stats: &Stats) -> io::Result<()> {
        let line = Line {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            host,
            stats,
        };
        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

/// Run every exporter; failures are logged and do not stop the others.
pub fn export_all(exports: &mut [Box<dyn Export>], host: &str, stats: &Stats) {
    for e in exports.iter_mut() {
        if let Err(err) = e.export(host, stats) {
            warn!("{} export failed: {err}", e.name());
        }
    }
}
