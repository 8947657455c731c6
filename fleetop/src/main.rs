//! Entry point for the fleetop TUI: direct client mode or the server browser.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fleetop::app::App;
use fleetop::browser::{BrowserSession, BrowserSettings};
use fleetop::config::{config_dir, Config};
use fleetop::export::{Export, JsonLinesExport};
use fleetop::limits::Limits;
use fleetop::password::{digest, PasswordVault};
use fleetop::servers::{Protocol, ServerList};
use fleetop::session::{ClientSession, SessionConfig};
use fleetop::snmp;
use fleetop::terminal::prompt_hidden;

#[derive(Debug, Parser)]
#[command(name = "fleetop", version, about = "Browse and monitor remote monitoring agents")]
#[command(group(ArgGroup::new("mode").required(true).args(["browser", "client"])))]
struct Cli {
    /// Start the server browser (static list plus discovered servers)
    #[arg(long)]
    browser: bool,

    /// Connect to one server
    #[arg(short = 'c', long = "client", value_name = "HOST")]
    client: Option<String>,

    /// Server port (defaults to 61209 for rpc, 61208 for rest)
    #[arg(short, long)]
    port: Option<u16>,

    /// Wire protocol of the server given with --client
    #[arg(long, default_value = "rpc")]
    protocol: Protocol,

    #[arg(short, long)]
    username: Option<String>,

    /// Prompt for the server password
    #[arg(long)]
    password: bool,

    /// Do not look for servers on the LAN
    #[arg(long)]
    disable_autodiscover: bool,

    /// Skip the agent protocol and speak SNMP directly
    #[arg(long)]
    snmp_force: bool,

    #[arg(long, value_name = "COMMUNITY")]
    snmp_community: Option<String>,

    #[arg(long)]
    snmp_port: Option<u16>,

    /// No display; keep refreshing (and exporting) until Ctrl-C
    #[arg(short, long)]
    quiet: bool,

    /// Refresh interval in seconds
    #[arg(short = 't', long = "time", default_value = "2", value_parser = parse_refresh)]
    refresh: Duration,

    /// Configuration file
    #[arg(short = 'C', long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Append every refresh as one JSON line to PATH
    #[arg(long, value_name = "PATH")]
    export_json: Option<PathBuf>,

    #[arg(long)]
    debug: bool,
}

fn parse_refresh(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a number of seconds"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err("refresh time must be positive".into());
    }
    Ok(Duration::from_secs_f64(secs))
}

/// The terminal belongs to the UI, so logs go to a file.
fn init_logging(path: &Path, debug: bool) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn snmp_settings(cli: &Cli, config: &Config) -> (String, u16) {
    let community = cli
        .snmp_community
        .clone()
        .or_else(|| config.get_value("snmp", "community"))
        .unwrap_or_else(|| snmp::DEFAULT_COMMUNITY.to_string());
    let port = cli
        .snmp_port
        .or_else(|| config.get_value("snmp", "port").and_then(|p| p.trim().parse().ok()))
        .unwrap_or(snmp::DEFAULT_PORT);
    (community, port)
}

fn exports(cli: &Cli) -> Result<Vec<Box<dyn Export>>> {
    let mut out: Vec<Box<dyn Export>> = Vec::new();
    if let Some(path) = &cli.export_json {
        let e = JsonLinesExport::open(path)
            .with_context(|| format!("opening export file {}", path.display()))?;
        out.push(Box::new(e));
    }
    Ok(out)
}

async fn run_client(cli: &Cli, config: &Config, host: &str) -> Result<()> {
    let port = cli.port.unwrap_or_else(|| cli.protocol.default_port());
    let mut session = SessionConfig::new(host, port);
    session.protocol = cli.protocol;
    session.refresh = cli.refresh;
    session.quiet = cli.quiet;
    session.snmp_force = cli.snmp_force;
    if let Some(u) = &cli.username {
        session.username = u.clone();
    }
    (session.snmp_community, session.snmp_port) = snmp_settings(cli, config);

    session.password = if cli.password {
        match prompt_hidden(&format!("Password for {host}: "))? {
            Some(clear) => Some(digest(&clear)),
            None => return Ok(()),
        }
    } else {
        PasswordVault::from_config(config).lookup(host).map(digest)
    };

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut client = ClientSession::new(session, Limits::from_config(config))
        .with_exports(exports(cli)?)
        .with_shutdown(shutdown);
    if !cli.quiet {
        client = client.with_display(Box::new(App::new(host)));
    }
    let uri = client.uri();
    let mode = client
        .run()
        .await
        .with_context(|| format!("connection to {uri} failed"))?;
    info!("Session with {uri} ended ({mode:?})");
    Ok(())
}

async fn run_browser(cli: &Cli, config: &Config, log_file: PathBuf) -> Result<()> {
    let (snmp_community, snmp_port) = snmp_settings(cli, config);
    let settings = BrowserSettings {
        refresh: cli.refresh,
        log_file,
        limits: Limits::from_config(config),
        snmp_community,
        snmp_port,
        export_json: cli.export_json.clone(),
    };
    let list = ServerList::from_config(config, !cli.disable_autodiscover);
    BrowserSession::new(list, settings).run().await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = cli
        .log_file
        .clone()
        .unwrap_or_else(|| config_dir().join("fleetop.log"));
    init_logging(&log_file, cli.debug)?;
    info!("fleetop {} starting", fleetop::VERSION);

    let config = Config::load(cli.config.as_deref())?;

    match cli.client.as_deref() {
        Some(host) => run_client(&cli, &config, host).await,
        None => run_browser(&cli, &config, log_file).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_accepts_fractions_and_rejects_nonsense() {
        assert_eq!(parse_refresh("0.5"), Ok(Duration::from_millis(500)));
        assert!(parse_refresh("0").is_err());
        assert!(parse_refresh("-1").is_err());
        assert!(parse_refresh("soon").is_err());
    }

    #[test]
    fn mode_is_required_and_exclusive() {
        assert!(Cli::try_parse_from(["fleetop"]).is_err());
        assert!(Cli::try_parse_from(["fleetop", "--browser", "-c", "a"]).is_err());
        let cli = Cli::try_parse_from(["fleetop", "-c", "alpha", "-t", "5", "--protocol", "rest"])
            .unwrap();
        assert_eq!(cli.client.as_deref(), Some("alpha"));
        assert_eq!(cli.refresh, Duration::from_secs(5));
        assert_eq!(cli.protocol, Protocol::Rest);
    }

    #[test]
    fn snmp_settings_prefer_cli_then_config() {
        let config = Config::parse("[snmp]\ncommunity = \"private\"\nport = 1161\n").unwrap();
        let cli = Cli::try_parse_from(["fleetop", "--browser"]).unwrap();
        assert_eq!(snmp_settings(&cli, &config), ("private".to_string(), 1161));
        let cli = Cli::try_parse_from(["fleetop", "--browser", "--snmp-community", "ops"]).unwrap();
        assert_eq!(snmp_settings(&cli, &config), ("ops".to_string(), 1161));
    }
}
