//! fleetop_agent: serves this host's stats over XML-RPC and REST, announced on the LAN.

mod auth;
mod metrics;
mod rest;
mod rpc;
mod sampler;
mod state;
mod views;

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use axum::{middleware, routing::post, Router};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fleetop::config::Config;
use fleetop::limits::Limits;
use fleetop::password::{digest, hash, PasswordFile};
use fleetop::servers::discovery::Announcer;
use fleetop::servers::record::DEFAULT_USERNAME;
use fleetop::servers::Protocol;
use fleetop::terminal::{prompt_hidden, prompt_yes_no};

use crate::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "fleetop_agent", version, about = "Serve this host's stats to fleetop clients")]
struct Cli {
    #[arg(short, long, default_value_t = 61209)]
    port: u16,

    /// Address to listen on
    #[arg(short = 'B', long = "bind", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Require a password (prompted, or read from the saved password file)
    #[arg(long)]
    password: bool,

    #[arg(long, default_value = DEFAULT_USERNAME)]
    username: String,

    /// Do not announce this agent on the LAN
    #[arg(long)]
    disable_autodiscover: bool,

    /// Refresh stats at most once per this many seconds
    #[arg(long, default_value_t = 1.0)]
    cached_time: f64,

    /// Announce the REST protocol instead of XML-RPC
    #[arg(short = 'w', long)]
    webserver: bool,

    #[arg(short = 'C', long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long)]
    debug: bool,
}

/// Stored `salt$hash` for the agent, prompting and offering to save when none exists.
fn server_password(username: &str, config: &Config) -> Result<String> {
    let file = PasswordFile::new(username, Some(config));
    if file.exists() {
        info!("Using password file {}", file.path().display());
        return Ok(file.load()?);
    }
    let Some(first) = prompt_hidden(&format!("Define the password for the {username} username: "))?
    else {
        bail!("no password entered");
    };
    let Some(again) = prompt_hidden("Password (confirm): ")? else {
        bail!("no password entered");
    };
    if first != again {
        bail!("passwords do not match");
    }
    let stored = hash(&digest(&first));
    if prompt_yes_no("Do you want to save the password?", true)? {
        file.save(&stored)?;
    }
    Ok(stored)
}

/// Address to advertise: the bind address, or the first non-loopback IPv4 when bound to all.
fn announce_ip(bind: IpAddr) -> Option<IpAddr> {
    if !bind.is_unspecified() {
        return Some(bind);
    }
    match if_addrs::get_if_addrs() {
        Ok(ifaces) => ifaces
            .into_iter()
            .filter(|i| !i.is_loopback())
            .map(|i| i.ip())
            .find(IpAddr::is_ipv4),
        Err(e) => {
            warn!("cannot list network interfaces: {e}");
            None
        }
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/RPC2", post(rpc::rpc_handler))
        .nest(&rest::prefix(), rest::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();

    if !cli.cached_time.is_finite() || cli.cached_time <= 0.0 {
        bail!("--cached-time must be positive");
    }
    let config = Config::load(cli.config.as_deref())?;
    let password = if cli.password {
        Some(server_password(&cli.username, &config)?)
    } else {
        None
    };

    let state = AppState::new(
        Duration::from_secs_f64(cli.cached_time),
        &cli.username,
        password,
    )
    .with_limits(Limits::from_config(&config));
    let cancel = CancellationToken::new();
    let sampler = sampler::spawn_sampler(state.clone(), cancel.clone());

    let addr = SocketAddr::new(cli.bind, cli.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("fleetop_agent {} listening on http://{addr}", fleetop::VERSION);

    let protocol = if cli.webserver {
        Protocol::Rest
    } else {
        Protocol::Rpc
    };
    let announcer = if cli.disable_autodiscover {
        None
    } else {
        announce_ip(cli.bind).and_then(|ip| {
            Announcer::announce(&state.hostname, ip, cli.port, protocol)
                .map_err(|e| warn!("cannot announce on the LAN: {e}"))
                .ok()
        })
    };

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            ctrl_c.cancel();
        }
    });

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await;

    cancel.cancel();
    if let Some(a) = announcer {
        let _ = tokio::task::spawn_blocking(move || a.close()).await;
    }
    let _ = sampler.await;
    served.context("server error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn defaults_match_the_rpc_port() {
        let cli = Cli::try_parse_from(["fleetop_agent"]).unwrap();
        assert_eq!(cli.port, 61209);
        assert_eq!(cli.bind, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(cli.username, "glances");
        assert!(!cli.webserver);
    }

    #[test]
    fn explicit_bind_is_announced_as_is() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(announce_ip(ip), Some(ip));
    }
}
