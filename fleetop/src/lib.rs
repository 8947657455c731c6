//! fleetop: browse a fleet of monitoring agents, poll their summaries, and drill into one.

pub mod app;
pub mod browser;
pub mod config;
pub mod export;
pub mod history;
pub mod limits;
pub mod password;
pub mod poller;
pub mod remote;
pub mod servers;
pub mod session;
pub mod snmp;
pub mod stats;
pub mod terminal;
pub mod timer;
pub mod ui;

/// Client version; its major component must match the server's.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
