//! Server registry: static entries, discovered peers, and the merged list.

pub mod columns;
pub mod discovery;
pub mod list;
pub mod record;
pub mod static_list;

pub use list::ServerList;
pub use record::{Origin, Protocol, ServerField, ServerRecord, ServerState, ServerStatus};
