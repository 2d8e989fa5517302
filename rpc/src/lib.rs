//! JSON-RPC client for the ECA assistant server.
//!
//! Spawns the server process, frames messages over its stdio, and turns the
//! `rewrite/*` traffic into [`ServerEvent`]s for the rewrite engine.

pub mod codec;
pub mod protocol;
pub mod types;

pub(crate) mod server;

pub use protocol::{RewritePromptParams, WirePosition, WireRange, path_to_file_uri};
pub use server::EcaServer;
pub use types::{ServerConfig, ServerEvent, ServerStopReason};
