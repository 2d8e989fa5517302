//! Public types consumed by the rewrite engine.

use serde::Deserialize;

use eca_types::{RewriteEvent, RewriteId};

fn default_command() -> String {
    String::from("eca")
}

fn default_args() -> Vec<String> {
    vec![String::from("server")]
}

/// How to launch the ECA server.
///
/// ```toml
/// [server]
/// command = "eca"
/// args = ["server"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Executable, resolved through `PATH`.
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
        }
    }
}

/// Why the server connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStopReason {
    /// Clean EOF on stdout.
    Exited,
    Failed(String),
}

/// An event emitted by the server connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Something happened to a rewrite session: streamed content, or the
    /// failure of its `rewrite/prompt` request.
    Rewrite {
        rewrite_id: RewriteId,
        event: RewriteEvent,
    },
    ServerStopped { reason: ServerStopReason },
}
