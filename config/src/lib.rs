//! Configuration for the ECA rewrite tools.
//!
//! Settings live in `~/.eca/config.toml`; an absent file means defaults.
//! Mutable state the tools remember between runs (the last prompt) lives in
//! `~/.eca/state.toml`, see [`state`].

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use serde::Deserialize;
use thiserror::Error;

use eca_rpc::ServerConfig;

pub mod state;

pub use state::{load_last_prompt, persist_last_prompt, state_path};

const fn default_true() -> bool {
    true
}

const fn default_flush_delay_ms() -> u64 {
    DEFAULT_FLUSH_DELAY_MS
}

pub const DEFAULT_FLUSH_DELAY_MS: u64 = 10;

/// Allowed debounce window. Shorter than 1ms degenerates into one edit per
/// chunk; longer than 50ms makes streaming visibly stutter.
const FLUSH_DELAY_BOUNDS_MS: (u64, u64) = (1, 50);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EcaConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rewrite: RewriteConfig,
}

/// The `[rewrite]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RewriteConfig {
    /// Prepended to every prompt sent to the backend.
    #[serde(default)]
    pub prompt_prefix: String,
    #[serde(default = "default_flush_delay_ms")]
    pub flush_delay_ms: u64,
    /// Refuse a trigger whose selection overlaps a live session's region.
    #[serde(default = "default_true")]
    pub reject_overlapping: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            prompt_prefix: String::new(),
            flush_delay_ms: DEFAULT_FLUSH_DELAY_MS,
            reject_overlapping: true,
        }
    }
}

impl RewriteConfig {
    /// Flush debounce window, clamped to the supported range.
    #[must_use]
    pub fn flush_delay(&self) -> Duration {
        let (min, max) = FLUSH_DELAY_BOUNDS_MS;
        Duration::from_millis(self.flush_delay_ms.clamp(min, max))
    }
}

/// Replace `${VAR}` references with the variable's value (empty if unset).
///
/// An unterminated `${` is kept verbatim.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(open) = rest.find("${") {
        let Some(close) = rest[open + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let var = &rest[open + 2..open + 2 + close];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[open + 2 + close + 1..];
    }

    out.push_str(rest);
    out
}

impl EcaConfig {
    /// Load `~/.eca/config.toml`. `Ok(None)` when there is no home directory
    /// or no config file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match Self::parse(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    /// Parse config text and expand `${VAR}` references in its string values.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        config.server.command = expand_env_vars(&config.server.command);
        for arg in &mut config.server.args {
            *arg = expand_env_vars(arg);
        }
        config.rewrite.prompt_prefix = expand_env_vars(&config.rewrite.prompt_prefix);
        Ok(config)
    }
}

/// Directory holding config, state, and logs.
#[must_use]
pub fn eca_home() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".eca"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    eca_home().map(|home| home.join("config.toml"))
}
