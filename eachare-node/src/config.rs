//! Load settings from file and environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::node::Settings;

/// Node settings. File: `-c <path>`, else ~/.config/eachare/config.toml or /etc/eachare/config.toml.
/// Env overrides: EACHARE_CHUNK_SIZE, EACHARE_REQUEST_TIMEOUT_MS, EACHARE_LOG_LEVEL.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Initial chunk size in bytes (default 256). Changeable from the menu.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// In-flight chunk requests per origin manager (default 50).
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_per_manager: usize,
    /// Failures before an origin is dropped from a download (default 15).
    #[serde(default = "default_max_failures")]
    pub max_failures_per_origin: u32,
    /// Retries of one chunk before the download is aborted (default 15).
    #[serde(default = "default_max_retries")]
    pub max_retries_per_chunk: u32,
    /// Dial + write + read budget for one chunk request (default 10000 ms).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Dial + write + read budget for gossip messages (default 2000 ms).
    #[serde(default = "default_gossip_timeout_ms")]
    pub gossip_timeout_ms: u64,
    /// Wait before retrying a chunk when no healthy origin is left (default 1000 ms).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Log filter when RUST_LOG is unset (default "info").
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_chunk_size() -> u64 {
    eachare_core::DEFAULT_CHUNK_SIZE
}
fn default_max_concurrent() -> usize {
    50
}
fn default_max_failures() -> u32 {
    eachare_core::health::DEFAULT_MAX_FAILURES_PER_ORIGIN
}
fn default_max_retries() -> u32 {
    15
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_gossip_timeout_ms() -> u64 {
    2_000
}
fn default_retry_backoff_ms() -> u64 {
    1_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_concurrent_per_manager: default_max_concurrent(),
            max_failures_per_origin: default_max_failures(),
            max_retries_per_chunk: default_max_retries(),
            request_timeout_ms: default_request_timeout_ms(),
            gossip_timeout_ms: default_gossip_timeout_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Replace values that would stall or break a download with their defaults.
    fn sanitized(mut self) -> Self {
        if self.chunk_size == 0 {
            self.chunk_size = default_chunk_size();
        }
        if self.max_concurrent_per_manager == 0 {
            self.max_concurrent_per_manager = default_max_concurrent();
        }
        if self.max_failures_per_origin == 0 {
            self.max_failures_per_origin = default_max_failures();
        }
        if self.request_timeout_ms == 0 {
            self.request_timeout_ms = default_request_timeout_ms();
        }
        if self.gossip_timeout_ms == 0 {
            self.gossip_timeout_ms = default_gossip_timeout_ms();
        }
        self
    }

    pub fn settings(&self) -> Settings {
        Settings {
            max_concurrent_per_manager: self.max_concurrent_per_manager,
            max_failures_per_origin: self.max_failures_per_origin,
            max_retries_per_chunk: self.max_retries_per_chunk,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            gossip_timeout: Duration::from_millis(self.gossip_timeout_ms),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// Load config: defaults, then the config file (if present), then env vars.
///
/// Runs before logging is set up, so a file that cannot be used is returned as a
/// warning next to the defaults instead of being reported here.
pub fn load(explicit: Option<&Path>) -> (Config, Option<String>) {
    let (file, warning) = match load_file(explicit) {
        Ok(c) => (c, None),
        Err(w) => (None, Some(w)),
    };
    let mut c = file.unwrap_or_default();
    if let Ok(s) = std::env::var("EACHARE_CHUNK_SIZE") {
        if let Ok(n) = s.parse::<u64>() {
            c.chunk_size = n;
        }
    }
    if let Ok(s) = std::env::var("EACHARE_REQUEST_TIMEOUT_MS") {
        if let Ok(n) = s.parse::<u64>() {
            c.request_timeout_ms = n;
        }
    }
    if let Ok(s) = std::env::var("EACHARE_LOG_LEVEL") {
        if !s.is_empty() {
            c.log_level = s;
        }
    }
    (c.sanitized(), warning)
}

fn config_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(p) = explicit {
        return vec![p.to_path_buf()];
    }
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/eachare/config.toml"));
    }
    out.push(PathBuf::from("/etc/eachare/config.toml"));
    out
}

/// The first config file that exists, parsed. `Ok(None)` when there is none.
fn load_file(explicit: Option<&Path>) -> Result<Option<Config>, String> {
    let Some(p) = config_paths(explicit).into_iter().find(|p| p.exists()) else {
        return Ok(None);
    };
    let text =
        std::fs::read_to_string(&p).map_err(|e| format!("cannot read {}: {e}", p.display()))?;
    toml::from_str::<Config>(&text)
        .map(Some)
        .map_err(|e| format!("ignoring {}: {e}", p.display()))
}
