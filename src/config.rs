//! Client configuration: endpoints plus the tunables of the reconciler and
//! the timer state machines.
//!
//! Every field has a default, so an empty TOML file (or no file at all) is a
//! valid configuration. Environment variables override the endpoints.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ChatError, Result};

/// Tunables of the edit/reaction reconciler.
///
/// The windows and the similarity ratio are empirically tuned; they are
/// configuration, not invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Recent edits older than this are pruned whenever a new edit is recorded.
    pub edit_retain_ms: u64,
    /// Only recent edits younger than this are considered for a match.
    pub edit_match_window_ms: u64,
    /// Maximum number of recent edits retained.
    pub edit_buffer_cap: usize,
    /// Minimum shorter:longer length ratio for a fuzzy text match.
    pub match_ratio: f64,
    /// Maximum number of distinct emoji keys on one message.
    pub reaction_cap: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            edit_retain_ms: 15_000,
            edit_match_window_ms: 30_000,
            edit_buffer_cap: 20,
            match_ratio: 0.8,
            reaction_cap: 5,
        }
    }
}

/// Durations of the independent UI timers, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub typing_expiry_ms: u64,
    pub flash_fallback_ms: u64,
    /// How long a flash keeps going once it has been seen on screen.
    pub flash_linger_ms: u64,
    pub stream_coalesce_ms: u64,
    pub mute_tick_ms: u64,
    pub keepalive_ms: u64,
    pub health_check_ms: u64,
    /// Resolution of the scheduler tick driving all of the above.
    pub tick_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        TimerConfig {
            typing_expiry_ms: 1_000,
            flash_fallback_ms: 6_000,
            flash_linger_ms: 2_000,
            stream_coalesce_ms: 50,
            mute_tick_ms: 1_000,
            keepalive_ms: 5_000,
            health_check_ms: 300_000,
            tick_ms: 25,
        }
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket base URL; the socket path is `{server_url}/ws/{token}`.
    pub server_url: String,
    /// REST base URL for `/upload` and `/health`.
    pub api_base: String,
    pub reconcile: ReconcileConfig,
    pub timers: TimerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_url: "ws://localhost:8000".to_string(),
            api_base: "http://localhost:8000".to_string(),
            reconcile: ReconcileConfig::default(),
            timers: TimerConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ChatError::Config {
            path: origin.to_string(),
            detail: e.to_string(),
        })
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ChatError::Config {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    /// Load from `path` if given, otherwise start from defaults; then apply
    /// environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `THREADLINE_SERVER` / `THREADLINE_API` overrides.
    ///
    /// The lookup is injected so tests do not have to mutate the process
    /// environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("THREADLINE_SERVER").filter(|s| !s.trim().is_empty()) {
            self.server_url = url;
        }
        if let Some(url) = lookup("THREADLINE_API").filter(|s| !s.trim().is_empty()) {
            self.api_base = url;
        }
    }

    /// Full socket URL for a bearer token.
    pub fn socket_url(&self, token: &str) -> String {
        format!("{}/ws/{}", self.server_url.trim_end_matches('/'), token)
    }

}
