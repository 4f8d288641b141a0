// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Connection and timing settings shared by the gateway and remote login.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Base URL of the REST API (paths like `/auth/login` are appended).
    #[arg(long, default_value = "http://localhost:3000/api", env = "SOPHY_API_URL")]
    pub api_url: String,

    /// Base URL of the push server used for QR login events.
    #[arg(long, default_value = "ws://localhost:3000", env = "SOPHY_PUSH_URL")]
    pub push_url: String,

    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 10000, env = "SOPHY_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Extra attempts for the renewal call after a transport failure.
    #[arg(long, default_value_t = 0, env = "SOPHY_REFRESH_RETRIES")]
    pub refresh_retries: u32,

    /// QR countdown tick in milliseconds.
    #[arg(long, default_value_t = 1000, env = "SOPHY_TICK_MS")]
    pub tick_ms: u64,

    /// Remaining seconds at which a QR challenge is flagged as nearly expired.
    #[arg(long, default_value_t = 30, env = "SOPHY_NEAR_EXPIRY_SECS")]
    pub near_expiry_secs: u64,

    /// Directory holding the persisted session file.
    #[arg(long, env = "SOPHY_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000/api".to_owned(),
            push_url: "ws://localhost:3000".to_owned(),
            request_timeout_ms: 10000,
            refresh_retries: 0,
            tick_ms: 1000,
            near_expiry_secs: 30,
            state_dir: None,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn near_expiry(&self) -> Duration {
        Duration::from_secs(self.near_expiry_secs)
    }

    /// Resolved state directory: explicit setting first, then [`default_state_dir`].
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(default_state_dir)
    }

    /// Path of the JSON file backing the persisted session.
    pub fn session_file(&self) -> PathBuf {
        self.state_dir().join("session.json")
    }
}

/// Resolve the default state directory.
///
/// Checks `SOPHY_STATE_DIR`, then `$XDG_STATE_HOME/sophy`,
/// then `$HOME/.local/state/sophy`.
pub fn default_state_dir() -> PathBuf {
    state_dir_with(|name| std::env::var(name).ok())
}

fn state_dir_with(get_env: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = get_env("SOPHY_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(xdg) = get_env("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("sophy");
    }
    if let Some(home) = get_env("HOME") {
        return PathBuf::from(home).join(".local/state/sophy");
    }
    PathBuf::from(".sophy")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
