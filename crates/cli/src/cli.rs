// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::{Parser, Subcommand};
use sophy_session::ClientConfig;

/// Sophy account client: password and QR login with automatic token refresh.
#[derive(Debug, Parser)]
#[command(name = "sophy", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub client: ClientConfig,

    /// Log format (json or text).
    #[arg(long, env = "SOPHY_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "SOPHY_LOG_LEVEL", default_value = "warn", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in with phone number and password.
    Login(LoginArgs),
    /// Create an account and log in.
    Register(RegisterArgs),
    /// Log in by scanning a QR code with an already signed-in phone.
    Qr(QrArgs),
    /// Show the signed-in user.
    Whoami,
    /// GET an API path with the stored session and print the response.
    Get(GetArgs),
    /// End the session on the server and forget it locally.
    Logout,
    /// Change the password of the signed-in user.
    ChangePassword(ChangePasswordArgs),
}

#[derive(Debug, clap::Args)]
pub struct LoginArgs {
    /// Phone number (`+84` is rewritten to a leading `0`).
    pub phone: String,
    #[arg(long, env = "SOPHY_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Debug, clap::Args)]
pub struct RegisterArgs {
    pub phone: String,
    #[arg(long, env = "SOPHY_PASSWORD", hide_env_values = true)]
    pub password: String,
    #[arg(long)]
    pub fullname: String,
    /// Birthday as YYYY-MM-DD.
    #[arg(long)]
    pub birthday: String,
    #[arg(long)]
    pub male: bool,
}

#[derive(Debug, clap::Args)]
pub struct QrArgs {
    /// Issue up to N fresh codes after one expires.
    #[arg(long, default_value_t = 0)]
    pub regenerate: u32,
}

#[derive(Debug, clap::Args)]
pub struct GetArgs {
    /// Path relative to the API base, e.g. `/conversations`.
    pub path: String,
}

#[derive(Debug, clap::Args)]
pub struct ChangePasswordArgs {
    #[arg(long, env = "SOPHY_OLD_PASSWORD", hide_env_values = true)]
    pub old_password: String,
    #[arg(long, env = "SOPHY_NEW_PASSWORD", hide_env_values = true)]
    pub new_password: String,
}

impl Cli {
    /// Reject settings clap cannot check on its own.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        if let Command::Register(ref args) = self.command {
            chrono::NaiveDate::parse_from_str(&args.birthday, "%Y-%m-%d")
                .map_err(|e| anyhow::anyhow!("invalid birthday {:?}: {e}", args.birthday))?;
        }
        if let Command::Get(ref args) = self.command {
            if !args.path.starts_with('/') {
                anyhow::bail!("path must start with '/': {}", args.path);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
