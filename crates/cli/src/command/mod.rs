// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subcommand handlers. Each returns a process exit code.

pub mod account;
pub mod login;
pub mod qr;

use std::sync::Arc;

use sophy_session::{EventSink, SessionClient, SessionEvent};
use tokio::sync::broadcast;

use crate::cli::{Cli, Command};

/// Build the client and run the selected subcommand.
pub async fn run(cli: Cli) -> anyhow::Result<i32> {
    let (events_tx, events_rx) = broadcast::channel(16);
    let client = SessionClient::from_config(&cli.client, Arc::new(EventSink::new(events_tx)))?;
    tokio::spawn(log_events(events_rx));

    match cli.command {
        Command::Login(args) => login::login(&client, &args).await,
        Command::Register(args) => login::register(&client, &args).await,
        Command::Qr(args) => qr::run(&client, &args).await,
        Command::Whoami => account::whoami(&client).await,
        Command::Get(args) => account::get(&client, &args).await,
        Command::Logout => account::logout(&client).await,
        Command::ChangePassword(args) => account::change_password(&client, &args).await,
    }
}

async fn log_events(mut rx: broadcast::Receiver<SessionEvent>) {
    while let Ok(event) = rx.recv().await {
        match event {
            SessionEvent::Invalidated => eprintln!("session expired, log in again"),
            other => tracing::debug!(?other, "session event"),
        }
    }
}
