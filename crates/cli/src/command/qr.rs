// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sophy qr`: show a login code and follow it until it settles.

use sophy_session::remote::{Challenge, LoginState, RemoteLoginSession};
use sophy_session::SessionClient;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

use crate::cli::QrArgs;
use crate::render::status_line;

pub async fn run(client: &SessionClient, args: &QrArgs) -> anyhow::Result<i32> {
    let session = client.remote_login();
    let mut challenge = session.request_challenge().await?;
    let mut regenerations = 0;

    loop {
        print_challenge(&challenge);
        let state = follow(&session).await?;
        match state {
            LoginState::Confirmed { .. } => return Ok(0),
            LoginState::Expired { .. } if regenerations < args.regenerate => {
                regenerations += 1;
                challenge = session.regenerate().await?;
            }
            LoginState::Rejected { .. } | LoginState::Expired { .. } | LoginState::Error { .. } => return Ok(1),
            LoginState::Idle | LoginState::AwaitingScan { .. } | LoginState::Scanned { .. } => {
                anyhow::bail!("remote login stopped in state {}", state.as_str())
            }
        }
    }
}

fn print_challenge(challenge: &Challenge) {
    println!("scan this payload with the Sophy app:");
    println!("{}", challenge.qr_payload());
}

/// Print status changes until the attempt reaches a terminal state.
async fn follow(session: &RemoteLoginSession) -> anyhow::Result<LoginState> {
    let mut views = WatchStream::new(session.subscribe());
    let mut last = String::new();
    while let Some(view) = views.next().await {
        let line = status_line(&view);
        if line != last {
            eprintln!("{line}");
            last = line;
        }
        if view.state.is_terminal() {
            return Ok(view.state);
        }
    }
    Ok(session.wait_terminal().await?)
}
