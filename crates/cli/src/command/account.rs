// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sophy whoami`, `get`, `logout` and `change-password`.

use sophy_session::{ApiRequest, Error, SessionClient};

use crate::cli::{ChangePasswordArgs, GetArgs};

pub async fn whoami(client: &SessionClient) -> anyhow::Result<i32> {
    let Some(session) = client.store().get() else {
        eprintln!("not logged in");
        return Ok(1);
    };
    match client.auth().profile().await {
        Ok(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
        Err(Error::RefreshFailed(_)) => {
            eprintln!("session expired, log in again");
            return Ok(1);
        }
        Err(e) => {
            tracing::warn!(err = %e, "profile lookup failed");
            println!("{}", session.user_id);
        }
    }
    Ok(0)
}

pub async fn get(client: &SessionClient, args: &GetArgs) -> anyhow::Result<i32> {
    let resp = client.gateway().send(ApiRequest::get(args.path.as_str())).await?;
    let body = String::from_utf8_lossy(&resp.body);
    if resp.is_success() {
        println!("{body}");
        Ok(0)
    } else {
        eprintln!("HTTP {}: {body}", resp.status);
        Ok(1)
    }
}

pub async fn logout(client: &SessionClient) -> anyhow::Result<i32> {
    if client.store().get().is_none() {
        println!("not logged in");
        return Ok(0);
    }
    if let Err(e) = client.auth().logout().await {
        eprintln!("server logout failed ({e}); local session cleared");
    }
    println!("logged out");
    Ok(0)
}

pub async fn change_password(client: &SessionClient, args: &ChangePasswordArgs) -> anyhow::Result<i32> {
    match client.auth().change_password(&args.old_password, &args.new_password).await {
        Ok(message) if message.is_empty() => println!("password changed"),
        Ok(message) => println!("{message}"),
        Err(Error::AuthInvalid { message, .. }) => {
            eprintln!("current password rejected: {message}");
            return Ok(1);
        }
        Err(e) => return Err(e.into()),
    }
    Ok(0)
}
