// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Smoke tests that run the real `sophy` binary against the mock server.

use std::path::Path;
use std::process::Output;

use sophy_specs::{sophy_binary, MockServer};

async fn sophy(server: &MockServer, state_dir: &Path, args: &[&str]) -> anyhow::Result<Output> {
    let binary = sophy_binary();
    anyhow::ensure!(binary.exists(), "sophy binary not found at {}", binary.display());
    let output = tokio::process::Command::new(binary)
        .arg("--api-url")
        .arg(server.api_url())
        .arg("--push-url")
        .arg(server.push_url())
        .arg("--state-dir")
        .arg(state_dir)
        .args(args)
        .env_remove("SOPHY_PASSWORD")
        .output()
        .await?;
    Ok(output)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn login_whoami_logout() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    server.add_account("0912345678", "abc123", "U1", "Lan Nguyen");
    let dir = tempfile::tempdir()?;

    let out = sophy(&server, dir.path(), &["login", "0912345678", "--password", "abc123"]).await?;
    assert!(out.status.success(), "login failed: {}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("Lan Nguyen"));
    assert!(dir.path().join("session.json").exists());

    let out = sophy(&server, dir.path(), &["whoami"]).await?;
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("\"userId\": \"U1\""));

    let out = sophy(&server, dir.path(), &["logout"]).await?;
    assert!(out.status.success());

    let out = sophy(&server, dir.path(), &["whoami"]).await?;
    assert_eq!(out.status.code(), Some(1));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_refreshes_expired_token() -> anyhow::Result<()> {
    let server = MockServer::start().await?;
    server.add_account("0912345678", "abc123", "U1", "Lan Nguyen");
    let dir = tempfile::tempdir()?;

    let out = sophy(&server, dir.path(), &["login", "0912345678", "--password", "abc123"]).await?;
    assert!(out.status.success());

    server.expire_access_tokens();
    let out = sophy(&server, dir.path(), &["get", "/users/me"]).await?;
    assert!(out.status.success(), "get failed: {}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(server.refresh_calls(), 1);
    Ok(())
}
