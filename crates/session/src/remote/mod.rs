// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scan-to-login: a second device approves this one by scanning a QR code.

pub mod api;
pub mod push;
pub mod session;
pub mod state;

pub use api::{Challenge, ChallengeApi, QrStatus};
pub use push::{PushChannel, PushConnector, WsPushConnector};
pub use session::{CountdownConfig, LoginView, RemoteLoginSession};
pub use state::{apply, Effect, LoginState, PushEvent, ScannedUser, Trigger};
