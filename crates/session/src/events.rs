// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle notifications for the hosting application.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// How a session came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginMethod {
    Password,
    Registration,
    Qr,
}

/// Events emitted as the stored session changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    LoggedIn { user_id: String, method: LoginMethod },
    Refreshed,
    /// The session was cleared after an unrecoverable refresh failure. The
    /// host should return the user to its login entry point.
    Invalidated,
    LoggedOut,
}

/// Host collaborator told about session changes.
///
/// `session_invalidated` is delivered once per failed renewal; the host
/// decides what "go back to login" means (a redirect, a screen swap, exit).
pub trait SessionObserver: Send + Sync {
    fn session_invalidated(&self);

    fn logged_in(&self, _user_id: &str, _method: LoginMethod) {}

    fn refreshed(&self) {}

    fn logged_out(&self) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn session_invalidated(&self) {}
}

/// Broadcasts every notification; send errors (no subscribers) are ignored.
pub struct EventSink {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventSink {
    pub fn new(tx: broadcast::Sender<SessionEvent>) -> Self {
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl SessionObserver for EventSink {
    fn session_invalidated(&self) {
        let _ = self.tx.send(SessionEvent::Invalidated);
    }

    fn logged_in(&self, user_id: &str, method: LoginMethod) {
        let _ = self.tx.send(SessionEvent::LoggedIn { user_id: user_id.to_owned(), method });
    }

    fn refreshed(&self) {
        let _ = self.tx.send(SessionEvent::Refreshed);
    }

    fn logged_out(&self) {
        let _ = self.tx.send(SessionEvent::LoggedOut);
    }
}
