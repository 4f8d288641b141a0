// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal rendering of remote-login progress.

use std::time::Duration;

use sophy_session::remote::{LoginState, LoginView};

/// `m:ss`, rounding partial seconds up so `0:00` only shows at expiry.
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_millis().div_ceil(1000);
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// One status line for the current view.
pub fn status_line(view: &LoginView) -> String {
    match &view.state {
        LoginState::Idle => "requesting code...".to_owned(),
        LoginState::AwaitingScan { .. } => {
            let hint = if view.near_expiry { " (expiring soon)" } else { "" };
            format!("waiting for scan, {} left{hint}", format_remaining(view.remaining))
        }
        LoginState::Scanned { user, .. } => format!(
            "scanned by {}, confirm on your phone ({} left)",
            user.fullname,
            format_remaining(view.remaining)
        ),
        LoginState::Confirmed { user_id } => format!("logged in as {user_id}"),
        LoginState::Rejected { message } => format!("rejected: {message}"),
        LoginState::Expired { .. } => "code expired".to_owned(),
        LoginState::Error { message } => format!("error: {message}"),
    }
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;
