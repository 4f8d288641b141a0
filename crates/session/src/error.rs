// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable classification of every [`Error`] the session layer surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    AuthExpired,
    AuthInvalid,
    RefreshFailed,
    ChallengeExpired,
    ChallengeRejected,
    ChallengeError,
    Network,
    Protocol,
    Storage,
    InvalidState,
    InvalidInput,
    Cancelled,
}

impl ErrorCode {
    /// HTTP status the code corresponds to when relayed to a host UI.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AuthExpired | Self::AuthInvalid | Self::RefreshFailed => 401,
            Self::ChallengeExpired => 410,
            Self::ChallengeRejected => 403,
            Self::InvalidState => 409,
            Self::InvalidInput => 400,
            Self::Network => 502,
            Self::Protocol => 502,
            Self::ChallengeError | Self::Storage | Self::Cancelled => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthExpired => "AUTH_EXPIRED",
            Self::AuthInvalid => "AUTH_INVALID",
            Self::RefreshFailed => "REFRESH_FAILED",
            Self::ChallengeExpired => "CHALLENGE_EXPIRED",
            Self::ChallengeRejected => "CHALLENGE_REJECTED",
            Self::ChallengeError => "CHALLENGE_ERROR",
            Self::Network => "NETWORK",
            Self::Protocol => "PROTOCOL",
            Self::Storage => "STORAGE",
            Self::InvalidState => "INVALID_STATE",
            Self::InvalidInput => "INVALID_INPUT",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether errors with this code leave the stored session cleared.
    pub fn invalidates_session(&self) -> bool {
        matches!(self, Self::RefreshFailed)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the gateway, the refresh coordinator and remote login.
///
/// `Clone` so one renewal failure can settle every queued request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A request was still rejected with 401 after a successful renewal.
    #[error("access token rejected after refresh")]
    AuthExpired,
    /// 401 on an exempt request, handed back to the caller untouched.
    #[error("unauthorized ({status}): {message}")]
    AuthInvalid { status: u16, message: String },
    /// Renewal failed or no refresh token was stored; the session is gone.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("login challenge expired")]
    ChallengeExpired,
    #[error("login challenge rejected: {0}")]
    ChallengeRejected(String),
    #[error("login challenge failed: {0}")]
    ChallengeError(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    Protocol(String),
    #[error("session storage failure: {0}")]
    Storage(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Rejected locally before any request was sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AuthExpired => ErrorCode::AuthExpired,
            Self::AuthInvalid { .. } => ErrorCode::AuthInvalid,
            Self::RefreshFailed(_) => ErrorCode::RefreshFailed,
            Self::ChallengeExpired => ErrorCode::ChallengeExpired,
            Self::ChallengeRejected(_) => ErrorCode::ChallengeRejected,
            Self::ChallengeError(_) => ErrorCode::ChallengeError,
            Self::Network(_) => ErrorCode::Network,
            Self::Protocol(_) => ErrorCode::Protocol,
            Self::Storage(_) => ErrorCode::Storage,
            Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::Cancelled => ErrorCode::Cancelled,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Network(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
