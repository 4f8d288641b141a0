// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote-login state machine: a tagged union driven by [`apply`].

use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::remote::api::Challenge;
use crate::store::Session;

/// Identity shown once the mobile app has scanned the code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedUser {
    pub fullname: String,
    pub avatar_url: Option<String>,
}

/// Credentials delivered with `qrLoginConfirmed`. Fields stay optional
/// until [`Confirmation::into_session`] checks them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub user_id: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Confirmation {
    pub fn new(user_id: &str, access_token: &str, refresh_token: &str) -> Self {
        Self {
            user_id: Some(user_id.to_owned()),
            access_token: Some(access_token.to_owned()),
            refresh_token: Some(refresh_token.to_owned()),
        }
    }

    pub fn into_session(self) -> Result<Session, Error> {
        let field = |v: Option<String>, name: &str| {
            v.filter(|s| !s.is_empty())
                .ok_or_else(|| Error::Protocol(format!("login confirmation missing {name}")))
        };
        let user_id = field(self.user_id, "userId")?;
        let access_token = field(self.access_token, "accessToken")?;
        let refresh_token = field(self.refresh_token, "refreshToken")?;
        Ok(Session { access_token, refresh_token, user_id })
    }
}

/// Typed events from the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Scanned(ScannedUser),
    Confirmed(Confirmation),
    Rejected { message: String },
    Error { message: String },
}

#[derive(Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct ScannedData {
    #[serde(default)]
    fullname: String,
    #[serde(default)]
    urlavatar: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmedData {
    user_id: Option<String>,
    access_token: Option<String>,
    /// Older servers send the access token as `token`.
    token: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct MessageData {
    message: Option<String>,
}

impl PushEvent {
    /// Parse a `{"event", "data"}` text frame. Unknown event names yield `None`.
    pub fn from_frame(text: &str) -> Result<Option<Self>, Error> {
        let frame: Frame = serde_json::from_str(text)?;
        let message = |data: serde_json::Value, fallback: &str| -> Result<String, Error> {
            let parsed: Option<MessageData> = serde_json::from_value(data)?;
            Ok(parsed.and_then(|m| m.message).unwrap_or_else(|| fallback.to_owned()))
        };
        let event = match frame.event.as_str() {
            "qrScanned" => {
                let data: ScannedData = serde_json::from_value(frame.data)?;
                Self::Scanned(ScannedUser { fullname: data.fullname, avatar_url: data.urlavatar })
            }
            "qrLoginConfirmed" => {
                let data: ConfirmedData = serde_json::from_value(frame.data)?;
                Self::Confirmed(Confirmation {
                    user_id: data.user_id,
                    access_token: data.access_token.or(data.token),
                    refresh_token: data.refresh_token,
                })
            }
            "qrLoginRejected" => Self::Rejected { message: message(frame.data, "login rejected")? },
            "qrError" => Self::Error { message: message(frame.data, "unknown error")? },
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Where a remote-login attempt stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    Idle,
    AwaitingScan { challenge: Challenge },
    Scanned { challenge: Challenge, user: ScannedUser },
    Confirmed { user_id: String },
    Rejected { message: String },
    Expired { qr_token: String },
    Error { message: String },
}

impl LoginState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed { .. } | Self::Rejected { .. } | Self::Expired { .. } | Self::Error { .. })
    }

    /// The live challenge, while one is being waited on.
    pub fn challenge(&self) -> Option<&Challenge> {
        match self {
            Self::AwaitingScan { challenge } | Self::Scanned { challenge, .. } => Some(challenge),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingScan { .. } => "awaiting_scan",
            Self::Scanned { .. } => "scanned",
            Self::Confirmed { .. } => "confirmed",
            Self::Rejected { .. } => "rejected",
            Self::Expired { .. } => "expired",
            Self::Error { .. } => "error",
        }
    }

    /// The terminal outcome as an error, for callers awaiting success.
    pub fn outcome(&self) -> Option<Result<String, Error>> {
        match self {
            Self::Confirmed { user_id } => Some(Ok(user_id.clone())),
            Self::Rejected { message } => Some(Err(Error::ChallengeRejected(message.clone()))),
            Self::Expired { .. } => Some(Err(Error::ChallengeExpired)),
            Self::Error { message } => Some(Err(Error::ChallengeError(message.clone()))),
            _ => None,
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    ChallengeIssued(Challenge),
    ChallengeFailed(String),
    Push(PushEvent),
    /// Countdown recomputed; only ever proposes `Expired`.
    Tick { remaining: Duration },
    /// Return a finished attempt to `Idle` ahead of regeneration.
    Reset,
}

/// Side effect the driver must carry out for a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    OpenChannel,
    CloseChannel,
    /// Write the session, then close the channel.
    Persist(Session),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub state: LoginState,
    pub effect: Effect,
}

impl Step {
    fn stay(state: LoginState) -> Self {
        Self { state, effect: Effect::None }
    }

    fn to(state: LoginState, effect: Effect) -> Self {
        Self { state, effect }
    }
}

/// Compute the next state. Triggers that do not apply to the current state
/// leave it unchanged, so a terminal state can only be left through `Reset`.
pub fn apply(state: LoginState, trigger: Trigger) -> Step {
    use LoginState as S;

    match (state, trigger) {
        (S::Idle, Trigger::ChallengeIssued(challenge)) => {
            Step::to(S::AwaitingScan { challenge }, Effect::OpenChannel)
        }
        (S::Idle, Trigger::ChallengeFailed(message)) => Step::to(S::Error { message }, Effect::None),

        (state, Trigger::Reset) if state.is_terminal() => Step::stay(S::Idle),

        (S::AwaitingScan { challenge } | S::Scanned { challenge, .. }, Trigger::Push(PushEvent::Scanned(user))) => {
            Step::stay(S::Scanned { challenge, user })
        }
        (state @ (S::AwaitingScan { .. } | S::Scanned { .. }), Trigger::Push(event)) => match event {
            PushEvent::Confirmed(confirmation) => match confirmation.into_session() {
                Ok(session) => {
                    Step::to(S::Confirmed { user_id: session.user_id.clone() }, Effect::Persist(session))
                }
                Err(e) => Step::to(S::Error { message: e.to_string() }, Effect::CloseChannel),
            },
            PushEvent::Rejected { message } => Step::to(S::Rejected { message }, Effect::CloseChannel),
            PushEvent::Error { message } => Step::to(S::Error { message }, Effect::CloseChannel),
            PushEvent::Scanned(_) => Step::stay(state),
        },
        (S::AwaitingScan { challenge } | S::Scanned { challenge, .. }, Trigger::Tick { remaining })
            if remaining.is_zero() =>
        {
            Step::to(S::Expired { qr_token: challenge.qr_token }, Effect::CloseChannel)
        }

        (state, _) => Step::stay(state),
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
