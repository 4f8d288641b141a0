// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Challenge endpoints used by the scan-to-login flow.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::gateway::RequestGateway;
use crate::request::{ApiRequest, ApiResponse};

pub const GENERATE_PATH: &str = "/auth/generate-qr-token";
pub const VERIFY_PATH: &str = "/auth/verify-qr-token";
pub const CHECK_STATUS_PATH: &str = "/auth/check-qr-status";

/// Marker embedded in the displayed QR payload so the mobile app can tell
/// login codes apart from other QR content.
pub const QR_PAYLOAD_TYPE: &str = "sophy_auth";

/// A server-issued one-time login challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub qr_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Challenge {
    /// Time left before `now`, saturating at zero.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.expires_at - now).to_std().unwrap_or_default()
    }

    /// JSON rendered into the QR code for the mobile app to scan.
    pub fn qr_payload(&self) -> String {
        serde_json::json!({
            "token": self.qr_token,
            "expiresAt": self.expires_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            "type": QR_PAYLOAD_TYPE,
        })
        .to_string()
    }
}

/// `expiresAt` arrives either as an ISO-8601 string or as epoch millis.
#[derive(Deserialize)]
#[serde(untagged)]
enum Expiry {
    Iso(DateTime<Utc>),
    Millis(i64),
}

impl Expiry {
    fn into_datetime(self) -> Result<DateTime<Utc>, Error> {
        match self {
            Self::Iso(at) => Ok(at),
            Self::Millis(ms) => DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| Error::Protocol(format!("expiresAt out of range: {ms}"))),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    qr_token: Option<String>,
    expires_at: Option<Expiry>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QrTokenBody<'a> {
    qr_token: &'a str,
}

#[derive(Deserialize)]
struct MessageResponse {
    message: Option<String>,
}

/// Server-side view of a challenge, as polled through `check_status`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrStatus {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Challenge endpoints. `generate` and `check_status` come from the device
/// asking to log in, which has no session yet, so they are exempt from
/// refresh-on-401. `verify` comes from the signed-in scanning device and
/// goes through the gateway like any authenticated call.
#[derive(Clone)]
pub struct ChallengeApi {
    gateway: RequestGateway,
}

impl ChallengeApi {
    pub fn new(gateway: RequestGateway) -> Self {
        Self { gateway }
    }

    /// Ask the server for a fresh challenge.
    pub async fn generate(&self) -> Result<Challenge, Error> {
        let resp = self.gateway.send(ApiRequest::post(GENERATE_PATH).exempt()).await?;
        if !resp.is_success() {
            return Err(Error::ChallengeError(format!("HTTP {}: {}", resp.status, resp.message())));
        }
        let body: GenerateResponse = resp.json()?;
        let qr_token = body
            .qr_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Protocol("challenge response missing qrToken".to_owned()))?;
        let expires_at = body
            .expires_at
            .ok_or_else(|| Error::Protocol("challenge response missing expiresAt".to_owned()))?
            .into_datetime()?;
        Ok(Challenge { qr_token, expires_at })
    }

    /// Mark a challenge as scanned (the mobile side of the flow).
    pub async fn verify(&self, qr_token: &str) -> Result<String, Error> {
        let request = ApiRequest::post(VERIFY_PATH).json(&QrTokenBody { qr_token })?;
        let resp = challenge_error(self.gateway.send(request).await?)?;
        let body: Option<MessageResponse> = resp.json()?;
        Ok(body.and_then(|b| b.message).unwrap_or_default())
    }

    pub async fn check_status(&self, qr_token: &str) -> Result<QrStatus, Error> {
        let path = format!("{CHECK_STATUS_PATH}/{}", urlencoding::encode(qr_token));
        let resp = challenge_error(self.gateway.send(ApiRequest::post(path).exempt()).await?)?;
        resp.json()
    }
}

/// 404 means the challenge is unknown, 400 that it has expired.
fn challenge_error(resp: ApiResponse) -> Result<ApiResponse, Error> {
    match resp.status {
        s if (200..300).contains(&s) => Ok(resp),
        400 => Err(Error::ChallengeExpired),
        404 => Err(Error::ChallengeError("challenge not found or expired".to_owned())),
        s => Err(Error::ChallengeError(format!("HTTP {s}: {}", resp.message()))),
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
