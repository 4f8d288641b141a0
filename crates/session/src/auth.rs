// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Password login, registration, logout and password change.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Error;
use crate::events::{LoginMethod, SessionObserver};
use crate::gateway::RequestGateway;
use crate::request::{ApiRequest, ApiResponse};
use crate::store::Session;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const CHANGE_PASSWORD_PATH: &str = "/auth/change-password";

const MIN_PASSWORD_LEN: usize = 6;

/// New-account details sent to the registration endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub phone: String,
    pub password: String,
    pub fullname: String,
    pub is_male: bool,
    /// `YYYY-MM-DD`.
    pub birthday: String,
}

/// Who is logged in after a successful login or registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub fullname: Option<String>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    phone: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordChange<'a> {
    user_id: &'a str,
    old_password: &'a str,
    new_password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPair {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserInfo {
    user_id: Option<String>,
    fullname: Option<String>,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: Option<TokenPair>,
    user: Option<UserInfo>,
}

#[derive(Deserialize)]
struct MessageResponse {
    message: Option<String>,
}

/// Account endpoints. Successful logins go straight into the session store.
#[derive(Clone)]
pub struct AuthApi {
    gateway: RequestGateway,
    observer: Arc<dyn SessionObserver>,
}

impl AuthApi {
    pub fn new(gateway: RequestGateway, observer: Arc<dyn SessionObserver>) -> Self {
        Self { gateway, observer }
    }

    pub async fn login(&self, phone: &str, password: &str) -> Result<AuthenticatedUser, Error> {
        let phone = normalize_phone(phone);
        let request = ApiRequest::post(LOGIN_PATH).exempt().json(&Credentials { phone: &phone, password })?;
        self.authenticate(request, LoginMethod::Password).await
    }

    pub async fn register(&self, registration: &Registration) -> Result<AuthenticatedUser, Error> {
        validate_password(&registration.password)?;
        let request = ApiRequest::post(REGISTER_PATH).exempt().json(registration)?;
        self.authenticate(request, LoginMethod::Registration).await
    }

    /// Tell the server, then drop the local session whatever it answered.
    pub async fn logout(&self) -> Result<(), Error> {
        let result = self.gateway.send_ok(ApiRequest::post(LOGOUT_PATH)).await;
        if let Err(ref e) = result {
            warn!(err = %e, "server logout failed, clearing local session anyway");
        }
        self.gateway.store().clear()?;
        info!("logged out");
        self.observer.logged_out();
        result.map(|_| ())
    }

    /// Change the password of the logged-in user. A wrong current password
    /// comes back as [`Error::AuthInvalid`] and leaves the session alone.
    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<String, Error> {
        let session =
            self.gateway.store().get().ok_or_else(|| Error::InvalidState("not logged in".to_owned()))?;
        validate_password(new_password)?;
        let request = ApiRequest::put(CHANGE_PASSWORD_PATH).exempt().json(&PasswordChange {
            user_id: &session.user_id,
            old_password,
            new_password,
        })?;
        let resp = self.gateway.send(request).await?;
        let resp = credential_error(resp)?;
        let body: Option<MessageResponse> = resp.json()?;
        Ok(body.and_then(|b| b.message).unwrap_or_default())
    }

    /// Profile of the logged-in user as the server returns it.
    pub async fn profile(&self) -> Result<serde_json::Value, Error> {
        let session =
            self.gateway.store().get().ok_or_else(|| Error::InvalidState("not logged in".to_owned()))?;
        let path = format!("/users/get-user-by-id/{}", session.user_id);
        self.gateway.send_ok(ApiRequest::get(path)).await?.json()
    }

    async fn authenticate(&self, request: ApiRequest, method: LoginMethod) -> Result<AuthenticatedUser, Error> {
        let resp = self.gateway.send(request).await?;
        let resp = credential_error(resp)?;
        let (session, fullname) = parse_auth_response(&resp)?;
        self.gateway.store().set(&session)?;
        info!(user_id = %session.user_id, ?method, "logged in");
        self.observer.logged_in(&session.user_id, method);
        Ok(AuthenticatedUser { user_id: session.user_id, fullname })
    }
}

/// Credential endpoints answer a bad phone, an unknown account and a wrong
/// password with 400/404/401; all of those are the caller's to show.
fn credential_error(resp: ApiResponse) -> Result<ApiResponse, Error> {
    match resp.status {
        400 | 401 | 404 => Err(Error::AuthInvalid { status: resp.status, message: resp.message() }),
        _ => resp.error_for_status(),
    }
}

fn parse_auth_response(resp: &ApiResponse) -> Result<(Session, Option<String>), Error> {
    let body: AuthResponse = resp.json()?;
    let token = body.token.ok_or_else(|| Error::Protocol("login response missing token".to_owned()))?;
    let user = body.user.ok_or_else(|| Error::Protocol("login response missing user".to_owned()))?;
    match (token.access_token, token.refresh_token, user.user_id) {
        (Some(access), Some(refresh), Some(user_id))
            if !access.is_empty() && !refresh.is_empty() && !user_id.is_empty() =>
        {
            Ok((Session::new(access, refresh, user_id), user.fullname))
        }
        _ => Err(Error::Protocol("login response missing token fields".to_owned())),
    }
}

/// Local numbers are sent with a leading `0` instead of the `+84` prefix.
pub fn normalize_phone(phone: &str) -> String {
    phone.trim().replace("+84", "0")
}

/// At least six ASCII letters or digits, with one of each.
pub fn validate_password(password: &str) -> Result<(), Error> {
    let well_formed = password.len() >= MIN_PASSWORD_LEN
        && password.chars().all(|c| c.is_ascii_alphanumeric())
        && password.chars().any(|c| c.is_ascii_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit());
    if well_formed {
        Ok(())
    } else {
        Err(Error::InvalidInput(
            "password must be at least 6 letters or digits and contain both".to_owned(),
        ))
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
