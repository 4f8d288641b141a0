// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/response descriptors passed through the gateway.

use bytes::Bytes;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Error;

/// What the gateway does when a request comes back 401.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnauthorizedPolicy {
    /// Renew credentials and replay once.
    #[default]
    Refresh,
    /// Hand the 401 to the caller as [`Error::AuthInvalid`]. Used by the
    /// auth endpoints themselves and by calls where 401 is a business
    /// answer (a wrong current password).
    Exempt,
}

/// An outbound API call, replayable as many times as the gateway needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub on_unauthorized: UnauthorizedPolicy,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, on_unauthorized: UnauthorizedPolicy::Refresh }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: &impl Serialize) -> Result<Self, Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Mark this request as exempt from refresh-on-401.
    pub fn exempt(mut self) -> Self {
        self.on_unauthorized = UnauthorizedPolicy::Exempt;
        self
    }

    pub fn is_exempt(&self) -> bool {
        self.on_unauthorized == UnauthorizedPolicy::Exempt
    }
}

/// Raw response as returned by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self { status, body: body.into() }
    }

    pub fn json_body(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Decode the body. An empty body decodes as JSON `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        if self.body.is_empty() {
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Server-supplied `message` field, falling back to the raw body text.
    pub fn message(&self) -> String {
        serde_json::from_slice::<serde_json::Value>(&self.body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_owned))
            .unwrap_or_else(|| String::from_utf8_lossy(&self.body).into_owned())
    }

    /// Turn a non-2xx response into an error carrying its status and message.
    pub fn error_for_status(self) -> Result<Self, Error> {
        if self.is_success() {
            return Ok(self);
        }
        if self.is_unauthorized() {
            return Err(Error::AuthInvalid { status: self.status, message: self.message() });
        }
        Err(Error::Protocol(format!("HTTP {}: {}", self.status, self.message())))
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
