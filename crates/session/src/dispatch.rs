// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport step of the gateway pipeline: put one request on the wire.

use std::future::Future;
use std::pin::Pin;
use std::sync::Once;

use reqwest::Client;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::request::{ApiRequest, ApiResponse};

/// Future returned by [`Dispatch::dispatch`].
pub type DispatchFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse, Error>> + Send + 'a>>;

/// Sends a single request with an optional bearer credential.
///
/// Implementations never interpret the status code; 401 handling belongs to
/// the gateway. Object-safe for use as `Arc<dyn Dispatch>`.
pub trait Dispatch: Send + Sync {
    fn dispatch<'a>(&'a self, request: &'a ApiRequest, bearer: Option<&'a str>) -> DispatchFuture<'a>;
}

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call more than once; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// HTTP dispatcher for the REST API.
pub struct HttpDispatcher {
    base_url: String,
    client: Client,
}

impl HttpDispatcher {
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        ensure_crypto();
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::InvalidInput(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { base_url: config.api_url.trim_end_matches('/').to_owned(), client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder, bearer: Option<&str>) -> reqwest::RequestBuilder {
        match bearer {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<ApiResponse, Error> {
        let mut req = self.client.request(request.method.clone(), self.url(&request.path));
        if let Some(ref body) = request.body {
            req = req.json(body);
        }
        let resp = self.apply_auth(req, bearer).send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;
        Ok(ApiResponse { status, body })
    }
}

impl Dispatch for HttpDispatcher {
    fn dispatch<'a>(&'a self, request: &'a ApiRequest, bearer: Option<&'a str>) -> DispatchFuture<'a> {
        Box::pin(self.send(request, bearer))
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
