// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single chokepoint for authenticated API calls.

use std::sync::Arc;

use tracing::{debug, Instrument};

use crate::dispatch::Dispatch;
use crate::error::Error;
use crate::events::SessionObserver;
use crate::refresh::RefreshCoordinator;
use crate::request::{ApiRequest, ApiResponse};
use crate::store::SessionStore;

/// Attaches the stored access token, dispatches, and routes 401s.
#[derive(Clone)]
pub struct RequestGateway {
    dispatcher: Arc<dyn Dispatch>,
    store: Arc<SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl RequestGateway {
    pub fn new(
        dispatcher: Arc<dyn Dispatch>,
        store: Arc<SessionStore>,
        observer: Arc<dyn SessionObserver>,
        refresh_retries: u32,
    ) -> Self {
        let coordinator =
            RefreshCoordinator::new(Arc::clone(&dispatcher), Arc::clone(&store), observer, refresh_retries);
        Self { dispatcher, store, coordinator }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Send a request. Non-401 responses, including other error statuses,
    /// are returned unchanged.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::debug_span!("api", %request_id, method = %request.method, path = %request.path);
        self.pipeline(request).instrument(span).await
    }

    async fn pipeline(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        let bearer = attach(&self.store);
        let resp = dispatch(self.dispatcher.as_ref(), &request, bearer.as_deref()).await?;
        debug!(status = resp.status, "response");
        if !resp.is_unauthorized() {
            return Ok(resp);
        }
        if request.is_exempt() {
            return Err(Error::AuthInvalid { status: resp.status, message: resp.message() });
        }
        self.coordinator.handle_unauthorized(request).await
    }

    /// Send and require a 2xx response.
    pub async fn send_ok(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        self.send(request).await?.error_for_status()
    }
}

/// Current access token, if a session exists.
pub fn attach(store: &SessionStore) -> Option<String> {
    store.access_token()
}

pub async fn dispatch(
    dispatcher: &dyn Dispatch,
    request: &ApiRequest,
    bearer: Option<&str>,
) -> Result<ApiResponse, Error> {
    dispatcher.dispatch(request, bearer).await
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
