// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight credential renewal with FIFO replay of waiting requests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatch;
use crate::error::Error;
use crate::events::SessionObserver;
use crate::request::{ApiRequest, ApiResponse};
use crate::store::SessionStore;

/// Renewal endpoint, called with the refresh token as bearer.
pub const REFRESH_PATH: &str = "/auth/refresh";

const INITIAL_RETRY_BACKOFF: Duration = Duration::from_millis(250);
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(5);

type Settle = oneshot::Sender<Result<ApiResponse, Error>>;

/// A request that failed authorization, parked until the renewal settles.
struct PendingRequest {
    request: ApiRequest,
    tx: Settle,
}

#[derive(Default)]
struct FlightState {
    refreshing: bool,
    queue: VecDeque<PendingRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// Owns the refresh flight state for one client.
///
/// The first 401 starts a renewal on a spawned task; every 401 that arrives
/// while it runs joins the queue. The originating request is queued too, so
/// it is replayed first and settled the same way as the rest.
pub struct RefreshCoordinator {
    dispatcher: Arc<dyn Dispatch>,
    store: Arc<SessionStore>,
    observer: Arc<dyn SessionObserver>,
    retries: u32,
    flight: Mutex<FlightState>,
}

impl RefreshCoordinator {
    pub fn new(
        dispatcher: Arc<dyn Dispatch>,
        store: Arc<SessionStore>,
        observer: Arc<dyn SessionObserver>,
        retries: u32,
    ) -> Arc<Self> {
        Arc::new(Self { dispatcher, store, observer, retries, flight: Mutex::new(FlightState::default()) })
    }

    /// Whether a renewal is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.flight.lock().refreshing
    }

    /// Number of requests waiting on the current renewal.
    pub fn pending(&self) -> usize {
        self.flight.lock().queue.len()
    }

    /// Recover from a 401 on `request`: renew (or join the renewal in flight)
    /// and return the replayed response.
    pub async fn handle_unauthorized(self: &Arc<Self>, request: ApiRequest) -> Result<ApiResponse, Error> {
        let (tx, rx) = oneshot::channel();
        let lead = {
            let mut flight = self.flight.lock();
            flight.queue.push_back(PendingRequest { request, tx });
            !std::mem::replace(&mut flight.refreshing, true)
        };

        if lead {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run_flight().await });
        } else {
            debug!("renewal in flight, request queued");
        }

        rx.await.unwrap_or(Err(Error::Cancelled))
    }

    async fn run_flight(self: Arc<Self>) {
        match self.renew().await {
            Ok(access_token) => {
                let pending = self.drain();
                info!(replayed = pending.len(), "session refreshed");
                self.observer.refreshed();
                self.replay_all(pending, access_token).await;
            }
            Err(e) => {
                warn!(err = %e, "refresh failed, invalidating session");
                if let Err(clear_err) = self.store.clear() {
                    warn!(err = %clear_err, "failed to clear session store");
                }
                let pending = self.drain();
                for entry in pending {
                    let _ = entry.tx.send(Err(e.clone()));
                }
                self.observer.session_invalidated();
            }
        }
    }

    /// Take the queue and release the flight flag in one critical section.
    fn drain(&self) -> Vec<PendingRequest> {
        let mut flight = self.flight.lock();
        flight.refreshing = false;
        flight.queue.drain(..).collect()
    }

    /// Replays are dispatched in queue order and then awaited together.
    async fn replay_all(&self, pending: Vec<PendingRequest>, access_token: String) {
        let replays = pending.into_iter().map(|entry| {
            let dispatcher = Arc::clone(&self.dispatcher);
            let token = access_token.clone();
            async move {
                let result = replay(dispatcher.as_ref(), &entry.request, &token).await;
                let _ = entry.tx.send(result);
            }
        });
        futures_util::future::join_all(replays).await;
    }

    /// Obtain and store a new token pair. Returns the new access token.
    async fn renew(&self) -> Result<String, Error> {
        let Some(refresh_token) = self.store.refresh_token() else {
            return Err(Error::RefreshFailed("no refresh token".to_owned()));
        };

        let tokens = self.refresh_with_retries(&refresh_token).await?;
        let session = self
            .store
            .rotate_tokens(&tokens.0, &tokens.1)
            .map_err(|e| Error::RefreshFailed(e.to_string()))?;
        Ok(session.access_token)
    }

    /// Transport failures are retried with exponential backoff; HTTP
    /// rejections and malformed bodies fail immediately.
    async fn refresh_with_retries(&self, refresh_token: &str) -> Result<(String, String), Error> {
        let mut backoff = INITIAL_RETRY_BACKOFF;
        let mut attempt = 0;
        loop {
            match do_refresh(self.dispatcher.as_ref(), refresh_token).await {
                Ok(tokens) => return Ok(tokens),
                Err(Error::Network(msg)) if attempt < self.retries => {
                    attempt += 1;
                    debug!(attempt, err = %msg, "refresh attempt failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_RETRY_BACKOFF);
                }
                Err(Error::RefreshFailed(msg)) => return Err(Error::RefreshFailed(msg)),
                Err(e) => return Err(Error::RefreshFailed(e.to_string())),
            }
        }
    }
}

/// Perform a single renewal call.
async fn do_refresh(dispatcher: &dyn Dispatch, refresh_token: &str) -> Result<(String, String), Error> {
    let request = ApiRequest::post(REFRESH_PATH).exempt();
    let resp = dispatcher.dispatch(&request, Some(refresh_token)).await?;
    if !resp.is_success() {
        return Err(Error::RefreshFailed(format!("HTTP {}: {}", resp.status, resp.message())));
    }
    let body: RefreshResponse = resp.json()?;
    match (body.access_token, body.refresh_token) {
        (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => Ok((access, refresh)),
        _ => Err(Error::RefreshFailed("refresh response missing tokens".to_owned())),
    }
}

/// Send `request` once more with a fresh token. A second 401 is final.
pub async fn replay(dispatcher: &dyn Dispatch, request: &ApiRequest, access_token: &str) -> Result<ApiResponse, Error> {
    let resp = dispatcher.dispatch(request, Some(access_token)).await?;
    if resp.is_unauthorized() {
        debug!(path = %request.path, "replay rejected");
        return Err(Error::AuthExpired);
    }
    Ok(resp)
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
