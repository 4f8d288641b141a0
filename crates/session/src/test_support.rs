// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test doubles for the dispatcher, push connector, storage medium and
//! session observer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::dispatch::{Dispatch, DispatchFuture};
use crate::error::Error;
use crate::events::{LoginMethod, SessionObserver};
use crate::remote::push::{OpenFuture, PushChannel, PushConnector};
use crate::remote::state::PushEvent;
use crate::request::{ApiRequest, ApiResponse};
use crate::store::{KeyValueMedium, MemoryMedium};

type Handler = dyn Fn(&ApiRequest, Option<&str>) -> Result<ApiResponse, Error> + Send + Sync;

/// A request as seen by [`ScriptedDispatcher`], recorded at dispatch time.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedCall {
    pub method: reqwest::Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

/// Dispatcher whose responses come from a closure.
///
/// Calls are recorded in the order `dispatch` is invoked. Paths registered
/// with [`hold`](Self::hold) block until the returned semaphore gets a permit.
pub struct ScriptedDispatcher {
    handler: Box<Handler>,
    calls: Mutex<Vec<DispatchedCall>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl ScriptedDispatcher {
    pub fn new(
        handler: impl Fn(&ApiRequest, Option<&str>) -> Result<ApiResponse, Error> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
        })
    }

    /// Block requests to `path` until permits are added to the returned gate.
    pub fn hold(&self, path: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates.lock().insert(path.to_owned(), Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<DispatchedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<DispatchedCall> {
        self.calls.lock().iter().filter(|c| c.path == path).cloned().collect()
    }
}

impl Dispatch for ScriptedDispatcher {
    fn dispatch<'a>(&'a self, request: &'a ApiRequest, bearer: Option<&'a str>) -> DispatchFuture<'a> {
        self.calls.lock().push(DispatchedCall {
            method: request.method.clone(),
            path: request.path.clone(),
            bearer: bearer.map(str::to_owned),
            body: request.body.clone(),
        });
        let gate = self.gates.lock().get(&request.path).cloned();
        Box::pin(async move {
            if let Some(gate) = gate {
                let permit = gate.acquire().await.map_err(|_| Error::Cancelled)?;
                permit.forget();
            }
            (self.handler)(request, bearer)
        })
    }
}

/// Respond with a JSON body.
pub fn json_response(status: u16, value: serde_json::Value) -> Result<ApiResponse, Error> {
    Ok(ApiResponse::json_body(status, &value))
}

/// In-memory medium that counts `remove` calls (one per `SessionStore::clear`).
#[derive(Clone, Default)]
pub struct CountingMedium {
    inner: Arc<MemoryMedium>,
    removes: Arc<AtomicUsize>,
}

impl CountingMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clears(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }
}

impl KeyValueMedium for CountingMedium {
    fn read(&self, key: &str) -> Result<Option<String>, Error> {
        self.inner.read(key)
    }

    fn write(&self, entries: &[(&str, &str)]) -> Result<(), Error> {
        self.inner.write(entries)
    }

    fn remove(&self, keys: &[&str]) -> Result<(), Error> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(keys)
    }
}

/// Observer that counts invalidation signals.
#[derive(Clone, Default)]
pub struct CountingObserver {
    invalidated: Arc<AtomicUsize>,
    logged_in: Arc<Mutex<Vec<String>>>,
}

impl CountingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidations(&self) -> usize {
        self.invalidated.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> Vec<String> {
        self.logged_in.lock().clone()
    }
}

impl SessionObserver for CountingObserver {
    fn session_invalidated(&self) {
        self.invalidated.fetch_add(1, Ordering::SeqCst);
    }

    fn logged_in(&self, user_id: &str, _method: LoginMethod) {
        self.logged_in.lock().push(user_id.to_owned());
    }
}

struct OpenedChannel {
    qr_token: String,
    tx: Option<mpsc::Sender<PushEvent>>,
    cancel: CancellationToken,
}

/// Push connector backed by in-process channels.
#[derive(Default)]
pub struct MockPushConnector {
    opened: Mutex<Vec<OpenedChannel>>,
    fail_next: AtomicBool,
}

impl MockPushConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `open` fail with a network error.
    pub fn fail_next_open(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Tokens of every channel opened so far, oldest first.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().iter().map(|c| c.qr_token.clone()).collect()
    }

    /// Deliver an event on the channel for `qr_token`. Returns false when
    /// the receiving side is gone.
    pub async fn push(&self, qr_token: &str, event: PushEvent) -> bool {
        let tx = self.opened.lock().iter().rev().find(|c| c.qr_token == qr_token).and_then(|c| c.tx.clone());
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Drop the sending side, as if the server went away for good.
    pub fn disconnect(&self, qr_token: &str) {
        for channel in self.opened.lock().iter_mut().filter(|c| c.qr_token == qr_token) {
            channel.tx = None;
        }
    }

    /// Whether the client has closed the channel for `qr_token`.
    pub fn is_closed(&self, qr_token: &str) -> bool {
        self.opened
            .lock()
            .iter()
            .filter(|c| c.qr_token == qr_token)
            .all(|c| c.cancel.is_cancelled())
    }
}

impl PushConnector for MockPushConnector {
    fn open<'a>(&'a self, qr_token: &'a str) -> OpenFuture<'a> {
        Box::pin(async move {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(Error::Network("push server unreachable".to_owned()));
            }
            let (tx, rx) = mpsc::channel(16);
            let cancel = CancellationToken::new();
            self.opened.lock().push(OpenedChannel {
                qr_token: qr_token.to_owned(),
                tx: Some(tx),
                cancel: cancel.clone(),
            });
            Ok(PushChannel::new(rx, cancel))
        })
    }
}
