// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wiring of store, gateway and APIs for a host application.

use std::sync::Arc;

use crate::auth::AuthApi;
use crate::config::ClientConfig;
use crate::dispatch::{Dispatch, HttpDispatcher};
use crate::error::Error;
use crate::events::SessionObserver;
use crate::gateway::RequestGateway;
use crate::remote::{ChallengeApi, CountdownConfig, PushConnector, RemoteLoginSession, WsPushConnector};
use crate::store::{FileMedium, SessionStore};

/// Everything a host needs, sharing one store and one refresh coordinator.
#[derive(Clone)]
pub struct SessionClient {
    gateway: RequestGateway,
    observer: Arc<dyn SessionObserver>,
    connector: Arc<dyn PushConnector>,
    countdown: CountdownConfig,
}

impl SessionClient {
    /// HTTP + WebSocket client persisting to the configured session file.
    pub fn from_config(config: &ClientConfig, observer: Arc<dyn SessionObserver>) -> Result<Self, Error> {
        let store = Arc::new(SessionStore::new(FileMedium::new(config.session_file())));
        let dispatcher: Arc<dyn Dispatch> = Arc::new(HttpDispatcher::new(config)?);
        let connector: Arc<dyn PushConnector> = Arc::new(WsPushConnector::new(&config.push_url));
        Ok(Self::new(dispatcher, connector, store, observer, config))
    }

    pub fn new(
        dispatcher: Arc<dyn Dispatch>,
        connector: Arc<dyn PushConnector>,
        store: Arc<SessionStore>,
        observer: Arc<dyn SessionObserver>,
        config: &ClientConfig,
    ) -> Self {
        let gateway = RequestGateway::new(dispatcher, store, Arc::clone(&observer), config.refresh_retries);
        Self { gateway, observer, connector, countdown: CountdownConfig::from(config) }
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        self.gateway.store()
    }

    pub fn auth(&self) -> AuthApi {
        AuthApi::new(self.gateway.clone(), Arc::clone(&self.observer))
    }

    pub fn challenges(&self) -> ChallengeApi {
        ChallengeApi::new(self.gateway.clone())
    }

    /// Start a remote-login actor. Call `request_challenge` on it to begin.
    pub fn remote_login(&self) -> RemoteLoginSession {
        RemoteLoginSession::spawn(
            self.challenges(),
            Arc::clone(&self.connector),
            Arc::clone(self.store()),
            Arc::clone(&self.observer),
            self.countdown,
        )
    }
}
