// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Actor that drives one remote-login flow: challenge, countdown, push events.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::Error;
use crate::events::{LoginMethod, SessionObserver};
use crate::remote::api::{Challenge, ChallengeApi};
use crate::remote::push::{PushChannel, PushConnector};
use crate::remote::state::{apply, Effect, LoginState, PushEvent, Step, Trigger};
use crate::store::SessionStore;

/// Timing knobs for the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownConfig {
    pub tick: Duration,
    pub near_expiry: Duration,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self { tick: Duration::from_secs(1), near_expiry: Duration::from_secs(30) }
    }
}

impl From<&ClientConfig> for CountdownConfig {
    fn from(config: &ClientConfig) -> Self {
        Self { tick: config.tick_interval(), near_expiry: config.near_expiry() }
    }
}

/// Snapshot published after every transition and tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginView {
    pub state: LoginState,
    pub remaining: Duration,
    pub near_expiry: bool,
}

impl LoginView {
    fn idle() -> Self {
        Self { state: LoginState::Idle, remaining: Duration::ZERO, near_expiry: false }
    }
}

type Reply = oneshot::Sender<Result<Challenge, Error>>;

enum Command {
    Request(Reply),
    Regenerate(Reply),
}

/// Handle to a running remote-login actor.
///
/// Dropping the handle tears the flow down: the push channel closes and the
/// countdown stops.
pub struct RemoteLoginSession {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<LoginView>,
    cancel: CancellationToken,
}

impl RemoteLoginSession {
    pub fn spawn(
        api: ChallengeApi,
        connector: Arc<dyn PushConnector>,
        store: Arc<SessionStore>,
        observer: Arc<dyn SessionObserver>,
        countdown: CountdownConfig,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(8);
        let (view_tx, view_rx) = watch::channel(LoginView::idle());
        let cancel = CancellationToken::new();

        let mut ticker = tokio::time::interval(countdown.tick.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let actor = Actor {
            api,
            connector,
            store,
            observer,
            near_expiry: countdown.near_expiry,
            view_tx,
            state: LoginState::Idle,
            channel: None,
            deadline: None,
            ticker,
        };
        tokio::spawn(actor.run(commands_rx, cancel.clone()));

        Self { commands: commands_tx, view: view_rx, cancel }
    }

    /// Obtain a challenge and start waiting for the scan. Only valid from `Idle`.
    pub async fn request_challenge(&self) -> Result<Challenge, Error> {
        self.call(Command::Request).await
    }

    /// Replace a finished attempt with a fresh challenge and full countdown.
    pub async fn regenerate(&self) -> Result<Challenge, Error> {
        self.call(Command::Regenerate).await
    }

    async fn call(&self, command: impl FnOnce(Reply) -> Command) -> Result<Challenge, Error> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(command(tx)).await.map_err(|_| Error::Cancelled)?;
        rx.await.unwrap_or(Err(Error::Cancelled))
    }

    pub fn view(&self) -> LoginView {
        self.view.borrow().clone()
    }

    pub fn state(&self) -> LoginState {
        self.view.borrow().state.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoginView> {
        self.view.clone()
    }

    /// Wait until the current attempt reaches a terminal state.
    pub async fn wait_terminal(&self) -> Result<LoginState, Error> {
        let mut rx = self.view.clone();
        let view = rx.wait_for(|v| v.state.is_terminal()).await.map_err(|_| Error::Cancelled)?;
        Ok(view.state.clone())
    }

    /// Stop the actor. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for RemoteLoginSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Actor {
    api: ChallengeApi,
    connector: Arc<dyn PushConnector>,
    store: Arc<SessionStore>,
    observer: Arc<dyn SessionObserver>,
    near_expiry: Duration,
    view_tx: watch::Sender<LoginView>,
    state: LoginState,
    channel: Option<PushChannel>,
    deadline: Option<Instant>,
    ticker: Interval,
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                cmd = commands.recv() => match cmd {
                    Some(Command::Request(reply)) => self.on_request(reply).await,
                    Some(Command::Regenerate(reply)) => self.on_regenerate(reply).await,
                    None => break,
                },
                event = next_push(&mut self.channel) => self.on_push(event),
                _ = self.ticker.tick(), if self.deadline.is_some() => self.on_tick(),
            }
        }
        self.close_channel();
        debug!("remote login actor stopped");
    }

    async fn on_request(&mut self, reply: Reply) {
        if self.state != LoginState::Idle {
            let _ = reply.send(Err(Error::InvalidState(format!(
                "challenge already requested (state {})",
                self.state.as_str()
            ))));
            return;
        }
        let result = self.issue().await;
        let _ = reply.send(result);
    }

    async fn on_regenerate(&mut self, reply: Reply) {
        if !self.state.is_terminal() {
            let _ = reply.send(Err(Error::InvalidState(format!(
                "cannot regenerate while {}",
                self.state.as_str()
            ))));
            return;
        }
        self.step(Trigger::Reset);
        let result = self.issue().await;
        let _ = reply.send(result);
    }

    async fn issue(&mut self) -> Result<Challenge, Error> {
        let challenge = match self.api.generate().await {
            Ok(challenge) => challenge,
            Err(e) => {
                self.step(Trigger::ChallengeFailed(e.to_string()));
                return Err(e);
            }
        };

        self.deadline = Some(Instant::now() + challenge.remaining_at(Utc::now()));
        self.ticker.reset();
        if self.step(Trigger::ChallengeIssued(challenge.clone())) == Effect::OpenChannel {
            match self.connector.open(&challenge.qr_token).await {
                Ok(channel) => self.channel = Some(channel),
                Err(e) => {
                    warn!(qr_token = %challenge.qr_token, err = %e, "push channel failed to open");
                    self.step(Trigger::Push(PushEvent::Error { message: e.to_string() }));
                    return Err(e);
                }
            }
        }
        self.publish();
        Ok(challenge)
    }

    fn on_push(&mut self, event: Option<PushEvent>) {
        match event {
            Some(event) => {
                debug!(state = self.state.as_str(), ?event, "push event");
                self.step(Trigger::Push(event));
            }
            None => {
                self.channel = None;
                warn!(state = self.state.as_str(), "push channel closed");
                self.step(Trigger::Push(PushEvent::Error { message: "push channel closed".to_owned() }));
            }
        }
    }

    fn on_tick(&mut self) {
        let remaining = self.remaining();
        self.step(Trigger::Tick { remaining });
        self.publish();
    }

    /// Apply a trigger and carry out synchronous effects. `OpenChannel` is
    /// returned for the caller to perform.
    fn step(&mut self, trigger: Trigger) -> Effect {
        let prev = std::mem::replace(&mut self.state, LoginState::Idle);
        let from = prev.as_str();
        let fallback = prev.clone();
        let Step { state, effect } = apply(prev, trigger);
        self.state = state;

        let effect = match effect {
            Effect::Persist(session) => {
                self.close_channel();
                match self.store.set(&session) {
                    Ok(()) => {
                        info!(user_id = %session.user_id, "remote login confirmed");
                        self.observer.logged_in(&session.user_id, LoginMethod::Qr);
                    }
                    Err(e) => {
                        warn!(err = %e, "failed to store confirmed session");
                        let failed = Trigger::Push(PushEvent::Error { message: e.to_string() });
                        self.state = apply(fallback, failed).state;
                    }
                }
                Effect::None
            }
            Effect::CloseChannel => {
                self.close_channel();
                Effect::None
            }
            other => other,
        };

        if self.state.is_terminal() {
            self.deadline = None;
            self.close_channel();
        }
        if from != self.state.as_str() {
            info!(from, to = self.state.as_str(), "remote login transition");
            self.publish();
        }
        effect
    }

    fn close_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
    }

    fn remaining(&self) -> Duration {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now())).unwrap_or_default()
    }

    fn publish(&self) {
        let remaining = self.remaining();
        let near_expiry = self.state.challenge().is_some() && remaining <= self.near_expiry;
        self.view_tx.send_replace(LoginView { state: self.state.clone(), remaining, near_expiry });
    }
}

/// Next event from the channel, or pending forever when there is none.
async fn next_push(channel: &mut Option<PushChannel>) -> Option<PushEvent> {
    match channel {
        Some(channel) => channel.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
