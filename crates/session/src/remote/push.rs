// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-push channel scoped to one login challenge.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;
use crate::remote::state::PushEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Future returned by [`PushConnector::open`].
pub type OpenFuture<'a> = Pin<Box<dyn Future<Output = Result<PushChannel, Error>> + Send + 'a>>;

/// Opens push channels. Object-safe for use as `Arc<dyn PushConnector>`.
pub trait PushConnector: Send + Sync {
    fn open<'a>(&'a self, qr_token: &'a str) -> OpenFuture<'a>;
}

/// Receiving end of a push channel. Dropping it closes the connection.
pub struct PushChannel {
    rx: mpsc::Receiver<PushEvent>,
    cancel: CancellationToken,
}

impl PushChannel {
    pub fn new(rx: mpsc::Receiver<PushEvent>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Next event, or `None` once the connection is gone for good.
    pub async fn recv(&mut self) -> Option<PushEvent> {
        self.rx.recv().await
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// WebSocket push connector. Reconnects with exponential backoff while the
/// channel it handed out is still open.
pub struct WsPushConnector {
    push_url: String,
}

impl WsPushConnector {
    pub fn new(push_url: &str) -> Self {
        Self { push_url: push_url.trim_end_matches('/').to_owned() }
    }

    async fn open_channel(&self, qr_token: &str) -> Result<PushChannel, Error> {
        let url = build_ws_url(&self.push_url, qr_token);
        let first = connect(&url, qr_token).await?;
        debug!(%qr_token, "push channel connected");

        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        tokio::spawn(pump(first, url, qr_token.to_owned(), tx, cancel.clone()));
        Ok(PushChannel::new(rx, cancel))
    }
}

impl PushConnector for WsPushConnector {
    fn open<'a>(&'a self, qr_token: &'a str) -> OpenFuture<'a> {
        Box::pin(self.open_channel(qr_token))
    }
}

/// Connect and announce which challenge this socket is waiting on.
async fn connect(url: &str, qr_token: &str) -> Result<WsStream, Error> {
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await?;
    ws.send(Message::Text(init_frame(qr_token).into())).await?;
    Ok(ws)
}

async fn pump(
    first: WsStream,
    url: String,
    qr_token: String,
    tx: mpsc::Sender<PushEvent>,
    cancel: CancellationToken,
) {
    let mut stream = Some(first);
    let mut backoff_ms = 100u64;
    let max_backoff_ms = 5000u64;

    loop {
        if let Some(ws) = stream.take() {
            backoff_ms = 100;
            let (mut write, mut read) = ws.split();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = write.close().await;
                        return;
                    }
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => match PushEvent::from_frame(&text) {
                                Ok(Some(event)) => {
                                    if tx.send(event).await.is_err() {
                                        return;
                                    }
                                }
                                Ok(None) => debug!(%qr_token, "ignoring unknown push event"),
                                Err(e) => warn!(%qr_token, err = %e, "malformed push frame"),
                            },
                            Some(Ok(Message::Close(_))) | None => {
                                debug!(%qr_token, "push channel closed by server");
                                break;
                            }
                            Some(Err(e)) => {
                                debug!(%qr_token, err = %e, "push channel error");
                                break;
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
        }
        backoff_ms = (backoff_ms * 2).min(max_backoff_ms);

        tokio::select! {
            _ = cancel.cancelled() => return,
            result = connect(&url, &qr_token) => match result {
                Ok(ws) => {
                    debug!(%qr_token, "push channel reconnected");
                    stream = Some(ws);
                }
                Err(e) => debug!(%qr_token, err = %e, backoff_ms, "push reconnect failed, retrying"),
            }
        }
    }
}

/// `{"event":"initQrLogin","data":"<qr>"}`
pub fn init_frame(qr_token: &str) -> String {
    serde_json::json!({ "event": "initQrLogin", "data": qr_token }).to_string()
}

/// Convert an http(s) base into the ws(s) push endpoint for a challenge.
pub fn build_ws_url(base_url: &str, qr_token: &str) -> String {
    let ws_base = if base_url.starts_with("https://") {
        base_url.replacen("https://", "wss://", 1)
    } else {
        base_url.replacen("http://", "ws://", 1)
    };
    format!("{ws_base}/ws?qrToken={}", urlencoding::encode(qr_token))
}

#[cfg(test)]
#[path = "push_tests.rs"]
mod tests;
