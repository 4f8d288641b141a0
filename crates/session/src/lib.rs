// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-side session management: token refresh for every API call and
//! scan-to-login for new devices.

pub mod auth;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod gateway;
pub mod refresh;
pub mod remote;
pub mod request;
pub mod store;
pub mod test_support;

pub use client::SessionClient;
pub use config::ClientConfig;
pub use error::{Error, ErrorCode};
pub use events::{EventSink, LoginMethod, SessionEvent, SessionObserver};
pub use gateway::RequestGateway;
pub use request::{ApiRequest, ApiResponse};
pub use store::{Session, SessionStore};
