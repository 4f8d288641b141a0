// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session persistence over a host-supplied key/value medium.
//!
//! The three session fields live under fixed keys so a host that already
//! stores them (e.g. a web shell sharing local storage) sees the same layout.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const USER_ID_KEY: &str = "userId";
pub const ACCESS_TOKEN_KEY: &str = "token";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Credentials of the signed-in user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
}

impl Session {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            user_id: user_id.into(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Persistent key/value storage provided by the host.
///
/// `write` and `remove` receive every key of one logical update at once and
/// must apply them as a unit.
pub trait KeyValueMedium: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, Error>;
    fn write(&self, entries: &[(&str, &str)]) -> Result<(), Error>;
    fn remove(&self, keys: &[&str]) -> Result<(), Error>;
}

/// Process-local medium. Data is lost on restart.
#[derive(Default)]
pub struct MemoryMedium {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueMedium for MemoryMedium {
    fn read(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write(&self, entries: &[(&str, &str)]) -> Result<(), Error> {
        let mut map = self.entries.write();
        for (k, v) in entries {
            map.insert((*k).to_owned(), (*v).to_owned());
        }
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> Result<(), Error> {
        let mut map = self.entries.write();
        for k in keys {
            map.remove(*k);
        }
        Ok(())
    }
}

/// JSON file medium with atomic writes (write tmp + rename).
pub struct FileMedium {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileMedium {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>, Error> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)
                .map_err(|e| Error::Storage(format!("{}: {e}", self.path.display())))?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Uses a unique temp filename (PID + counter) so concurrent saves from
    /// several processes never interleave bytes in one `.tmp` file.
    fn save(&self, map: &HashMap<String, String>) -> Result<(), Error> {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(map)
            .map_err(|e| Error::Storage(e.to_string()))?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl KeyValueMedium for FileMedium {
    fn read(&self, key: &str) -> Result<Option<String>, Error> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(key))
    }

    fn write(&self, entries: &[(&str, &str)]) -> Result<(), Error> {
        let _guard = self.lock.lock();
        let mut map = self.load()?;
        for (k, v) in entries {
            map.insert((*k).to_owned(), (*v).to_owned());
        }
        self.save(&map)
    }

    fn remove(&self, keys: &[&str]) -> Result<(), Error> {
        let _guard = self.lock.lock();
        if !self.path.exists() {
            return Ok(());
        }
        let mut map = self.load()?;
        for k in keys {
            map.remove(*k);
        }
        self.save(&map)
    }
}

/// Owner of the current [`Session`].
///
/// `set` and `clear` are the only mutation points. Reads go to the medium
/// every time; nothing is cached here.
pub struct SessionStore {
    medium: Box<dyn KeyValueMedium>,
    lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(medium: impl KeyValueMedium + 'static) -> Self {
        Self { medium: Box::new(medium), lock: Mutex::new(()) }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryMedium::new())
    }

    /// Current session, or `None` when any field is missing.
    ///
    /// A partially written medium (e.g. edited by hand) reads as absent.
    pub fn get(&self) -> Option<Session> {
        let _guard = self.lock.lock();
        match self.read_all() {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(err = %e, "session read failed");
                None
            }
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.get().map(|s| s.access_token)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.get().map(|s| s.refresh_token)
    }

    pub fn set(&self, session: &Session) -> Result<(), Error> {
        let _guard = self.lock.lock();
        self.medium.write(&[
            (USER_ID_KEY, session.user_id.as_str()),
            (ACCESS_TOKEN_KEY, session.access_token.as_str()),
            (REFRESH_TOKEN_KEY, session.refresh_token.as_str()),
        ])
    }

    /// Replace both tokens, keeping the stored user id.
    ///
    /// Fails with [`Error::InvalidState`] when no session exists to rotate.
    pub fn rotate_tokens(&self, access_token: &str, refresh_token: &str) -> Result<Session, Error> {
        let _guard = self.lock.lock();
        let current = self
            .read_all()?
            .ok_or_else(|| Error::InvalidState("no session to rotate".to_owned()))?;
        let next = Session::new(access_token, refresh_token, current.user_id);
        self.medium.write(&[
            (USER_ID_KEY, next.user_id.as_str()),
            (ACCESS_TOKEN_KEY, next.access_token.as_str()),
            (REFRESH_TOKEN_KEY, next.refresh_token.as_str()),
        ])?;
        Ok(next)
    }

    pub fn clear(&self) -> Result<(), Error> {
        let _guard = self.lock.lock();
        self.medium.remove(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_ID_KEY])
    }

    fn read_all(&self) -> Result<Option<Session>, Error> {
        let access = self.medium.read(ACCESS_TOKEN_KEY)?;
        let refresh = self.medium.read(REFRESH_TOKEN_KEY)?;
        let user = self.medium.read(USER_ID_KEY)?;
        Ok(match (access, refresh, user) {
            (Some(access_token), Some(refresh_token), Some(user_id))
                if !access_token.is_empty() && !refresh_token.is_empty() =>
            {
                Some(Session { access_token, refresh_token, user_id })
            }
            _ => None,
        })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
