//! Authenticated session and its on-disk persistence.
//!
//! A [`Session`] is the explicit identity handed to
//! [`crate::channel::NotificationChannel::attach`]. [`SessionStore`] keeps
//! the last login in `session.json` so a later run can restore it, and
//! removes it again on logout.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::PathBuf};

use crate::config::Config;

/// Identity of the logged-in user.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Session {
    /// Server-assigned user id.
    pub user_id: String,
    /// Bearer token returned by login, if the server issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

// Token stays out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Session {
    /// Creates a session for `user_id`.
    pub fn new(user_id: impl Into<String>, token: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token,
        }
    }

    /// A session is authenticated when it names a user.
    pub fn is_authenticated(&self) -> bool {
        !self.user_id.trim().is_empty()
    }
}

/// File-backed persistence for the current session.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store backed by an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store backed by `session.json` in the config directory.
    pub fn in_config_dir() -> Result<Self> {
        Ok(Self::new(Config::config_dir()?.join("session.json")))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Restores the saved session.
    ///
    /// Returns `Ok(None)` when nobody is logged in. A corrupt or
    /// unauthenticated file is deleted and treated as logged out.
    pub fn load(&self) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;

        match serde_json::from_str::<Session>(&content) {
            Ok(session) if session.is_authenticated() => Ok(Some(session)),
            Ok(_) => {
                log::warn!("Saved session has no user id, clearing it");
                self.clear()?;
                Ok(None)
            }
            Err(e) => {
                log::error!("Error reading saved session: {e}");
                self.clear()?;
                Ok(None)
            }
        }
    }

    /// Saves `session` with owner-only permissions.
    pub fn save(&self, session: &Session) -> Result<()> {
        if !session.is_authenticated() {
            anyhow::bail!("refusing to save a session without a user id");
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(session)?)
            .with_context(|| format!("failed to write {}", self.path.display()))?;

        #[cfg(unix)]
        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Forgets the saved session. Succeeds if there was none.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", self.path.display())),
        }
    }
}
