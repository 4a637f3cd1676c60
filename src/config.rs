//! Configuration loading and persistence.
//!
//! Reads `config.json` from the client's config directory and layers
//! `CAMPUS_*` environment variables on top. The session (user id and
//! bearer token) is kept separately by [`crate::session::SessionStore`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use std::{fs, path::Path, path::PathBuf};

use crate::constants;

/// Which session value is sent as the `token` query parameter when
/// opening the notification channel.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsCredential {
    /// The raw user id. This is what the notification server expects today,
    /// and it is not a secret.
    #[default]
    UserId,
    /// The session's bearer token, falling back to the user id when the
    /// session has none.
    SessionToken,
}

/// Configuration for the campus-connect client.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the REST API (login, offline backfill).
    pub api_url: String,
    /// Base URL of the notification WebSocket server.
    pub ws_url: String,
    /// Seconds to wait after a disconnect before reconnecting.
    pub reconnect_delay_secs: u64,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    /// Drop channel notifications whose id is already in the store.
    pub dedupe_by_id: bool,
    /// Ask for desktop alert permission when listening.
    pub desktop_alerts: bool,
    /// Credential placed in the WebSocket URL.
    pub ws_credential: WsCredential,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: constants::DEFAULT_API_URL.to_string(),
            ws_url: constants::DEFAULT_WS_URL.to_string(),
            reconnect_delay_secs: constants::RECONNECT_DELAY.as_secs(),
            request_timeout_secs: constants::HTTP_REQUEST_TIMEOUT.as_secs(),
            dedupe_by_id: true,
            desktop_alerts: true,
            ws_credential: WsCredential::UserId,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `#[cfg(test)]` (unit tests): `<tmp>/campus-connect-test`
    /// 2. `CAMPUS_CONFIG_DIR` env var: explicit override
    /// 3. `CAMPUS_ENV=test`: `<tmp>/campus-connect-test`
    /// 4. Default: platform config dir + `campus-connect`
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                std::env::temp_dir().join("campus-connect-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(dir) = std::env::var("CAMPUS_CONFIG_DIR") {
                    PathBuf::from(dir)
                } else if crate::env::is_test_mode() {
                    std::env::temp_dir().join("campus-connect-test")
                } else {
                    dirs::config_dir()
                        .context("Could not determine config directory")?
                        .join("campus-connect")
                }
            }
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from the config directory, with environment
    /// variable overrides. A missing or unreadable file falls back to defaults.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_saved()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        if let Err(e) = config.validate() {
            log::warn!("{e:#}, using {}s", config.reconnect_delay().as_secs());
        }
        Ok(config)
    }

    /// Path of `config.json` in the config directory.
    pub fn path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Loads the saved file without environment overrides, for editing.
    pub fn load_saved() -> Result<Self> {
        Ok(Self::load_from(&Self::path()?).unwrap_or_else(|e| {
            log::debug!("Using default config ({e:#})");
            Self::default()
        }))
    }

    /// Reads a config file. Missing keys take their default values.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Applies `CAMPUS_*` overrides using `lookup` to read variables.
    ///
    /// Unparseable numeric or boolean values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_url) = lookup("CAMPUS_API_URL") {
            self.api_url = api_url;
        }

        if let Some(ws_url) = lookup("CAMPUS_WS_URL") {
            self.ws_url = ws_url;
        }

        if let Some(delay) = lookup("CAMPUS_RECONNECT_DELAY") {
            match delay.parse::<u64>() {
                Ok(0) => log::warn!("Ignoring CAMPUS_RECONNECT_DELAY=0: must be at least 1"),
                Ok(secs) => self.reconnect_delay_secs = secs,
                Err(_) => log::warn!("Ignoring CAMPUS_RECONNECT_DELAY={delay:?}: not a number"),
            }
        }

        if let Some(timeout) = lookup("CAMPUS_REQUEST_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.request_timeout_secs = secs,
                Err(_) => log::warn!("Ignoring CAMPUS_REQUEST_TIMEOUT={timeout:?}: not a number"),
            }
        }

        if let Some(dedupe) = lookup("CAMPUS_DEDUPE") {
            match dedupe.parse::<bool>() {
                Ok(flag) => self.dedupe_by_id = flag,
                Err(_) => log::warn!("Ignoring CAMPUS_DEDUPE={dedupe:?}: expected true/false"),
            }
        }
    }

    /// Persists the configuration to the config directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    /// Writes the configuration to `path` with owner-only permissions.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed to write {}", path.display()))?;

        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Rejects values the channel cannot honour as written.
    pub fn validate(&self) -> Result<()> {
        if Duration::from_secs(self.reconnect_delay_secs) < constants::MIN_RECONNECT_DELAY {
            anyhow::bail!(
                "reconnect_delay_secs must be at least {}",
                constants::MIN_RECONNECT_DELAY.as_secs()
            );
        }
        Ok(())
    }

    /// Reconnect delay as a [`Duration`], never below
    /// [`constants::MIN_RECONNECT_DELAY`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs).max(constants::MIN_RECONNECT_DELAY)
    }

    /// HTTP request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ws_url, "ws://localhost:3000");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.dedupe_by_id);
        assert_eq!(config.ws_credential, WsCredential::UserId);
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[
            ("CAMPUS_API_URL", "https://api.campus.test"),
            ("CAMPUS_WS_URL", "wss://ws.campus.test"),
            ("CAMPUS_RECONNECT_DELAY", "2"),
            ("CAMPUS_DEDUPE", "false"),
        ]));

        assert_eq!(config.api_url, "https://api.campus.test");
        assert_eq!(config.ws_url, "wss://ws.campus.test");
        assert_eq!(config.reconnect_delay_secs, 2);
        assert!(!config.dedupe_by_id);
    }

    #[test]
    fn test_invalid_overrides_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[
            ("CAMPUS_RECONNECT_DELAY", "soon"),
            ("CAMPUS_REQUEST_TIMEOUT", "-1"),
            ("CAMPUS_DEDUPE", "maybe"),
        ]));

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_zero_reconnect_delay_is_floored() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[("CAMPUS_RECONNECT_DELAY", "0")]));
        assert_eq!(config.reconnect_delay_secs, 5);

        let config: Config = serde_json::from_str(r#"{"reconnect_delay_secs": 0}"#).unwrap();
        assert!(config.validate().is_err());
        assert_eq!(config.reconnect_delay(), Duration::from_secs(1));
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"ws_url": "wss://push.example.edu", "ws_credential": "session_token"}"#)
            .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.ws_url, "wss://push.example.edu");
        assert_eq!(config.ws_credential, WsCredential::SessionToken);
        assert_eq!(config.api_url, constants::DEFAULT_API_URL);
        assert_eq!(config.reconnect_delay_secs, 5);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = Config {
            reconnect_delay_secs: 9,
            desktop_alerts: false,
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);

        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }
}
