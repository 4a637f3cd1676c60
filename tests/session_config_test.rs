//! Integration tests for config and session persistence.
//!
//! Each test points `CAMPUS_CONFIG_DIR` at its own temp dir; `ENV_LOCK`
//! serialises them because the process environment is shared.

use std::env;
use std::fs;
use std::sync::Mutex;

use campus_connect::config::{Config, WsCredential};
use campus_connect::env::{is_test_mode, Environment};
use campus_connect::session::{Session, SessionStore};
use tempfile::TempDir;

// Global lock to prevent env var pollution between tests
static ENV_LOCK: Mutex<()> = Mutex::new(());

const OVERRIDES: [&str; 6] = [
    "CAMPUS_API_URL",
    "CAMPUS_WS_URL",
    "CAMPUS_RECONNECT_DELAY",
    "CAMPUS_REQUEST_TIMEOUT",
    "CAMPUS_DEDUPE",
    "CAMPUS_ENV",
];

/// Points the config dir at a fresh temp dir and clears overrides.
fn setup_test_env() -> (TempDir, std::sync::MutexGuard<'static, ()>) {
    let guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let temp_dir = TempDir::new().unwrap();

    for key in OVERRIDES {
        env::remove_var(key);
    }
    env::set_var("CAMPUS_CONFIG_DIR", temp_dir.path());

    (temp_dir, guard)
}

#[test]
fn test_missing_config_uses_defaults() {
    let (_dir, _guard) = setup_test_env();

    let config = Config::load().unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_env_overrides_apply_on_load() {
    let (_dir, _guard) = setup_test_env();
    env::set_var("CAMPUS_WS_URL", "wss://push.campus.example");
    env::set_var("CAMPUS_RECONNECT_DELAY", "2");
    env::set_var("CAMPUS_DEDUPE", "false");
    env::set_var("CAMPUS_REQUEST_TIMEOUT", "soon");

    let config = Config::load().unwrap();
    assert_eq!(config.ws_url, "wss://push.campus.example");
    assert_eq!(config.reconnect_delay_secs, 2);
    assert!(!config.dedupe_by_id);
    // Unparseable values are ignored.
    assert_eq!(config.request_timeout_secs, 10);

    for key in OVERRIDES {
        env::remove_var(key);
    }
}

#[test]
fn test_saved_config_round_trips_without_overrides() {
    let (dir, _guard) = setup_test_env();

    let config = Config {
        api_url: "https://api.campus.example".to_string(),
        ws_credential: WsCredential::SessionToken,
        ..Config::default()
    };
    config.save().unwrap();
    assert!(dir.path().join("config.json").exists());

    env::set_var("CAMPUS_API_URL", "http://override.local");
    assert_eq!(Config::load_saved().unwrap(), config);
    assert_eq!(Config::load().unwrap().api_url, "http://override.local");
    env::remove_var("CAMPUS_API_URL");
}

#[test]
fn test_partial_config_file_fills_defaults() {
    let (dir, _guard) = setup_test_env();
    fs::write(
        dir.path().join("config.json"),
        r#"{"ws_url": "ws://10.0.0.5:3000"}"#,
    )
    .unwrap();

    let config = Config::load().unwrap();
    assert_eq!(config.ws_url, "ws://10.0.0.5:3000");
    assert_eq!(config.api_url, "http://localhost:3000");
    assert!(config.dedupe_by_id);
}

#[test]
fn test_session_store_round_trip() {
    let (dir, _guard) = setup_test_env();
    let store = SessionStore::in_config_dir().unwrap();
    assert_eq!(store.path(), dir.path().join("session.json"));
    assert!(store.load().unwrap().is_none());

    let session = Session::new("42", Some("tok-42".to_string()));
    store.save(&session).unwrap();
    assert_eq!(store.load().unwrap(), Some(session));

    store.clear().unwrap();
    assert!(store.load().unwrap().is_none());
    // Clearing twice is fine.
    store.clear().unwrap();
}

#[cfg(unix)]
#[test]
fn test_files_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let (dir, _guard) = setup_test_env();
    Config::default().save().unwrap();
    SessionStore::in_config_dir()
        .unwrap()
        .save(&Session::new("42", None))
        .unwrap();

    for name in ["config.json", "session.json"] {
        let mode = fs::metadata(dir.path().join(name)).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600, "{name}");
    }
}

#[test]
fn test_corrupt_session_is_discarded() {
    let (dir, _guard) = setup_test_env();
    let path = dir.path().join("session.json");
    fs::write(&path, "{not json").unwrap();

    let store = SessionStore::in_config_dir().unwrap();
    assert!(store.load().unwrap().is_none());
    assert!(!path.exists());
}

#[test]
fn test_unauthenticated_session_is_not_saved() {
    let (_dir, _guard) = setup_test_env();
    let store = SessionStore::in_config_dir().unwrap();
    assert!(store.save(&Session::new("  ", None)).is_err());
}

#[test]
fn test_environment_from_env_var() {
    let (_dir, _guard) = setup_test_env();
    assert_eq!(Environment::current(), Environment::Production);
    assert!(!is_test_mode());

    env::set_var("CAMPUS_ENV", "test");
    assert!(is_test_mode());
    env::set_var("CAMPUS_ENV", "development");
    assert_eq!(Environment::current().default_log_filter(), "debug");
    env::remove_var("CAMPUS_ENV");
}
