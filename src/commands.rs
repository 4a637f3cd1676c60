//! CLI command implementations.
//!
//! Each subcommand of the `campus-connect` binary maps to one function
//! here; `main` only parses arguments and wires up logging.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;

use crate::alert::{DesktopNotifier, TerminalNotifier};
use crate::api::{ApiClient, LoginRequest};
use crate::channel::{ChannelOptions, ChannelState, NotificationChannel, WsConnector};
use crate::config::Config;
use crate::notification::Notification;
use crate::session::{Session, SessionStore};

/// One notification as a single terminal line: icon, message, age.
pub fn format_notification(notification: &Notification, now: DateTime<Utc>) -> String {
    format!(
        "{} {}  ({})",
        notification.icon(),
        notification.display_message(),
        notification.display_time(now)
    )
}

/// Loads the saved session or explains how to get one.
pub fn require_session(sessions: &SessionStore) -> Result<Session> {
    sessions
        .load()?
        .context("Not logged in. Run `campus-connect login` first.")
}

/// Logs in and persists the session.
pub async fn login(config: &Config, sessions: &SessionStore, request: &LoginRequest) -> Result<Session> {
    let client = ApiClient::new(&config.api_url, config.request_timeout())?;
    let session = client.authenticate_user(request).await?.into_session()?;
    sessions.save(&session)?;
    log::info!("Logged in as user {}", session.user_id);
    Ok(session)
}

/// Forgets the saved session.
pub fn logout(sessions: &SessionStore) -> Result<()> {
    sessions.clear()?;
    log::info!("Session cleared");
    Ok(())
}

/// Fetches queued notifications once, without opening the channel.
pub async fn backfill(config: &Config, session: &Session) -> Result<Vec<Notification>> {
    let client = ApiClient::new(&config.api_url, config.request_timeout())?;
    client.fetch_offline_notifications(session).await
}

/// Keeps the notification channel open and prints every arrival until
/// Ctrl-C.
pub async fn listen(config: &Config, session: Session) -> Result<()> {
    let client = ApiClient::new(&config.api_url, config.request_timeout())?;
    let notifier: Arc<dyn DesktopNotifier> = Arc::new(TerminalNotifier::stdout());

    let channel = NotificationChannel::new(
        ChannelOptions::from(config),
        Arc::new(WsConnector),
        Arc::new(client),
        notifier,
    );

    let want_alerts = config.desktop_alerts && !crate::env::is_test_mode();
    if want_alerts && !channel.request_notification_permission().await {
        log::info!("Desktop alerts unavailable, printing notifications only");
    }

    let mut arrivals = channel.subscribe_arrivals();
    let mut status = channel.watch_status();
    channel.attach(session);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                log::info!("Interrupted, closing channel");
                break;
            }
            arrival = arrivals.recv() => match arrival {
                Ok(notification) => println!("{}", format_notification(&notification, Utc::now())),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Terminal fell behind, {skipped} notifications not printed");
                }
                Err(RecvError::Closed) => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                match current.state {
                    ChannelState::Connected => eprintln!("Connected."),
                    ChannelState::Disconnected if current.reconnect_scheduled => {
                        eprintln!("Disconnected, retrying in {}s.", config.reconnect_delay().as_secs());
                    }
                    _ => {}
                }
            }
        }
    }

    channel.shutdown().await;
    Ok(())
}

/// Reads one config key, or the whole config when `key` is `None`.
pub fn config_get(config: &Config, key: Option<&str>) -> Result<Value> {
    let value = serde_json::to_value(config)?;
    match key {
        None => Ok(value),
        Some(key) => value
            .get(key)
            .cloned()
            .with_context(|| format!("Unknown config key: {key}")),
    }
}

/// Sets one config key. `raw` is parsed as JSON, falling back to a plain
/// string.
pub fn config_set(config: &mut Config, key: &str, raw: &str) -> Result<()> {
    let mut value = serde_json::to_value(&*config)?;
    let object = value
        .as_object_mut()
        .context("config did not serialize to an object")?;
    if !object.contains_key(key) {
        anyhow::bail!("Unknown config key: {key}");
    }

    let parsed = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    object.insert(key.to_string(), parsed);

    let updated: Config =
        serde_json::from_value(value).with_context(|| format!("Invalid value for {key}: {raw}"))?;
    updated.validate()?;
    *config = updated;
    Ok(())
}
