//! Background task that owns the notification connection.
//!
//! All connection state (transport, in-flight open, reconnect timer,
//! attached session) lives here and is mutated only from the `select!`
//! loop in [`ChannelDriver::run`].

// Rust guideline compliant 2026-02

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Sleep;

use super::transport::{Connector, Transport};
use super::{lock_store, ChannelOptions, ChannelState, ChannelStatus, SharedStore};
use crate::alert::{Alert, DesktopNotifier, Permission};
use crate::api::OfflineFetcher;
use crate::config::WsCredential;
use crate::constants;
use crate::notification::{Notification, Origin};
use crate::session::Session;
use crate::ws::{self, WsMessage};

type PendingOpen = Pin<Box<dyn Future<Output = Result<Box<dyn Transport>>> + Send>>;

/// Requests from the handle.
#[derive(Debug)]
pub(super) enum ChannelCommand {
    Attach(Session),
    Detach,
    Backfill { reply: oneshot::Sender<usize> },
    Dispose,
}

/// Collaborators the driver calls out to.
#[derive(Debug)]
pub(super) struct Services {
    pub(super) connector: Arc<dyn Connector>,
    pub(super) fetcher: Arc<dyn OfflineFetcher>,
    pub(super) notifier: Arc<dyn DesktopNotifier>,
}

/// Result of a spawned backfill, tagged with the session epoch it was
/// started in.
struct BackfillOutcome {
    epoch: u64,
    result: Result<Vec<Notification>>,
    reply: Option<oneshot::Sender<usize>>,
}

enum DriverEvent {
    Command(Option<ChannelCommand>),
    Opened(Result<Box<dyn Transport>>),
    Frame(Option<Result<WsMessage>>),
    ReconnectDue,
    Backfill(BackfillOutcome),
}

pub(super) struct ChannelDriver {
    options: ChannelOptions,
    services: Services,
    store: SharedStore,
    status: watch::Sender<ChannelStatus>,
    arrivals: broadcast::Sender<Notification>,
    commands: mpsc::UnboundedReceiver<ChannelCommand>,
    backfill_tx: mpsc::UnboundedSender<BackfillOutcome>,
    backfill_rx: mpsc::UnboundedReceiver<BackfillOutcome>,
    session: Option<Session>,
    /// Bumped on every teardown so late backfill results are discarded.
    epoch: u64,
    pending_open: Option<PendingOpen>,
    transport: Option<Box<dyn Transport>>,
    reconnect: Option<Pin<Box<Sleep>>>,
}

impl ChannelDriver {
    pub(super) fn new(
        options: ChannelOptions,
        services: Services,
        store: SharedStore,
        status: watch::Sender<ChannelStatus>,
        arrivals: broadcast::Sender<Notification>,
        commands: mpsc::UnboundedReceiver<ChannelCommand>,
    ) -> Self {
        let (backfill_tx, backfill_rx) = mpsc::unbounded_channel();
        Self {
            options,
            services,
            store,
            status,
            arrivals,
            commands,
            backfill_tx,
            backfill_rx,
            session: None,
            epoch: 0,
            pending_open: None,
            transport: None,
            reconnect: None,
        }
    }

    pub(super) async fn run(mut self) {
        loop {
            let event = tokio::select! {
                command = self.commands.recv() => DriverEvent::Command(command),
                opened = wait_open(&mut self.pending_open) => DriverEvent::Opened(opened),
                frame = next_frame(&mut self.transport) => DriverEvent::Frame(frame),
                () = wait_reconnect(&mut self.reconnect) => DriverEvent::ReconnectDue,
                Some(outcome) = self.backfill_rx.recv() => DriverEvent::Backfill(outcome),
            };

            match event {
                DriverEvent::Command(Some(command)) => {
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                DriverEvent::Command(None) => {
                    self.teardown("Channel dropped").await;
                    break;
                }
                DriverEvent::Opened(result) => self.on_open_result(result),
                DriverEvent::Frame(frame) => self.on_frame(frame).await,
                DriverEvent::ReconnectDue => self.on_reconnect_due(),
                DriverEvent::Backfill(outcome) => self.on_backfill(outcome),
            }
        }

        log::debug!("[NotificationChannel] Driver stopped");
    }

    /// Returns `false` once the driver should stop.
    async fn handle_command(&mut self, command: ChannelCommand) -> bool {
        match command {
            ChannelCommand::Attach(session) => self.attach(session).await,
            ChannelCommand::Detach => self.teardown(constants::CLOSE_REASON_LOGOUT).await,
            ChannelCommand::Backfill { reply } => self.spawn_backfill(Some(reply)),
            ChannelCommand::Dispose => {
                self.teardown(constants::CLOSE_REASON_LOGOUT).await;
                return false;
            }
        }
        true
    }

    fn state(&self) -> ChannelState {
        self.status.borrow().state
    }

    fn has_authenticated_session(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_authenticated)
    }

    async fn attach(&mut self, session: Session) {
        if !session.is_authenticated() {
            log::info!("[NotificationChannel] Session is not authenticated, not connecting");
            self.teardown(constants::CLOSE_REASON_LOGOUT).await;
            return;
        }

        let same_user = self
            .session
            .as_ref()
            .is_some_and(|current| current.user_id == session.user_id);

        if same_user {
            self.session = Some(session);
            if matches!(self.state(), ChannelState::Connecting | ChannelState::Connected) {
                log::debug!("[NotificationChannel] Already connected or connecting");
                return;
            }
            // Attached again while waiting out the delay: go now.
            self.begin_connect();
            return;
        }

        if self.session.is_some() {
            self.teardown(constants::CLOSE_REASON_LOGOUT).await;
        }
        self.session = Some(session);
        self.begin_connect();
    }

    fn begin_connect(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if matches!(self.state(), ChannelState::Connecting | ChannelState::Connected) {
            log::debug!("[NotificationChannel] Already connected or connecting");
            return;
        }

        let credential = match self.options.credential {
            WsCredential::UserId => session.user_id.as_str(),
            WsCredential::SessionToken => session.token.as_deref().unwrap_or(&session.user_id),
        };
        let user_id = session.user_id.clone();

        let url = match ws::notifications_url(&self.options.ws_url, credential) {
            Ok(url) => url,
            Err(e) => {
                log::error!("[NotificationChannel] Cannot build channel URL: {e:#}");
                self.update_status(|s| s.connect_attempts += 1);
                self.on_disconnected();
                return;
            }
        };

        log::info!(
            "[NotificationChannel] Connecting to {} for user {user_id}",
            self.options.ws_url
        );

        self.transport = None;
        self.reconnect = None;
        let connector = Arc::clone(&self.services.connector);
        self.pending_open = Some(Box::pin(async move { connector.connect(&url).await }));
        self.update_status(|s| {
            s.state = ChannelState::Connecting;
            s.user_id = Some(user_id);
            s.reconnect_scheduled = false;
            s.connect_attempts += 1;
        });
    }

    fn on_open_result(&mut self, result: Result<Box<dyn Transport>>) {
        match result {
            Ok(transport) => {
                log::info!("[NotificationChannel] Connection established");
                self.transport = Some(transport);
                self.reconnect = None;
                self.update_status(|s| {
                    s.state = ChannelState::Connected;
                    s.reconnect_scheduled = false;
                });
                self.spawn_backfill(None);
            }
            Err(e) => {
                log::warn!("[NotificationChannel] Connection failed: {e:#}");
                self.on_disconnected();
            }
        }
    }

    /// Marks the channel down and schedules one reconnect if a session is
    /// still attached and no timer is pending.
    fn on_disconnected(&mut self) {
        self.transport = None;
        self.pending_open = None;

        if self.has_authenticated_session() && self.reconnect.is_none() {
            let delay = self.reconnect_delay();
            log::info!(
                "[NotificationChannel] Attempting to reconnect in {}ms...",
                delay.as_millis()
            );
            self.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
        }

        let scheduled = self.reconnect.is_some();
        self.update_status(|s| {
            s.state = ChannelState::Disconnected;
            s.reconnect_scheduled = scheduled;
        });
    }

    fn reconnect_delay(&self) -> Duration {
        self.options
            .reconnect_delay
            .max(constants::MIN_RECONNECT_DELAY)
    }

    fn on_reconnect_due(&mut self) {
        self.reconnect = None;
        self.update_status(|s| s.reconnect_scheduled = false);

        if self.has_authenticated_session() {
            self.begin_connect();
        } else {
            log::debug!("[NotificationChannel] Reconnect skipped, no session attached");
        }
    }

    async fn on_frame(&mut self, frame: Option<Result<WsMessage>>) {
        match frame {
            Some(Ok(WsMessage::Text(text))) => self.on_text(&text),
            Some(Ok(WsMessage::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => self.on_text(&text),
                Err(_) => log::warn!("[NotificationChannel] Dropping non-UTF-8 binary frame"),
            },
            Some(Ok(WsMessage::Ping(data))) => {
                if let Some(transport) = self.transport.as_mut() {
                    if let Err(e) = transport.send_pong(data).await {
                        log::debug!("[NotificationChannel] Failed to answer ping: {e:#}");
                    }
                }
            }
            Some(Ok(WsMessage::Pong(_))) => {}
            Some(Ok(WsMessage::Close { code, reason })) => {
                log::info!("[NotificationChannel] Connection closed by server ({code}): {reason}");
                self.on_disconnected();
            }
            Some(Err(e)) => {
                log::warn!("[NotificationChannel] Connection error: {e:#}");
                self.on_disconnected();
            }
            None => {
                log::info!("[NotificationChannel] Connection closed");
                self.on_disconnected();
            }
        }
    }

    fn on_text(&mut self, text: &str) {
        let notification = match serde_json::from_str::<Notification>(text) {
            Ok(notification) => notification,
            Err(e) => {
                log::warn!(
                    "[NotificationChannel] Failed to parse message: {e} ({})",
                    preview(text)
                );
                return;
            }
        };

        log::debug!(
            "[NotificationChannel] Received notification {}",
            notification.id
        );

        let stored = lock_store(&self.store).push_arrived(notification.clone());
        if !stored {
            return;
        }

        let notification = Notification {
            origin: Origin::Channel,
            ..notification
        };
        self.raise_alert(&notification);
        // No subscribers is fine.
        let _ = self.arrivals.send(notification);
    }

    fn raise_alert(&self, notification: &Notification) {
        if self.services.notifier.permission() != Permission::Granted {
            return;
        }
        if let Err(e) = self
            .services
            .notifier
            .show(&Alert::for_notification(notification))
        {
            log::warn!("[NotificationChannel] Failed to show desktop alert: {e:#}");
        }
    }

    fn spawn_backfill(&self, reply: Option<oneshot::Sender<usize>>) {
        let Some(session) = self.session.clone() else {
            log::debug!("[NotificationChannel] No session attached, skipping offline fetch");
            if let Some(reply) = reply {
                let _ = reply.send(0);
            }
            return;
        };

        let fetcher = Arc::clone(&self.services.fetcher);
        let outcomes = self.backfill_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let result = fetcher.fetch_offline_notifications(&session).await;
            let _ = outcomes.send(BackfillOutcome {
                epoch,
                result,
                reply,
            });
        });
    }

    fn on_backfill(&mut self, outcome: BackfillOutcome) {
        let BackfillOutcome {
            epoch,
            result,
            reply,
        } = outcome;

        let delivered = if epoch == self.epoch {
            match result {
                Ok(notifications) if notifications.is_empty() => 0,
                Ok(notifications) => {
                    let stored = lock_store(&self.store).extend_arrived(notifications);
                    log::info!(
                        "[NotificationChannel] Delivering {} queued offline notifications",
                        stored.len()
                    );
                    let count = stored.len();
                    for notification in stored {
                        let _ = self.arrivals.send(notification);
                    }
                    count
                }
                Err(e) => {
                    log::error!("[NotificationChannel] Failed to fetch offline notifications: {e:#}");
                    0
                }
            }
        } else {
            log::debug!("[NotificationChannel] Discarding offline notifications from a previous session");
            0
        };

        if let Some(reply) = reply {
            let _ = reply.send(delivered);
        }
    }

    /// Drops every trace of the current session.
    async fn teardown(&mut self, reason: &str) {
        self.epoch += 1;
        self.reconnect = None;
        self.pending_open = None;

        if let Some(mut transport) = self.transport.take() {
            match tokio::time::timeout(
                constants::CLOSE_TIMEOUT,
                transport.close(constants::CLOSE_NORMAL, reason),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::debug!("[NotificationChannel] Close failed: {e:#}"),
                Err(_) => log::debug!("[NotificationChannel] Close timed out"),
            }
        }

        let had_session = self.session.take().is_some();
        let cleared = lock_store(&self.store).clear();
        if had_session {
            log::info!("[NotificationChannel] Torn down: {reason} ({cleared} notifications cleared)");
        }

        self.update_status(|s| {
            s.state = ChannelState::TornDown;
            s.user_id = None;
            s.reconnect_scheduled = false;
        });
    }

    fn update_status(&self, modify: impl FnOnce(&mut ChannelStatus)) {
        self.status.send_modify(modify);
    }
}

async fn wait_open(pending: &mut Option<PendingOpen>) -> Result<Box<dyn Transport>> {
    match pending.as_mut() {
        Some(open) => {
            let result = open.await;
            *pending = None;
            result
        }
        None => std::future::pending().await,
    }
}

async fn next_frame(transport: &mut Option<Box<dyn Transport>>) -> Option<Result<WsMessage>> {
    match transport.as_mut() {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_reconnect(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// First 100 characters of an unparseable frame, for the log line.
fn preview(text: &str) -> String {
    text.chars().take(100).collect()
}
