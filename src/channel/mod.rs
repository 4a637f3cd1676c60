//! Persistent, self-healing notification channel.
//!
//! [`NotificationChannel`] keeps one WebSocket open per attached session,
//! appends pushed notifications to a shared [`NotificationStore`], backfills
//! what was missed while offline, and reconnects after a fixed delay when the
//! connection drops.
//!
//! # Architecture
//!
//! ```text
//!   NotificationChannel (handle)          driver task
//!         │  attach / detach / backfill        │
//!         │ ────────── commands ─────────────► │  select! {
//!         │                                    │    commands,
//!         │  notifications() / mark_as_read()  │    open completion,
//!         │ ◄──── Arc<Mutex<store>> ─────────► │    inbound frames,
//!         │                                    │    reconnect timer,
//!         │  watch_status()                    │    backfill results,
//!         │ ◄──────── watch ────────────────── │  }
//!         │  subscribe_arrivals()              │
//!         │ ◄──────── broadcast ────────────── │
//! ```
//!
//! The driver is the only writer of connection state, so every event is
//! handled to completion before the next one starts.
//!
//! # Lifecycle
//!
//! - `Idle`/`TornDown`/`Disconnected` → `Connecting` on attach
//! - `Connecting` → `Connected` on open, which also fires one backfill
//! - `Connected`/`Connecting` → `Disconnected` on close, error or failed open,
//!   scheduling exactly one reconnect
//! - any → `TornDown` on detach or disposal: timer cancelled, transport
//!   closed with 1000 "User logged out", store emptied

// Rust guideline compliant 2026-02

mod driver;
pub mod transport;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::alert::{DesktopNotifier, Permission};
use crate::api::OfflineFetcher;
use crate::config::{Config, WsCredential};
use crate::constants;
use crate::notification::{Notification, NotificationId, Origin};
use crate::session::Session;
use crate::store::NotificationStore;

use driver::{ChannelCommand, ChannelDriver, Services};
pub use transport::{Connector, Transport, WsConnector};

pub(crate) type SharedStore = Arc<Mutex<NotificationStore>>;

/// Locks the store, recovering the data if a holder panicked.
pub(crate) fn lock_store(store: &SharedStore) -> MutexGuard<'_, NotificationStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connection state of the channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelState {
    /// No session has been attached yet.
    #[default]
    Idle,
    /// A connect attempt is in flight.
    Connecting,
    /// The channel is open.
    Connected,
    /// The channel dropped; a reconnect may be pending.
    Disconnected,
    /// The session was detached or the channel disposed.
    TornDown,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::TornDown => write!(f, "torn down"),
        }
    }
}

/// Observable channel status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStatus {
    /// Current connection state.
    pub state: ChannelState,
    /// User of the attached session, if any.
    pub user_id: Option<String>,
    /// A reconnect timer is pending.
    pub reconnect_scheduled: bool,
    /// Connect attempts started since the channel was created.
    pub connect_attempts: u64,
}

impl ChannelStatus {
    /// `true` only while the channel is open.
    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }
}

/// Tunables for a [`NotificationChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Base URL of the notification WebSocket server.
    pub ws_url: String,
    /// Delay between a disconnect and the next attempt. Values below
    /// [`constants::MIN_RECONNECT_DELAY`] are raised to it.
    pub reconnect_delay: Duration,
    /// Drop channel notifications whose id is already stored.
    pub dedupe_by_id: bool,
    /// Session value sent as the `token` query parameter.
    pub credential: WsCredential,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ChannelOptions {
    fn from(config: &Config) -> Self {
        Self {
            ws_url: config.ws_url.clone(),
            reconnect_delay: config.reconnect_delay(),
            dedupe_by_id: config.dedupe_by_id,
            credential: config.ws_credential,
        }
    }
}

/// Handle to the notification channel.
///
/// Must be created inside a tokio runtime; the connection is driven by a
/// background task that lives until [`shutdown`](Self::shutdown) or drop.
#[derive(Debug)]
pub struct NotificationChannel {
    commands: mpsc::UnboundedSender<ChannelCommand>,
    store: SharedStore,
    status: watch::Receiver<ChannelStatus>,
    arrivals: broadcast::Sender<Notification>,
    notifier: Arc<dyn DesktopNotifier>,
    driver: Option<JoinHandle<()>>,
}

impl NotificationChannel {
    /// Creates the channel and spawns its driver. Nothing connects until a
    /// session is [attached](Self::attach).
    pub fn new(
        options: ChannelOptions,
        connector: Arc<dyn Connector>,
        fetcher: Arc<dyn OfflineFetcher>,
        notifier: Arc<dyn DesktopNotifier>,
    ) -> Self {
        let store: SharedStore = Arc::new(Mutex::new(NotificationStore::new(options.dedupe_by_id)));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(ChannelStatus::default());
        let (arrivals, _) = broadcast::channel(constants::ARRIVAL_BUFFER);

        let services = Services {
            connector,
            fetcher,
            notifier: Arc::clone(&notifier),
        };
        let driver = ChannelDriver::new(
            options,
            services,
            Arc::clone(&store),
            status_tx,
            arrivals.clone(),
            command_rx,
        );
        let driver = tokio::spawn(driver.run());

        Self {
            commands,
            store,
            status,
            arrivals,
            notifier,
            driver: Some(driver),
        }
    }

    fn send(&self, command: ChannelCommand) {
        if self.commands.send(command).is_err() {
            log::warn!("[NotificationChannel] Driver is gone, command dropped");
        }
    }

    /// Attaches `session` and starts connecting.
    ///
    /// Re-attaching the user that is already connecting or connected does
    /// nothing. Attaching a different user tears the previous session down
    /// first. An unauthenticated session behaves like [`detach`](Self::detach).
    pub fn attach(&self, session: Session) {
        self.send(ChannelCommand::Attach(session));
    }

    /// Detaches the session (logout): closes the channel, cancels any
    /// pending reconnect and empties the store.
    pub fn detach(&self) {
        self.send(ChannelCommand::Detach);
    }

    /// `true` only while the channel is open.
    pub fn is_connected(&self) -> bool {
        self.status.borrow().is_connected()
    }

    /// Current connection state.
    pub fn state(&self) -> ChannelState {
        self.status.borrow().state
    }

    /// Snapshot of the full status.
    pub fn status(&self) -> ChannelStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status.clone()
    }

    /// Every stored notification in storage order.
    pub fn notifications(&self) -> Vec<Notification> {
        lock_store(&self.store).iter().cloned().collect()
    }

    /// Channel notifications in arrival order, then local ones newest first.
    pub fn display_notifications(&self) -> Vec<Notification> {
        lock_store(&self.store).display_order()
    }

    /// Unread entries across both origins.
    pub fn unread_count(&self) -> usize {
        lock_store(&self.store).unread_count()
    }

    /// Unread entries of one origin.
    pub fn unread_count_for(&self, origin: Origin) -> usize {
        lock_store(&self.store).unread_count_for(origin)
    }

    /// Marks the notification with `id` as read. Unknown ids are ignored.
    pub fn mark_as_read(&self, id: &NotificationId) -> bool {
        lock_store(&self.store).mark_as_read(id)
    }

    /// Marks everything as read.
    pub fn mark_all_as_read(&self) -> usize {
        lock_store(&self.store).mark_all_as_read()
    }

    /// Removes channel notifications. Local ones stay.
    pub fn clear_all_notifications(&self) -> usize {
        lock_store(&self.store).clear_origin(Origin::Channel)
    }

    /// Prepends a notification describing a local user action.
    pub fn add_local_notification(&self, notification: Notification) {
        lock_store(&self.store).push_local(notification);
    }

    /// Removes local notifications. Channel ones stay.
    pub fn clear_local_notifications(&self) -> usize {
        lock_store(&self.store).clear_origin(Origin::Local)
    }

    /// Removes everything, whatever the origin.
    pub fn clear_everything(&self) -> usize {
        lock_store(&self.store).clear()
    }

    /// Receiver for every channel notification appended to the store,
    /// pushed or backfilled.
    pub fn subscribe_arrivals(&self) -> broadcast::Receiver<Notification> {
        self.arrivals.subscribe()
    }

    /// Fetches notifications queued while offline and appends them.
    ///
    /// Best effort: returns how many were appended, `0` on failure or when
    /// no session is attached.
    pub async fn fetch_offline_notifications(&self) -> usize {
        let (reply, delivered) = oneshot::channel();
        self.send(ChannelCommand::Backfill { reply });
        delivered.await.unwrap_or(0)
    }

    /// Asks for desktop alert permission. Returns `true` if granted.
    pub async fn request_notification_permission(&self) -> bool {
        self.notifier.request_permission().await == Permission::Granted
    }

    /// Tears the channel down and waits for the driver to finish.
    pub async fn shutdown(mut self) {
        self.send(ChannelCommand::Dispose);
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                log::warn!("[NotificationChannel] Driver task failed: {e}");
            }
        }
    }
}

impl Drop for NotificationChannel {
    fn drop(&mut self) {
        // Already gone after shutdown().
        let _ = self.commands.send(ChannelCommand::Dispose);
    }
}
