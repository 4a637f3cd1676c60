//! Campus Connect notification client.
//!
//! Keeps a signed-in user's real-time notification channel alive, merges
//! pushed notifications with those missed while offline, and raises desktop
//! alerts for new activity.
//!
//! # Architecture
//!
//! - **Channel** - persistent WebSocket with fixed-delay reconnect and
//!   backfill on every successful open
//! - **Store** - one origin-tagged list for channel and local notifications
//! - **Alerts** - permission-gated desktop alerts
//! - **API** - REST client for login and the offline backfill
//!
//! # Modules
//!
//! - [`channel`] - connection state machine and its handle
//! - [`notification`] - data model and presentation helpers
//! - [`store`] - notification store
//! - [`alert`] - desktop alert capability
//! - [`api`] - REST client
//! - [`session`] - session identity and persistence
//! - [`config`] - configuration loading/saving

// Library modules
pub mod alert;
pub mod api;
pub mod channel;
pub mod commands;
pub mod notification;
pub mod session;
pub mod store;
pub mod ws;

pub mod config;
pub mod constants;
pub mod env;

// Re-export commonly used types
pub use alert::{DesktopNotifier, Permission};
pub use api::{ApiClient, OfflineFetcher};
pub use channel::{ChannelOptions, ChannelState, ChannelStatus, NotificationChannel};
pub use config::Config;
pub use notification::{Notification, NotificationId, NotificationKind, Origin};
pub use session::{Session, SessionStore};
pub use store::NotificationStore;
