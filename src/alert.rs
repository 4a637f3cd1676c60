//! Desktop alerts for incoming notifications.
//!
//! The in-app store is always the source of truth; alerts are a
//! best-effort extra gated by an explicit permission request, following
//! the browser model (`default`, `granted`, `denied`).
//!
//! [`TerminalNotifier`] raises alerts as OSC 777 escape sequences
//! (`ESC ] 777 ; notify ; title ; body BEL`), which terminal emulators
//! such as iTerm2, kitty, foot and rxvt-unicode surface as desktop
//! notifications. [`UnsupportedNotifier`] stands in when there is no
//! alert capability at all.

use std::io::{IsTerminal, Write};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::constants;
use crate::notification::Notification;

/// Permission to raise desktop alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Permission {
    /// Not asked yet.
    #[default]
    Default,
    /// The user allowed alerts.
    Granted,
    /// The user refused alerts, or the platform cannot show them.
    Denied,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Granted => write!(f, "granted"),
            Self::Denied => write!(f, "denied"),
        }
    }
}

/// Title and body of one desktop alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// Alert headline.
    pub title: String,
    /// Alert text.
    pub body: String,
}

impl Alert {
    /// Alert for an arrived notification: its title (or the app name) and
    /// its message (or a generic line).
    pub fn for_notification(notification: &Notification) -> Self {
        let title = notification
            .title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(constants::APP_NAME);
        let body = notification
            .message
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(constants::DEFAULT_ALERT_BODY);

        Self {
            title: title.to_string(),
            body: body.to_string(),
        }
    }
}

/// Platform capability for desktop alerts.
#[async_trait]
pub trait DesktopNotifier: Send + Sync + std::fmt::Debug {
    /// Current permission, without prompting.
    fn permission(&self) -> Permission;

    /// Explicitly asks for permission and returns the outcome.
    async fn request_permission(&self) -> Permission;

    /// Shows an alert. Callers only invoke this while permission is granted.
    fn show(&self, alert: &Alert) -> Result<()>;
}

/// No alert capability. Permission requests are always denied.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedNotifier;

#[async_trait]
impl DesktopNotifier for UnsupportedNotifier {
    fn permission(&self) -> Permission {
        Permission::Default
    }

    async fn request_permission(&self) -> Permission {
        Permission::Denied
    }

    fn show(&self, _alert: &Alert) -> Result<()> {
        Err(anyhow!("desktop alerts are not supported"))
    }
}

/// Raises alerts as OSC 777 sequences on a terminal.
pub struct TerminalNotifier {
    permission: Mutex<Permission>,
    out: Mutex<Box<dyn Write + Send>>,
    interactive: bool,
}

impl std::fmt::Debug for TerminalNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalNotifier")
            .field("permission", &self.permission())
            .field("interactive", &self.interactive)
            .finish_non_exhaustive()
    }
}

impl TerminalNotifier {
    /// Notifier writing to stdout. Permission can only be granted when
    /// stdout is a terminal.
    pub fn stdout() -> Self {
        let interactive = std::io::stdout().is_terminal();
        Self::with_writer(Box::new(std::io::stdout()), interactive)
    }

    /// Notifier writing to an arbitrary sink.
    pub fn with_writer(out: Box<dyn Write + Send>, interactive: bool) -> Self {
        Self {
            permission: Mutex::new(Permission::Default),
            out: Mutex::new(out),
            interactive,
        }
    }

    fn set_permission(&self, permission: Permission) {
        if let Ok(mut current) = self.permission.lock() {
            *current = permission;
        }
    }
}

#[async_trait]
impl DesktopNotifier for TerminalNotifier {
    fn permission(&self) -> Permission {
        self.permission
            .lock()
            .map_or(Permission::Denied, |permission| *permission)
    }

    async fn request_permission(&self) -> Permission {
        let outcome = if self.interactive {
            Permission::Granted
        } else {
            Permission::Denied
        };
        self.set_permission(outcome);
        log::info!("[Notifications] Permission: {outcome}");
        outcome
    }

    fn show(&self, alert: &Alert) -> Result<()> {
        let sequence = osc777(alert);
        let mut out = self
            .out
            .lock()
            .map_err(|e| anyhow!("alert writer poisoned: {e}"))?;
        out.write_all(sequence.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// Encode `alert` as an OSC 777 notify sequence.
///
/// Control characters are dropped and `;` is removed from the title so
/// neither field can terminate the sequence or shift the field split.
pub fn osc777(alert: &Alert) -> String {
    let title: String = alert
        .title
        .chars()
        .filter(|c| !c.is_control() && *c != ';')
        .collect();
    let body: String = alert.body.chars().filter(|c| !c.is_control()).collect();
    format!("\x1b]777;notify;{title};{body}\x07")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Shared buffer so the test can read what the notifier wrote.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn notification(json: serde_json::Value) -> Notification {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_alert_defaults() {
        let alert = Alert::for_notification(&notification(serde_json::json!({"id": 1})));
        assert_eq!(alert.title, "Campus Connect");
        assert_eq!(alert.body, "New activity alert!");

        let alert = Alert::for_notification(&notification(
            serde_json::json!({"id": 2, "title": "RSVP", "message": "Bo is going"}),
        ));
        assert_eq!(alert.title, "RSVP");
        assert_eq!(alert.body, "Bo is going");
    }

    #[test]
    fn test_osc777_sanitizes_fields() {
        let alert = Alert {
            title: "a;b\x07".to_string(),
            body: "line\x1b]9;x".to_string(),
        };
        assert_eq!(osc777(&alert), "\x1b]777;notify;ab;line]9;x\x07");
    }

    #[tokio::test]
    async fn test_terminal_notifier_permission_follows_tty() {
        let notifier = TerminalNotifier::with_writer(Box::new(SharedBuf::default()), false);
        assert_eq!(notifier.permission(), Permission::Default);
        assert_eq!(notifier.request_permission().await, Permission::Denied);
        assert_eq!(notifier.permission(), Permission::Denied);

        let notifier = TerminalNotifier::with_writer(Box::new(SharedBuf::default()), true);
        assert_eq!(notifier.request_permission().await, Permission::Granted);
    }

    #[test]
    fn test_terminal_notifier_writes_sequence() {
        let buf = SharedBuf::default();
        let notifier = TerminalNotifier::with_writer(Box::new(buf.clone()), true);
        notifier
            .show(&Alert {
                title: "Campus Connect".to_string(),
                body: "Hi".to_string(),
            })
            .unwrap();

        let written = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written, "\x1b]777;notify;Campus Connect;Hi\x07");
    }

    #[tokio::test]
    async fn test_unsupported_notifier() {
        let notifier = UnsupportedNotifier;
        assert_eq!(notifier.request_permission().await, Permission::Denied);
        assert!(notifier
            .show(&Alert {
                title: String::new(),
                body: String::new(),
            })
            .is_err());
    }
}
