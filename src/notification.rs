//! Notification data model.
//!
//! [`Notification`] is the wire shape pushed by the notification server and
//! returned by the offline backfill endpoint, plus an [`Origin`] tag the
//! store assigns on arrival. The presentation helpers here (icons, relative
//! time, fallback text, navigation target) are what every front end renders.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "id": 42,
//!   "type": "event-reminder",
//!   "title": "Starting soon",
//!   "orgName": "Drama Club",
//!   "eventName": "Spring Festival",
//!   "time": "2026-03-01T18:00:00Z",
//!   "read": false
//! }
//! ```
//!
//! `id` may be a string or a number. `time` may be an RFC 3339 timestamp,
//! epoch milliseconds, or a pre-formatted string such as `"just now"`.
//! Optional fields with an unexpected shape are dropped rather than failing
//! the whole notification; only a bad or missing `id` rejects it.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants;

/// Opaque notification identifier.
///
/// Unique within a session. Numeric wire ids are kept in their decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    /// Wraps an id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id for a locally synthesised notification.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotificationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<u64> for NotificationId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for NotificationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
            Float(f64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => Self(s),
            RawId::Signed(n) => Self(n.to_string()),
            RawId::Unsigned(n) => Self(n.to_string()),
            RawId::Float(n) => Self(n.to_string()),
        })
    }
}

/// What a notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    /// A followed organisation published an event.
    NewEvent,
    /// An event the user cares about changed.
    UpdateEvent,
    /// The user is hosting an event.
    HostingEvent,
    /// Someone RSVPed (or the user's RSVP went through).
    Rsvp,
    /// An RSVP was cancelled.
    RsvpCancel,
    /// New follower / followed someone.
    Follow,
    /// Unfollow.
    Unfollow,
    /// An event was created.
    EventCreated,
    /// Reminder for an upcoming event.
    EventReminder,
    /// Any tag outside the known set, kept verbatim.
    Custom(String),
}

impl NotificationKind {
    /// Wire tag for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::NewEvent => "new-event",
            Self::UpdateEvent => "update-event",
            Self::HostingEvent => "hosting-event",
            Self::Rsvp => "rsvp",
            Self::RsvpCancel => "rsvp-cancel",
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
            Self::EventCreated => "event-created",
            Self::EventReminder => "event-reminder",
            Self::Custom(tag) => tag,
        }
    }

    /// Emoji shown next to the notification.
    pub fn icon(&self) -> &'static str {
        match self {
            Self::NewEvent => "📅",
            Self::UpdateEvent => "📝",
            Self::HostingEvent => "🎭",
            Self::Rsvp => "✅",
            Self::RsvpCancel => "❌",
            Self::Follow => "👥",
            Self::Unfollow => "👋",
            Self::EventCreated => "🎉",
            Self::EventReminder => "⏰",
            Self::Custom(_) => "🔔",
        }
    }
}

impl Default for NotificationKind {
    fn default() -> Self {
        Self::Custom("custom".to_string())
    }
}

impl From<String> for NotificationKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "new-event" => Self::NewEvent,
            "update-event" => Self::UpdateEvent,
            "hosting-event" => Self::HostingEvent,
            "rsvp" => Self::Rsvp,
            "rsvp-cancel" => Self::RsvpCancel,
            "follow" => Self::Follow,
            "unfollow" => Self::Unfollow,
            "event-created" => Self::EventCreated,
            "event-reminder" => Self::EventReminder,
            _ => Self::Custom(tag),
        }
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> Self {
        match kind {
            NotificationKind::Custom(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a notification happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTime {
    /// A point in time.
    At(DateTime<Utc>),
    /// Text already formatted by the server or client (e.g. `"just now"`).
    Relative(String),
}

impl NotificationTime {
    /// Renders the time relative to `now`.
    ///
    /// Under a minute (or in the future) is "just now", then minutes, hours
    /// and days. Pre-formatted strings are returned as they are.
    pub fn display(&self, now: DateTime<Utc>) -> String {
        match self {
            Self::Relative(text) => text.clone(),
            Self::At(at) => {
                let elapsed = now.signed_duration_since(*at);
                let minutes = elapsed.num_minutes();
                if minutes < 1 {
                    constants::JUST_NOW.to_string()
                } else if minutes < 60 {
                    ago(minutes, "minute")
                } else if elapsed.num_hours() < 24 {
                    ago(elapsed.num_hours(), "hour")
                } else {
                    ago(elapsed.num_days(), "day")
                }
            }
        }
    }
}

fn ago(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}

impl Serialize for NotificationTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::At(at) => serializer.serialize_str(&at.to_rfc3339()),
            Self::Relative(text) => serializer.serialize_str(text),
        }
    }
}

impl<'de> Deserialize<'de> for NotificationTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawTime {
            Text(String),
            Millis(i64),
            Float(f64),
        }

        match RawTime::deserialize(deserializer)? {
            RawTime::Text(text) => Ok(DateTime::parse_from_rfc3339(&text).map_or_else(
                |_| Self::Relative(text.clone()),
                |at| Self::At(at.with_timezone(&Utc)),
            )),
            RawTime::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .map(Self::At)
                .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}"))),
            RawTime::Float(ms) if ms.is_finite() => {
                #[allow(clippy::cast_possible_truncation, reason = "saturates, range checked below")]
                let whole = ms.round() as i64;
                Utc.timestamp_millis_opt(whole)
                    .single()
                    .map(Self::At)
                    .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}")))
            }
            RawTime::Float(ms) => Err(serde::de::Error::custom(format!("invalid timestamp: {ms}"))),
        }
    }
}

/// Which path a notification entered the store through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Delivered by the push channel or the offline backfill.
    #[default]
    Channel,
    /// Synthesised on the client in response to the user's own action.
    Local,
}

/// Screen a notification leads to when opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Event and organisation discovery.
    Discover,
    /// The user's RSVPed events.
    MyEvents,
    /// The user's profile and follow graph.
    Profile,
}

impl std::fmt::Display for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discover => write!(f, "discover"),
            Self::MyEvents => write!(f, "my-events"),
            Self::Profile => write!(f, "profile"),
        }
    }
}

/// Optional field that falls back to `None` on `null` or a value of the
/// wrong shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match T::deserialize(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            log::debug!("[NotificationChannel] Ignoring malformed notification field: {e}");
            Ok(None)
        }
    }
}

fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(lenient(deserializer)?.unwrap_or(false))
}

/// A single in-app notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Identifier used for dedupe and read-state addressing.
    pub id: NotificationId,
    /// Notification tag (wire field `type`).
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    /// Optional headline, used as the desktop alert title.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Human-readable text.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Organisation name, for synthesising text when `message` is absent.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub org_name: Option<String>,
    /// Event name, for synthesising text when `message` is absent.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    /// When it happened.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub time: Option<NotificationTime>,
    /// Whether the user has seen it. `null` reads as unread.
    #[serde(default, deserialize_with = "lenient_flag")]
    pub read: bool,
    /// Assigned by the store, never trusted from the wire.
    #[serde(rename = "source", skip_deserializing, default)]
    pub origin: Origin,
}

impl Notification {
    /// New unread local notification stamped "just now".
    pub fn local(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            id: NotificationId::generate(),
            kind,
            title: None,
            message: Some(message.into()),
            org_name: None,
            event_name: None,
            time: Some(NotificationTime::Relative(constants::JUST_NOW.to_string())),
            read: false,
            origin: Origin::Local,
        }
    }

    /// The user started following `target`.
    pub fn followed(target: &str) -> Self {
        Self::local(
            NotificationKind::Follow,
            format!("🎉 You're now following {target}!"),
        )
    }

    /// The user stopped following `target`.
    pub fn unfollowed(target: &str) -> Self {
        Self::local(NotificationKind::Unfollow, format!("You unfollowed {target}"))
    }

    /// The user's RSVP to `event_name` went through.
    pub fn rsvp_confirmed(event_name: &str) -> Self {
        Self::local(
            NotificationKind::Rsvp,
            format!("🎉 You're now registered for {event_name}!"),
        )
    }

    /// An RSVP (or RSVP cancellation, when `was_attending`) failed.
    pub fn rsvp_failed(event_name: &str, was_attending: bool) -> Self {
        let action = if was_attending {
            "cancel RSVP for"
        } else {
            "RSVP to"
        };
        Self::local(
            NotificationKind::Custom("error".to_string()),
            format!("Failed to {action} {event_name}. Please try again."),
        )
    }

    /// The user created an event titled `title`.
    pub fn event_created(title: &str) -> Self {
        Self::local(
            NotificationKind::EventCreated,
            format!("🎉 \"{title}\" has been created successfully!"),
        )
    }

    /// Text to show for this notification.
    ///
    /// Falls back to `"{orgName} - {eventName}"`, then the title, then a
    /// generic line.
    pub fn display_message(&self) -> String {
        if let Some(message) = non_empty(self.message.as_deref()) {
            return message.to_string();
        }

        match (
            non_empty(self.org_name.as_deref()),
            non_empty(self.event_name.as_deref()),
        ) {
            (Some(org), Some(event)) => format!("{org} - {event}"),
            (Some(name), None) | (None, Some(name)) => name.to_string(),
            (None, None) => non_empty(self.title.as_deref())
                .unwrap_or(constants::DEFAULT_ALERT_BODY)
                .to_string(),
        }
    }

    /// Relative time text; "just now" when the notification has no time.
    pub fn display_time(&self, now: DateTime<Utc>) -> String {
        self.time
            .as_ref()
            .map_or_else(|| constants::JUST_NOW.to_string(), |t| t.display(now))
    }

    /// Emoji for this notification's kind.
    pub fn icon(&self) -> &'static str {
        self.kind.icon()
    }

    /// Where opening this notification should navigate, if anywhere.
    pub fn target_screen(&self) -> Option<Screen> {
        match &self.kind {
            NotificationKind::NewEvent | NotificationKind::EventCreated => Some(Screen::Discover),
            NotificationKind::Rsvp | NotificationKind::EventReminder => Some(Screen::MyEvents),
            NotificationKind::Follow => Some(Screen::Profile),
            NotificationKind::Custom(tag) if tag == "new-follower" => Some(Screen::Profile),
            _ => None,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parses_server_payload() {
        let json = r#"{
            "id": 7,
            "type": "event-reminder",
            "orgName": "Drama Club",
            "eventName": "Spring Festival",
            "time": "2026-03-01T11:15:00Z",
            "extra": {"ignored": true}
        }"#;

        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(n.id, NotificationId::from(7));
        assert_eq!(n.kind, NotificationKind::EventReminder);
        assert!(!n.read);
        assert_eq!(n.origin, Origin::Channel);
        assert_eq!(n.display_message(), "Drama Club - Spring Festival");
        assert_eq!(n.display_time(now()), "45 minutes ago");
    }

    #[test]
    fn test_source_field_is_not_trusted() {
        let n: Notification =
            serde_json::from_str(r#"{"id": "a", "type": "rsvp", "source": "local"}"#).unwrap();
        assert_eq!(n.origin, Origin::Channel);
    }

    #[test]
    fn test_missing_id_is_rejected() {
        assert!(serde_json::from_str::<Notification>(r#"{"type": "rsvp"}"#).is_err());
        assert!(serde_json::from_str::<Notification>(r#""rsvp""#).is_err());
        assert!(serde_json::from_str::<Notification>(r#"{"id": {"nested": 1}}"#).is_err());
    }

    #[test]
    fn test_unknown_and_missing_kind() {
        let n: Notification =
            serde_json::from_str(r#"{"id": "x", "type": "new-follower"}"#).unwrap();
        assert_eq!(n.kind, NotificationKind::Custom("new-follower".to_string()));
        assert_eq!(n.icon(), "🔔");
        assert_eq!(n.target_screen(), Some(Screen::Profile));

        let n: Notification = serde_json::from_str(r#"{"id": "y"}"#).unwrap();
        assert_eq!(n.kind.as_str(), "custom");
    }

    #[test]
    fn test_kind_tags_survive_serialization() {
        let n = Notification::local(NotificationKind::RsvpCancel, "cancelled");
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "rsvp-cancel");
        assert_eq!(json["source"], "local");
        assert_eq!(json["time"], "just now");
    }

    #[test]
    fn test_time_representations() {
        let relative = NotificationTime::Relative("yesterday".to_string());
        assert_eq!(relative.display(now()), "yesterday");

        let at = |d: Duration| NotificationTime::At(now() - d);
        assert_eq!(at(Duration::seconds(20)).display(now()), "just now");
        assert_eq!(at(Duration::minutes(1)).display(now()), "1 minute ago");
        assert_eq!(at(Duration::hours(3)).display(now()), "3 hours ago");
        assert_eq!(at(Duration::days(2)).display(now()), "2 days ago");
        assert_eq!(at(-Duration::minutes(5)).display(now()), "just now");

        let millis: NotificationTime =
            serde_json::from_str(&(now() - Duration::hours(1)).timestamp_millis().to_string())
                .unwrap();
        assert_eq!(millis.display(now()), "1 hour ago");

        let float: NotificationTime = serde_json::from_str("1.7e12").unwrap();
        assert_eq!(
            float,
            NotificationTime::At(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap())
        );
    }

    #[test]
    fn test_malformed_optional_fields_are_dropped() {
        let n: Notification = serde_json::from_str(
            r#"{"id": 7, "title": 5, "message": "Doors open", "time": {"x": 1}, "read": null}"#,
        )
        .unwrap();
        assert_eq!(n.id, NotificationId::from("7"));
        assert_eq!(n.title, None);
        assert_eq!(n.message.as_deref(), Some("Doors open"));
        assert_eq!(n.time, None);
        assert!(!n.read);

        let n: Notification =
            serde_json::from_str(r#"{"id": 8, "time": 1.7e12, "read": "yes", "orgName": null}"#)
                .unwrap();
        assert!(matches!(n.time, Some(NotificationTime::At(_))));
        assert!(!n.read);
        assert_eq!(n.org_name, None);

        let n: Notification = serde_json::from_str(r#"{"id": 9, "read": true}"#).unwrap();
        assert!(n.read);
    }

    #[test]
    fn test_display_message_fallbacks() {
        let mut n: Notification = serde_json::from_str(r#"{"id": 1, "message": ""}"#).unwrap();
        assert_eq!(n.display_message(), "New activity alert!");

        n.event_name = Some("Hackathon".to_string());
        assert_eq!(n.display_message(), "Hackathon");

        n.message = Some("Doors open at 6".to_string());
        assert_eq!(n.display_message(), "Doors open at 6");
        assert_eq!(n.display_time(now()), "just now");
    }

    #[test]
    fn test_local_constructors() {
        let followed = Notification::followed("drama-club");
        assert_eq!(followed.origin, Origin::Local);
        assert_eq!(followed.kind, NotificationKind::Follow);
        assert_eq!(
            followed.display_message(),
            "🎉 You're now following drama-club!"
        );

        let failed = Notification::rsvp_failed("Spring Festival", true);
        assert_eq!(failed.kind.as_str(), "error");
        assert_eq!(
            failed.display_message(),
            "Failed to cancel RSVP for Spring Festival. Please try again."
        );

        assert_ne!(
            Notification::unfollowed("a").id,
            Notification::unfollowed("a").id
        );
    }

    #[test]
    fn test_target_screens() {
        let screen = |kind| Notification::local(kind, "x").target_screen();
        assert_eq!(screen(NotificationKind::NewEvent), Some(Screen::Discover));
        assert_eq!(screen(NotificationKind::EventCreated), Some(Screen::Discover));
        assert_eq!(screen(NotificationKind::EventReminder), Some(Screen::MyEvents));
        assert_eq!(screen(NotificationKind::Follow), Some(Screen::Profile));
        assert_eq!(screen(NotificationKind::Unfollow), None);
        assert_eq!(Screen::MyEvents.to_string(), "my-events");
    }
}
