//! Application-wide constants for campus-connect.
//!
//! Centralizes delays, timeouts and default endpoints so the channel,
//! API client and configuration layer agree on the same values.
//!
//! # Categories
//!
//! - **Timeouts**: Network and operation timeouts
//! - **Reconnect**: Channel retry behaviour
//! - **Endpoints**: Default server locations
//! - **Presentation**: Fallback text for alerts

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for API calls.
///
/// Applies to the login and offline backfill requests.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Reconnect
// ============================================================================

/// Fixed delay between a channel disconnect and the next connect attempt.
///
/// Flat retry, no exponential growth.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Shortest reconnect delay honoured. Smaller values are raised to this.
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// WebSocket close code sent when the client closes the channel on purpose.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close reason sent when the session is detached.
pub const CLOSE_REASON_LOGOUT: &str = "User logged out";

/// Upper bound on sending the close frame during teardown.
///
/// A stalled peer must not hold up logout.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the arrival broadcast before slow subscribers start lagging.
pub const ARRIVAL_BUFFER: usize = 256;

// ============================================================================
// Endpoints
// ============================================================================

/// Default base URL of the REST API.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Default base URL of the notification WebSocket server.
pub const DEFAULT_WS_URL: &str = "ws://localhost:3000";

// ============================================================================
// Presentation
// ============================================================================

/// Application name, used as the alert title when a notification has none.
pub const APP_NAME: &str = "Campus Connect";

/// Alert body used when a notification carries no message.
pub const DEFAULT_ALERT_BODY: &str = "New activity alert!";

/// Display time for notifications without a timestamp.
pub const JUST_NOW: &str = "just now";
