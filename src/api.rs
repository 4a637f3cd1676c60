//! REST client for the campus API.
//!
//! Only the two calls the notification subsystem depends on live here:
//! login (to obtain a [`Session`]) and the offline backfill. The rest of
//! the platform API (events, RSVPs, follow graph, search) is consumed
//! elsewhere.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

use crate::notification::Notification;
use crate::session::Session;

/// Source of notifications queued while the client was disconnected.
#[async_trait]
pub trait OfflineFetcher: Send + Sync + std::fmt::Debug {
    /// Returns the notifications queued for `session`'s user.
    async fn fetch_offline_notifications(&self, session: &Session) -> Result<Vec<Notification>>;
}

/// Credentials for `POST /users/login`.
#[derive(Serialize, Clone)]
pub struct LoginRequest {
    /// Account username.
    pub username: String,
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Body returned by a successful login.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    /// Id of the authenticated user.
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    /// Bearer token for subsequent requests.
    #[serde(default)]
    pub token: Option<String>,
    /// Optional server message.
    #[serde(default)]
    pub message: Option<String>,
}

impl LoginResponse {
    /// Turns the response into a session. A response without a token is
    /// not a completed login.
    pub fn into_session(self) -> Result<Session> {
        let Some(token) = self.token.filter(|t| !t.is_empty()) else {
            anyhow::bail!(
                "login for user {} did not return a token{}",
                self.user_id,
                self.message.map(|m| format!(": {m}")).unwrap_or_default()
            );
        };
        let session = Session::new(self.user_id, Some(token));
        if !session.is_authenticated() {
            anyhow::bail!("login response did not include a user id");
        }
        Ok(session)
    }
}

#[derive(Deserialize, Debug, Default)]
struct OfflineNotificationsResponse {
    #[serde(default)]
    notifications: Vec<serde_json::Value>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

/// HTTP client for the campus REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Creates a client with the given per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self::with_client(client, base_url))
    }

    /// Creates a client with a pre-configured HTTP client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Returns the API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins path segments onto the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("invalid API base URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("API base URL cannot have a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Adds the bearer token and `X-User-ID` headers for `session`.
    fn authorized(request: RequestBuilder, session: &Session) -> RequestBuilder {
        let request = request.header("X-User-ID", &session.user_id);
        match &session.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Logs in with `POST /users/login`.
    ///
    /// On failure the server's `message` field is included in the error.
    pub async fn authenticate_user(&self, login: &LoginRequest) -> Result<LoginResponse> {
        let url = self.endpoint(&["users", "login"])?;

        let response = self
            .client
            .post(url)
            .json(login)
            .send()
            .await
            .context("login request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or_else(|| "Login failed. Please check your credentials.".to_string());
            anyhow::bail!("{message} ({status})");
        }

        response
            .json::<LoginResponse>()
            .await
            .context("invalid login response")
    }

    /// Fetches queued notifications with `GET /notifications/{userId}`.
    ///
    /// Entries that do not parse as notifications are skipped with a warning.
    pub async fn fetch_offline_notifications(&self, session: &Session) -> Result<Vec<Notification>> {
        let url = self.endpoint(&["notifications", &session.user_id])?;

        let response = Self::authorized(self.client.get(url), session)
            .send()
            .await
            .context("offline notifications request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch offline notifications: {}", response.status());
        }

        let body: OfflineNotificationsResponse = response
            .json()
            .await
            .context("invalid offline notifications response")?;

        let notifications = body
            .notifications
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<Notification>(raw) {
                Ok(notification) => Some(notification),
                Err(e) => {
                    log::warn!("[ApiClient] Skipping malformed offline notification: {e}");
                    None
                }
            })
            .collect();

        Ok(notifications)
    }
}

#[async_trait]
impl OfflineFetcher for ApiClient {
    async fn fetch_offline_notifications(&self, session: &Session) -> Result<Vec<Notification>> {
        ApiClient::fetch_offline_notifications(self, session).await
    }
}
