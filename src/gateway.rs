//! Navidrome native API gateway.
//!
//! The native API (as opposed to the Subsonic REST compatibility surface in
//! [`crate::subsonic`]) handles login and the server-persisted play queue.
//! Requests are authorized with the session bearer token in the
//! `x-nd-authorization` header.

use std::time::Duration;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::Deserialize;

use crate::{
    config::Config,
    error::{Error, Result},
    http::Client as HttpClient,
    session::Session,
    track::{Track, TrackId},
};

/// Header carrying the Navidrome bearer token.
///
/// Navidrome uses its own header rather than `Authorization` so that the
/// Subsonic surface, which authenticates via query parameters, is not
/// affected by proxies stripping auth headers.
const ND_AUTHORIZATION: &str = "x-nd-authorization";

/// Path of the native login endpoint.
const LOGIN_PATH: &str = "auth/login";

/// Path of the persisted play queue endpoint.
const QUEUE_PATH: &str = "api/queue";

pub struct Gateway {
    http_client: HttpClient,
    config: Config,
    session: Option<Session>,
}

/// One entry of the server-persisted play queue.
///
/// Field-for-field what Navidrome serializes for a queue item; only the
/// fields the player consumes are typed, the rest are ignored.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: TrackId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub album_id: String,
    #[serde(default)]
    pub artist_id: String,
    /// Track length in seconds. Navidrome serializes fractional seconds.
    #[serde(default)]
    pub duration: f64,
    /// Saved per-track resume offset in seconds, if the user bookmarked one.
    #[serde(default)]
    pub bookmark_position: f64,
}

impl From<QueueItem> for Track {
    fn from(item: QueueItem) -> Self {
        Track::new(
            item.id,
            item.title,
            item.artist,
            item.album,
            item.album_id,
            Duration::from_secs_f64(item.duration.max(0.0)),
        )
    }
}

/// The server-persisted play queue.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayQueue {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    /// Index of the current item within `items`.
    #[serde(default)]
    pub current: i64,
    /// Elapsed position within the current item, in milliseconds.
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub changed_by: String,
    #[serde(default)]
    pub items: Vec<QueueItem>,
}

impl PlayQueue {
    /// Elapsed position within the current item.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.position)
    }

    /// Index of the current item, validated against the item list.
    ///
    /// Falls back to the first item when the server reports an index that
    /// no longer addresses the list.
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        if self.items.is_empty() {
            return None;
        }
        usize::try_from(self.current)
            .ok()
            .filter(|index| *index < self.items.len())
            .or(Some(0))
    }
}

impl Gateway {
    /// Creates a gateway for the configured server.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = HttpClient::new(config)?;

        Ok(Self {
            http_client,
            config: config.clone(),
            session: None,
        })
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Installs a previously saved session.
    pub fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    fn bearer(&self) -> Result<HeaderValue> {
        let session = self
            .session
            .as_ref()
            .filter(|session| session.has_bearer_token())
            .ok_or_else(|| Error::unauthenticated("no active session"))?;

        HeaderValue::from_str(&format!("Bearer {}", session.token))
            .map_err(|e| Error::internal(e.to_string()))
    }

    /// Logs in with the configured credentials and stores the session.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the server rejects the credentials or the response
    /// cannot be parsed.
    pub async fn login(&mut self) -> Result<&Session> {
        let url = self.config.endpoint(LOGIN_PATH)?;
        let body = serde_json::json!({
            "username": self.config.credentials.username,
            "password": self.config.credentials.password,
        });

        let mut request = self.http_client.post(url, body.to_string());
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = self.http_client.execute(request).await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::unauthenticated("username or password rejected"));
        }
        let response = response.error_for_status()?;

        let session = response.json::<Session>().await?;
        info!("logged in to {} as {}", self.config.server, session.username);

        Ok(self.session.insert(session))
    }

    /// Fetches the server-persisted play queue.
    ///
    /// # Errors
    ///
    /// Returns `Err` if no session is active, the request fails, or the
    /// response cannot be parsed.
    pub async fn queue(&self) -> Result<PlayQueue> {
        let bearer = self.bearer()?;
        let url = self.config.endpoint(QUEUE_PATH)?;

        let mut request = self.http_client.get(url);
        request.headers_mut().insert(ND_AUTHORIZATION, bearer);

        let response = self.http_client.execute(request).await?;
        let response = response.error_for_status()?;

        let queue = response.json::<PlayQueue>().await?;
        debug!(
            "restored queue: {} items, current {}, position {:?}",
            queue.items.len(),
            queue.current,
            queue.elapsed()
        );

        Ok(queue)
    }

    /// Clears the server-persisted play queue.
    ///
    /// Failure is returned to the caller: local queue state must not be
    /// cleared when the server still holds the old queue.
    ///
    /// # Errors
    ///
    /// Returns `Err` if no session is active or the delete fails.
    pub async fn clear_queue(&self) -> Result<()> {
        let bearer = self.bearer()?;
        let url = self.config.endpoint(QUEUE_PATH)?;

        let mut request = self.http_client.delete(url);
        request.headers_mut().insert(ND_AUTHORIZATION, bearer);

        let response = self.http_client.execute(request).await?;
        response.error_for_status()?;

        info!("cleared server play queue");
        Ok(())
    }
}
