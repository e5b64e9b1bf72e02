//! Subsonic REST compatibility surface.
//!
//! Navidrome serves media through the Subsonic protocol: every call carries
//! the signed query parameters `u` (username), `t` (token), `s` (salt),
//! `v` (API version), `c` (client name) and `f` (response format). This
//! module resolves stream and cover art URLs and submits scrobbles.
//!
//! URL resolution is pure: given the same session and track id it always
//! produces the same URL, and it performs no I/O. Only [`Subsonic::scrobble`]
//! and [`Subsonic::ping`] touch the network.

use serde::Deserialize;
use url::Url;

use crate::{
    config::{Config, API_VERSION},
    error::{Error, Result},
    http::Client as HttpClient,
    session::Session,
    track::TrackId,
};

/// Response format requested from the server.
const FORMAT: &str = "json";

/// Subsonic error code for wrong username or password.
const CODE_WRONG_CREDENTIALS: u32 = 40;
/// Subsonic error code for an operation the user is not authorized for.
const CODE_NOT_AUTHORIZED: u32 = 50;
/// Subsonic error code for missing data.
const CODE_NOT_FOUND: u32 = 70;

pub struct Subsonic {
    http_client: HttpClient,
    config: Config,
    session: Option<Session>,
}

/// Envelope wrapping every Subsonic response.
#[derive(Clone, Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "subsonic-response")]
    subsonic_response: ResponseBody,
}

#[derive(Clone, Debug, Deserialize)]
struct ResponseBody {
    status: ResponseStatus,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum ResponseStatus {
    Ok,
    Failed,
}

#[derive(Clone, Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    message: String,
}

impl From<ApiError> for Error {
    fn from(e: ApiError) -> Self {
        let detail = format!("subsonic error {}: {}", e.code, e.message);
        match e.code {
            CODE_WRONG_CREDENTIALS => Error::unauthenticated(detail),
            CODE_NOT_AUTHORIZED => Error::permission_denied(detail),
            CODE_NOT_FOUND => Error::not_found(detail),
            _ => Error::failed_precondition(detail),
        }
    }
}

impl Subsonic {
    /// Creates a Subsonic client for the configured server.
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

    pub fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::unauthenticated("no active session"))
    }

    /// Builds an endpoint URL carrying the signed auth parameters.
    fn signed_endpoint(&self, view: &str) -> Result<Url> {
        let session = self.session()?;
        let mut url = self.config.endpoint(&format!("rest/{view}"))?;

        url.query_pairs_mut()
            .append_pair("u", &session.username)
            .append_pair("t", &session.subsonic_token)
            .append_pair("s", &session.subsonic_salt)
            .append_pair("v", API_VERSION)
            .append_pair("c", &self.config.client_name)
            .append_pair("f", FORMAT);

        Ok(url)
    }

    /// Resolves the authenticated stream URL for a track.
    ///
    /// # Errors
    ///
    /// Returns `Err` with kind `Unauthenticated` if no session is active.
    pub fn stream_url(&self, track: &TrackId, max_bit_rate: Option<u32>) -> Result<Url> {
        let mut url = self.signed_endpoint("stream.view")?;
        url.query_pairs_mut().append_pair("id", track.as_str());
        if let Some(kbps) = max_bit_rate {
            url.query_pairs_mut()
                .append_pair("maxBitRate", &kbps.to_string());
        }
        Ok(url)
    }

    /// Resolves the cover art URL for an art identifier.
    ///
    /// # Errors
    ///
    /// Returns `Err` with kind `Unauthenticated` if no session is active.
    pub fn cover_art_url(&self, art_id: &str, size: Option<u32>) -> Result<Url> {
        let mut url = self.signed_endpoint("getCoverArt.view")?;
        url.query_pairs_mut().append_pair("id", art_id);
        if let Some(pixels) = size {
            url.query_pairs_mut()
                .append_pair("size", &pixels.to_string());
        }
        Ok(url)
    }

    /// Submits a scrobble for a track.
    ///
    /// `submission = false` registers the track as "now playing";
    /// `submission = true` records a completed play.
    ///
    /// # Errors
    ///
    /// Returns `Err` if no session is active, the request fails, or the
    /// server reports a failed status.
    pub async fn scrobble(&self, track: &TrackId, submission: bool) -> Result<()> {
        let mut url = self.signed_endpoint("scrobble.view")?;
        url.query_pairs_mut()
            .append_pair("id", track.as_str())
            .append_pair("submission", if submission { "true" } else { "false" });

        self.checked(url).await
    }

    /// Verifies connectivity and credentials against the server.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the server is unreachable or rejects the session.
    pub async fn ping(&self) -> Result<()> {
        let url = self.signed_endpoint("ping.view")?;
        self.checked(url).await
    }

    /// Executes a GET and unwraps the Subsonic response envelope.
    async fn checked(&self, url: Url) -> Result<()> {
        let request = self.http_client.get(url);
        let response = self.http_client.execute(request).await?;
        let response = response.error_for_status()?;

        let envelope = response.json::<Envelope>().await?;
        let body = envelope.subsonic_response;
        if body.status == ResponseStatus::Failed {
            return Err(body
                .error
                .map_or_else(|| Error::unknown("request failed"), Into::into));
        }

        Ok(())
    }
}

/// The player's view of the media server, backed by the Subsonic surface.
///
/// Stream URL resolution happens inline; scrobbles are dispatched as
/// fire-and-forget tasks with failures logged, never propagated into
/// playback.
pub struct ServerLink {
    subsonic: std::sync::Arc<Subsonic>,
}

impl ServerLink {
    #[must_use]
    pub fn new(subsonic: std::sync::Arc<Subsonic>) -> Self {
        Self { subsonic }
    }

    fn spawn_scrobble(&self, track: &TrackId, submission: bool) {
        let subsonic = std::sync::Arc::clone(&self.subsonic);
        let track = track.clone();
        tokio::spawn(async move {
            if let Err(e) = subsonic.scrobble(&track, submission).await {
                warn!("scrobble (submission={submission}) for {track} failed: {e}");
            }
        });
    }
}

impl crate::player::MediaServer for ServerLink {
    fn stream_url(&self, track: &TrackId) -> Result<Url> {
        self.subsonic.stream_url(track, None)
    }

    fn scrobble_now_playing(&self, track: &TrackId) {
        self.spawn_scrobble(track, false);
    }

    fn scrobble_submission(&self, track: &TrackId) {
        self.spawn_scrobble(track, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Credentials;

    fn client_with_session() -> Subsonic {
        let config = Config::new(
            Url::parse("https://music.example.com").unwrap(),
            Credentials::new("alice", "sesame"),
        );
        let mut subsonic = Subsonic::new(&config).unwrap();
        let session: Session = serde_json::from_str(
            r#"{
                "username": "alice",
                "token": "bearer",
                "subsonicSalt": "c19b2d",
                "subsonicToken": "26719a1196d2a940705a59634eb18eab"
            }"#,
        )
        .unwrap();
        subsonic.set_session(session);
        subsonic
    }

    fn query_pairs(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn stream_url_is_signed() {
        let subsonic = client_with_session();
        let url = subsonic.stream_url(&TrackId::from("s1"), None).unwrap();

        assert!(url.path().ends_with("/rest/stream.view"));
        let pairs = query_pairs(&url);
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("u"), Some("alice"));
        assert_eq!(get("t"), Some("26719a1196d2a940705a59634eb18eab"));
        assert_eq!(get("s"), Some("c19b2d"));
        assert_eq!(get("v"), Some(API_VERSION));
        assert_eq!(get("f"), Some("json"));
        assert_eq!(get("id"), Some("s1"));
        assert_eq!(get("maxBitRate"), None);
    }

    #[test]
    fn stream_url_is_deterministic() {
        let subsonic = client_with_session();
        let track = TrackId::from("s1");
        assert_eq!(
            subsonic.stream_url(&track, None).unwrap(),
            subsonic.stream_url(&track, None).unwrap()
        );
    }

    #[test]
    fn cover_art_url_carries_size() {
        let subsonic = client_with_session();
        let url = subsonic.cover_art_url("al1", Some(300)).unwrap();
        assert!(url.path().ends_with("/rest/getCoverArt.view"));
        assert!(query_pairs(&url).contains(&("size".to_owned(), "300".to_owned())));
    }

    #[test]
    fn unauthenticated_without_session() {
        let config = Config::new(
            Url::parse("https://music.example.com").unwrap(),
            Credentials::new("alice", "sesame"),
        );
        let subsonic = Subsonic::new(&config).unwrap();
        let err = subsonic.stream_url(&TrackId::from("s1"), None).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Unauthenticated);
    }

    #[test]
    fn failed_envelope_maps_error_codes() {
        let body = r#"{
            "subsonic-response": {
                "status": "failed",
                "version": "1.16.1",
                "error": { "code": 40, "message": "Wrong username or password" }
            }
        }"#;
        let envelope: Envelope = serde_json::from_str(body).unwrap();
        let error = Error::from(envelope.subsonic_response.error.unwrap());
        assert_eq!(error.kind, crate::error::ErrorKind::Unauthenticated);
    }
}
