//! Client configuration.
//!
//! [`Config`] collects everything the HTTP clients and the player need to
//! identify themselves to a Navidrome server: the server base URL, the
//! Subsonic client name reported in the `c` query parameter, and the
//! `User-Agent` assembled from the crate metadata and the host OS.

use url::Url;

use crate::session::Credentials;

/// Subsonic API version spoken by this client.
pub const API_VERSION: &str = "1.16.1";

#[derive(Clone, Debug)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,

    /// Client name reported to the server in the Subsonic `c` parameter
    /// and in the Navidrome queue's `changedBy` field.
    pub client_name: String,

    /// Base URL of the Navidrome server, e.g. `https://music.example.com`.
    pub server: Url,

    pub user_agent: String,

    pub credentials: Credentials,
}

impl Config {
    #[must_use]
    pub fn new(server: Url, credentials: Credentials) -> Self {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();

        // Additional `User-Agent` string checks on top of `reqwest::HeaderValue`.
        let illegal_chars = |chr| chr == '/' || chr == ';';
        if app_name.is_empty()
            || app_name.contains(illegal_chars)
            || app_version.is_empty()
            || app_version.contains(illegal_chars)
        {
            panic!("application name and/or version invalid (\"{app_name}\"; \"{app_version}\")");
        }

        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version().unwrap_or_else(|| String::from("0"));

        let user_agent = format!("{app_name}/{app_version} (Rust; {os_name}/{os_version})");
        trace!("user agent: {user_agent}");

        Self {
            client_name: app_name.clone(),
            app_name,
            app_version,
            server,
            user_agent,
            credentials,
        }
    }

    /// Resolves a path relative to the server base URL.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the joined path is not a valid URL.
    pub fn endpoint(&self, path: &str) -> crate::error::Result<Url> {
        self.server.join(path).map_err(Into::into)
    }
}
