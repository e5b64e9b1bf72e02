//! Account credentials and the authenticated session.
//!
//! Two stages of authentication state live here:
//!
//! * [`Credentials`]: the username and password read from the secrets
//!   file, used once to log in (or to derive Subsonic tokens locally).
//! * [`Session`]: the server's login response, carrying the Navidrome
//!   bearer token plus the `(token, salt)` pair that signs Subsonic REST
//!   calls.
//!
//! Both are debug-redacted so that verbose logging never leaks secrets.
//!
//! A session can also be constructed without the native login endpoint:
//! the Subsonic scheme defines `t = md5(password + s)` over a random salt,
//! which [`Session::with_derived_token`] computes locally.

use std::{fs, path::Path};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use veil::Redact;

use crate::error::{Error, Result};

/// Largest credentials-shaped file this module will parse.
///
/// Secrets and session files are tiny; anything larger is malformed and
/// refusing it early avoids reading attacker-sized files into memory.
const MAX_SECRETS_SIZE: u64 = 4096;

/// Number of hex characters in a locally generated Subsonic salt.
///
/// The scheme requires at least six; twelve matches what the reference
/// web client sends.
const SALT_LENGTH: usize = 12;

/// Account credentials as read from the secrets file.
#[derive(Clone, Deserialize, Redact)]
pub struct Credentials {
    pub username: String,
    #[redact]
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Contents of the secrets file: where to connect and as whom.
#[derive(Clone, Deserialize, Redact)]
pub struct Secrets {
    pub server: url::Url,
    pub username: String,
    #[redact]
    pub password: String,
}

impl Secrets {
    /// Loads the secrets file.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be read, is larger than
    /// [`MAX_SECRETS_SIZE`], or does not parse as TOML with the expected
    /// fields.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        check_size(path)?;
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(Into::into)
    }

    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.username, &self.password)
    }
}

/// An authenticated session against a Navidrome server.
///
/// Mirrors the native login response. The `token` authorizes the Navidrome
/// API (`x-nd-authorization` header); `subsonic_token` and `subsonic_salt`
/// sign Subsonic REST query strings.
#[derive(Clone, Deserialize, Serialize, Redact)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub name: String,
    pub username: String,
    #[redact]
    pub token: String,
    #[redact]
    pub subsonic_token: String,
    pub subsonic_salt: String,
}

impl Session {
    /// Builds a session by deriving the Subsonic token pair locally.
    ///
    /// Used when the native login endpoint is unavailable. The resulting
    /// session has no bearer token, so only the Subsonic REST surface is
    /// reachable with it.
    #[must_use]
    pub fn with_derived_token(credentials: &Credentials) -> Self {
        let salt = random_salt();
        let token = derive_token(&credentials.password, &salt);

        Self {
            id: String::new(),
            is_admin: false,
            name: credentials.username.clone(),
            username: credentials.username.clone(),
            token: String::new(),
            subsonic_token: token,
            subsonic_salt: salt,
        }
    }

    /// Whether this session can authorize Navidrome native API calls.
    #[must_use]
    pub fn has_bearer_token(&self) -> bool {
        !self.token.is_empty()
    }

    /// Restores a previously saved session.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        check_size(path)?;
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(Into::into)
    }

    /// Persists the session for the next run.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be serialized or written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents).map_err(Into::into)
    }
}

fn check_size(path: &Path) -> Result<()> {
    let attributes = fs::metadata(path)?;
    if attributes.len() > MAX_SECRETS_SIZE {
        return Err(Error::invalid_argument(format!(
            "{} is too large to be a secrets file",
            path.display()
        )));
    }
    Ok(())
}

/// Computes the Subsonic authentication token: `md5(password + salt)`,
/// lowercase hex.
#[must_use]
pub fn derive_token(password: &str, salt: &str) -> String {
    use std::fmt::Write;

    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());

    let digest = hasher.finalize();
    let mut token = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(token, "{byte:02x}");
    }
    token
}

fn random_salt() -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    (0..SALT_LENGTH)
        .map(|_| HEX[fastrand::usize(..HEX.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_token_matches_subsonic_reference_vector() {
        // Worked example from the Subsonic API documentation.
        assert_eq!(
            derive_token("sesame", "c19b2d"),
            "26719a1196d2a940705a59634eb18eab"
        );
    }

    #[test]
    fn derived_session_has_no_bearer_token() {
        let session = Session::with_derived_token(&Credentials::new("alice", "sesame"));
        assert!(!session.has_bearer_token());
        assert_eq!(session.subsonic_salt.len(), SALT_LENGTH);
        assert_eq!(
            session.subsonic_token,
            derive_token("sesame", &session.subsonic_salt)
        );
    }

    #[test]
    fn login_response_deserializes() {
        let body = r#"{
            "id": "9c3a8f",
            "isAdmin": false,
            "name": "Alice",
            "username": "alice",
            "token": "bearer-token",
            "subsonicSalt": "c19b2d",
            "subsonicToken": "26719a1196d2a940705a59634eb18eab"
        }"#;
        let session: Session = serde_json::from_str(body).unwrap();
        assert_eq!(session.username, "alice");
        assert!(session.has_bearer_token());
        assert_eq!(session.subsonic_salt, "c19b2d");
    }

    #[test]
    fn debug_redacts_secrets() {
        let session = Session::with_derived_token(&Credentials::new("alice", "sesame"));
        let debug = format!("{session:?}");
        assert!(!debug.contains(&session.subsonic_token));
    }
}
