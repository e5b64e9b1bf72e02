//! Error handling for subtone.
//!
//! A single [`struct@Error`] type carries an [`ErrorKind`] category plus the
//! underlying error detail. Categories follow the gRPC status code catalogue,
//! which maps cleanly onto both the HTTP failures of the Navidrome and
//! Subsonic APIs and the local audio failures of the playback engine.
//!
//! # Example
//!
//! ```rust
//! use subtone::error::{Error, ErrorKind, Result};
//!
//! fn stream_url_for(track: &str) -> Result<String> {
//!     if track.is_empty() {
//!         return Err(Error::invalid_argument("empty track id"));
//!     }
//!     Err(Error::unauthenticated("no active session"))
//! }
//! ```

#![allow(clippy::enum_glob_use)]

use std::fmt;
use thiserror::Error;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

/// Standard result type for subtone operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories based on gRPC status codes.
///
/// Each variant maps to a distinct failure category with a standard message.
/// See [gRPC status codes](https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto)
/// for the original definitions.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u32)]
pub enum ErrorKind {
    /// Operation was cancelled, typically by the caller.
    #[error("operation was cancelled")]
    Cancelled = 1,

    /// Failure that fits no other category.
    #[error("unknown error")]
    Unknown = 2,

    /// Caller specified an invalid argument.
    #[error("invalid argument specified")]
    InvalidArgument = 3,

    /// Deadline expired before the operation could complete.
    #[error("operation timed out")]
    DeadlineExceeded = 4,

    /// A requested entity was not found.
    #[error("not found")]
    NotFound = 5,

    /// Caller does not have permission for the operation.
    #[error("permission denied")]
    PermissionDenied = 7,

    /// No valid authentication credentials for the operation.
    #[error("no valid authentication credentials")]
    Unauthenticated = 16,

    /// Some resource has been exhausted, e.g. a server-side quota.
    #[error("resource has been exhausted")]
    ResourceExhausted = 8,

    /// System is not in a state required for the operation.
    #[error("invalid state")]
    FailedPrecondition = 9,

    /// Operation was aborted mid-flight.
    #[error("operation aborted")]
    Aborted = 10,

    /// Operation is not implemented or supported.
    #[error("not implemented")]
    Unimplemented = 12,

    /// Internal invariant broken.
    #[error("internal error")]
    Internal = 13,

    /// Service is currently unavailable; retrying later may help.
    #[error("service unavailable")]
    Unavailable = 14,

    /// Unrecoverable data loss or corruption.
    #[error("unrecoverable data loss or corruption")]
    DataLoss = 15,
}

macro_rules! error_constructor {
    ($(#[$meta:meta])* $name:ident, $kind:ident) => {
        $(#[$meta])*
        pub fn $name<E>(error: E) -> Self
        where
            E: Into<Box<dyn std::error::Error + Send + Sync>>,
        {
            Self {
                kind: ErrorKind::$kind,
                error: error.into(),
            }
        }
    };
}

impl Error {
    /// Creates a new error with the specified kind and details.
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Attempts to downcast the underlying error to a concrete type.
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    error_constructor!(
        /// Creates an error for operations interrupted mid-flight.
        aborted,
        Aborted
    );
    error_constructor!(
        /// Creates an error for cancelled operations.
        cancelled,
        Cancelled
    );
    error_constructor!(
        /// Creates an error for corrupted or truncated data.
        data_loss,
        DataLoss
    );
    error_constructor!(
        /// Creates an error for operations that exceeded their deadline.
        deadline_exceeded,
        DeadlineExceeded
    );
    error_constructor!(
        /// Creates an error for operations attempted in the wrong state.
        failed_precondition,
        FailedPrecondition
    );
    error_constructor!(
        /// Creates an error for broken internal invariants.
        internal,
        Internal
    );
    error_constructor!(
        /// Creates an error for invalid caller-supplied arguments.
        invalid_argument,
        InvalidArgument
    );
    error_constructor!(
        /// Creates an error for entities that could not be found.
        not_found,
        NotFound
    );
    error_constructor!(
        /// Creates an error for operations the caller may not perform.
        permission_denied,
        PermissionDenied
    );
    error_constructor!(
        /// Creates an error for exhausted quotas or resources.
        resource_exhausted,
        ResourceExhausted
    );
    error_constructor!(
        /// Creates an error for operations without valid credentials.
        unauthenticated,
        Unauthenticated
    );
    error_constructor!(
        /// Creates an error for services that are temporarily unreachable.
        unavailable,
        Unavailable
    );
    error_constructor!(
        /// Creates an error for unsupported operations.
        unimplemented,
        Unimplemented
    );
    error_constructor!(
        /// Creates an error for failures that fit no other category.
        unknown,
        Unknown
    );
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Formats the error as "{kind}: {details}".
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

/// Maps standard IO errors to their logical equivalents.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            NotFound => Self::not_found(err),
            PermissionDenied => Self::permission_denied(err),
            AddrNotAvailable | ConnectionRefused | NotConnected => Self::unavailable(err),
            BrokenPipe | ConnectionReset | ConnectionAborted => Self::aborted(err),
            Interrupted | WouldBlock => Self::cancelled(err),
            UnexpectedEof => Self::data_loss(err),
            TimedOut => Self::deadline_exceeded(err),
            InvalidInput | InvalidData => Self::invalid_argument(err),
            _ => Self::unknown(err),
        }
    }
}

/// Maps HTTP client errors based on their nature.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::deadline_exceeded(err);
        }

        if err.is_connect() || err.is_redirect() {
            return Self::unavailable(err);
        }

        if let Some(status) = err.status() {
            return match status {
                reqwest::StatusCode::UNAUTHORIZED => Self::unauthenticated(err),
                reqwest::StatusCode::FORBIDDEN => Self::permission_denied(err),
                reqwest::StatusCode::NOT_FOUND => Self::not_found(err),
                reqwest::StatusCode::TOO_MANY_REQUESTS => Self::resource_exhausted(err),
                _ => Self::failed_precondition(err),
            };
        }

        if err.is_body() {
            return Self::data_loss(err);
        }

        if err.is_decode() {
            return Self::invalid_argument(err);
        }

        if err.is_builder() {
            return Self::internal(err);
        }

        Self::unknown(err)
    }
}

/// Converts JSON errors through IO error mapping.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        std::io::Error::from(err).into()
    }
}

/// Converts URL parsing errors to `InvalidArgument`.
impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

/// Converts TOML parsing errors to `InvalidArgument`.
impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

/// Converts TOML serialization errors to `Internal`.
impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Self::internal(e.to_string())
    }
}

/// Converts timeout errors to `DeadlineExceeded`.
impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Self::deadline_exceeded(e.to_string())
    }
}

/// Maps audio output stream errors.
///
/// `NoDevice` means no usable output exists at all; the other variants are
/// transient device-level failures.
impl From<rodio::StreamError> for Error {
    fn from(e: rodio::StreamError) -> Self {
        use rodio::StreamError::*;
        match e {
            NoDevice => Self::not_found(e),
            PlayStreamError(e) => Self::unavailable(e),
            DefaultStreamConfigError(e) => Self::unavailable(e),
            BuildStreamError(e) => Self::unavailable(e),
            SupportedStreamConfigsError(e) => Self::unavailable(e),
        }
    }
}

/// Maps playback errors: a failed decode is lost data, a missing device is
/// a missing resource.
impl From<rodio::PlayError> for Error {
    fn from(e: rodio::PlayError) -> Self {
        use rodio::PlayError::*;
        match e {
            DecoderError(e) => Self::data_loss(e),
            NoDevice => Self::not_found(e),
        }
    }
}

/// Converts decoder errors to `DataLoss`.
impl From<rodio::decoder::DecoderError> for Error {
    fn from(e: rodio::decoder::DecoderError) -> Self {
        Self::data_loss(e.to_string())
    }
}

/// Maps seek errors: sources that cannot seek are `Unimplemented`.
impl From<rodio::source::SeekError> for Error {
    fn from(e: rodio::source::SeekError) -> Self {
        use rodio::source::SeekError::*;
        match e {
            NotSupported { underlying_source } => Self::unimplemented(underlying_source),
            _ => Self::unknown(e.to_string()),
        }
    }
}
