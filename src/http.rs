//! HTTP client with rate limiting for the Navidrome and Subsonic APIs.
//!
//! Wraps `reqwest::Client` to add:
//! * request throttling, so a misbehaving queue restore or scrobble burst
//!   cannot hammer a self-hosted server
//! * consistent timeouts and a stable `User-Agent`
//!
//! Navidrome authenticates with a bearer header and signed query strings,
//! so unlike browser clients no cookie storage is needed here.

use std::{future::Future, num::NonZeroU32, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{self, Body, Method, Url};

use crate::{config::Config, error::Result};

/// HTTP client with built-in rate limiting.
pub struct Client {
    /// Unlimited request client for special cases.
    ///
    /// Direct access to the underlying client without rate limiting; the
    /// stream endpoint bypasses the limiter because one long-lived media
    /// download must not be delayed behind API calls.
    pub unlimited: reqwest::Client,

    /// Rate limiter applied by [`Client::execute`].
    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Length of the rolling window the rate limit applies to.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(5);

    /// Maximum API calls per interval.
    ///
    /// Generous for a single-user player: the busiest legitimate burst is
    /// a queue restore followed by a scrobble, far below this ceiling.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 25;

    /// Duration to keep idle connections alive.
    ///
    /// Prevents reconnection overhead between the periodic API calls of a
    /// long playback session.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Duration to wait for individual network reads.
    const READ_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a new client from the configured user agent.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be constructed.
    ///
    /// # Panics
    ///
    /// Panics if the rate limit parameters are zero.
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .read_timeout(Self::READ_TIMEOUT)
            .user_agent(&config.user_agent);

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Builds a request with the specified method, URL and body.
    ///
    /// The request is raw: execute it with [`Client::execute`] to apply
    /// rate limiting.
    pub fn request<U, T>(&self, method: Method, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        let mut request = reqwest::Request::new(method, url.into());
        let body_mut = request.body_mut();
        *body_mut = Some(body.into());

        request
    }

    /// Builds a GET request.
    pub fn get<U>(&self, url: U) -> reqwest::Request
    where
        U: Into<Url>,
    {
        reqwest::Request::new(Method::GET, url.into())
    }

    /// Builds a POST request with a body.
    pub fn post<U, T>(&self, url: U, body: T) -> reqwest::Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        self.request(Method::POST, url, body)
    }

    /// Builds a DELETE request.
    pub fn delete<U>(&self, url: U) -> reqwest::Request
    where
        U: Into<Url>,
    {
        reqwest::Request::new(Method::DELETE, url.into())
    }

    /// Executes a request after waiting for the rate limiter.
    ///
    /// # Errors
    ///
    /// Returns error if request execution fails or a network error occurs.
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        // No need to await with jitter because the level of concurrency is low.
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }
}
