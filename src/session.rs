//! Viewer session: HTTP client configuration and opaque site credentials.
//!
//! All catalog and image traffic goes through a [`Session`], which wraps a
//! `reqwest::Client` configured with the site's cookies. There is no ambient
//! session state; callers pass the session into every operation explicitly.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::cookie::Jar;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Default HTTP connect timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-request timeout. Bounds how long a prefetch join can block on
/// any single in-flight request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Browser-like User-Agent for catalog and image requests.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Accept header sent with image requests.
pub const IMAGE_ACCEPT: &str =
    "image/avif,image/webp,image/png,image/svg+xml,image/*;q=0.8,*/*;q=0.5";

/// Errors that can occur while constructing a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The site origin used to scope cookies is not a valid URL.
    #[error("invalid session origin {origin}: {source}")]
    InvalidOrigin {
        /// The origin string that failed to parse.
        origin: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

/// Opaque session credentials: named cookie values scoped to one site.
///
/// Cookie values are sensitive and are redacted in Debug output.
#[derive(Clone, Default)]
pub struct SessionCredentials {
    cookies: Vec<(String, String)>,
}

impl SessionCredentials {
    /// Creates an empty credential set (anonymous session).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cookie to the credential set.
    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Returns true if no cookies are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

// Custom Debug impl that redacts cookie values.
impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.cookies.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("SessionCredentials")
            .field("cookies", &names)
            .field("values", &"[REDACTED]")
            .finish()
    }
}

/// A configured HTTP session for one site.
///
/// Cheap to clone: the inner `reqwest::Client` shares its connection pool and
/// cookie jar across clones, so the prefetch task and the foreground path use
/// the same session state.
#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
}

impl Session {
    /// Creates a session whose cookie jar is seeded from `credentials`,
    /// scoped to `origin` (e.g. `https://example.com`).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidOrigin`] if `origin` is not a valid URL,
    /// or [`SessionError::Client`] if the HTTP client cannot be built.
    pub fn new(origin: &str, credentials: &SessionCredentials) -> Result<Self, SessionError> {
        let origin_url = Url::parse(origin).map_err(|source| SessionError::InvalidOrigin {
            origin: origin.to_string(),
            source,
        })?;

        let jar = Arc::new(Jar::default());
        for (name, value) in &credentials.cookies {
            jar.add_cookie_str(&format!("{name}={value}"), &origin_url);
        }

        debug!(
            origin = %origin_url,
            cookie_count = credentials.cookies.len(),
            "building session client"
        );

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .gzip(true)
            .user_agent(DEFAULT_USER_AGENT)
            .cookie_provider(jar)
            .build()
            .map_err(|source| SessionError::Client { source })?;

        Ok(Self { client })
    }

    /// Creates an anonymous session scoped to `origin`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Session::new`].
    pub fn anonymous(origin: &str) -> Result<Self, SessionError> {
        Self::new(origin, &SessionCredentials::new())
    }

    /// Returns the configured HTTP client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_session_builds_with_cookies() {
        let credentials = SessionCredentials::new()
            .with_cookie("cf_clearance", "token-value")
            .with_cookie("wordpress_logged_in", "user");
        let session = Session::new("https://example.com", &credentials);
        assert!(session.is_ok());
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let result = Session::anonymous("not a url");
        assert!(matches!(result, Err(SessionError::InvalidOrigin { .. })));
    }

    #[test]
    fn test_debug_redacts_cookie_values() {
        let credentials = SessionCredentials::new().with_cookie("auth", "super-secret");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("auth"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_empty_credentials() {
        assert!(SessionCredentials::new().is_empty());
        assert!(!SessionCredentials::new().with_cookie("a", "b").is_empty());
    }
}
