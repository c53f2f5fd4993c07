//! Catalog resolver boundary.
//!
//! Chapter discovery and image-listing resolution are site-specific and live
//! outside this crate. Implementations resolve a chapter's source locator to
//! the ordered list of image locators for that chapter.
//!
//! # Object Safety
//!
//! This trait uses `async_trait` to support dynamic dispatch via
//! `Arc<dyn CatalogResolver>`. Rust 2024 native async traits are not
//! object-safe, so `async_trait` is required for the boundary.

use async_trait::async_trait;
use thiserror::Error;

use crate::chapter::Chapter;
use crate::session::Session;

/// Errors a catalog resolver can report.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Network-level failure reaching the listing endpoint.
    #[error("network error retrieving listing {locator}: {source}")]
    Network {
        /// The listing locator that failed.
        locator: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The listing endpoint returned an HTTP error status.
    #[error("HTTP {status} retrieving listing {locator}")]
    HttpStatus {
        /// The listing locator that failed.
        locator: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The listing page was retrieved but its markup was not recognized.
    #[error("unrecognized listing markup at {locator}: {reason}")]
    Markup {
        /// The listing locator whose markup failed to parse.
        locator: String,
        /// Description of what was wrong.
        reason: String,
    },
}

impl CatalogError {
    /// Creates a network error.
    pub fn network(locator: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            locator: locator.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(locator: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            locator: locator.into(),
            status,
        }
    }

    /// Creates a markup error.
    pub fn markup(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Markup {
            locator: locator.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the listing request could plausibly succeed.
    ///
    /// Network failures and server-side statuses (408, 429, 5xx) are
    /// transient; client errors and unrecognized markup are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::HttpStatus { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
            Self::Markup { .. } => false,
        }
    }
}

/// Resolves a chapter to its ordered list of remote image locators.
///
/// Implementations are site-specific and external to this crate. The returned
/// order is the chapter's page order and is preserved end to end.
#[async_trait]
pub trait CatalogResolver: Send + Sync {
    /// Returns the resolver's name (e.g. the site it handles).
    fn name(&self) -> &str;

    /// Resolves `chapter` to its image locators, in page order.
    ///
    /// An empty list means the chapter has no images (surfaced by the caller,
    /// not silently skipped).
    async fn image_locators(
        &self,
        chapter: &Chapter,
        session: &Session,
    ) -> Result<Vec<String>, CatalogError>;
}
