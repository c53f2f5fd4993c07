//! Error types for the fetch pipeline.

use thiserror::Error;

/// Errors the fetch pipeline can report.
///
/// Individual image failures are not errors; they are dropped with a recorded
/// status line. The pipeline only fails as a whole.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The locator list was empty. Distinct from every attempt failing.
    #[error("no image locators supplied")]
    NoLocators,

    /// Every fetch attempt failed.
    #[error("no images fetched successfully ({attempted} attempts failed)")]
    NoImagesFetched {
        /// How many locators were attempted.
        attempted: usize,
        /// Per-attempt status lines recorded before giving up.
        statuses: Vec<String>,
    },
}
