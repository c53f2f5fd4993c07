//! Bounded-concurrency image fetcher.
//!
//! # Concurrency Model
//!
//! - Each locator is submitted exactly once as its own Tokio task
//! - A semaphore permit bounds in-flight requests to [`MAX_IN_FLIGHT`]
//! - Results are collected as tasks complete, not in submission order; each
//!   result retains its original sequence index, so downstream ordering is
//!   unaffected by completion order
//!
//! # Failure Policy
//!
//! A failed locator is dropped with a recorded status line. There is no
//! per-image retry: image CDNs are high-volume and low-value per item, and
//! the listing-resolution step is the only retried boundary.

use std::sync::Arc;

use reqwest::header::ACCEPT;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::error::FetchError;
use crate::archive::entry_name;
use crate::session::{IMAGE_ACCEPT, Session};

/// Fixed width of the fetch worker pool.
pub const MAX_IN_FLIGHT: usize = 5;

/// One successfully fetched image, positioned by its locator-list index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    /// 0-based position in the resolved locator list.
    pub sequence_index: usize,
    /// Raw image content.
    pub bytes: Vec<u8>,
}

/// Output of one pipeline run: the retrieved assets plus a status line per
/// attempt.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Successfully fetched assets, sorted by sequence index.
    pub assets: Vec<ImageAsset>,
    /// Human-readable status lines, in completion order.
    pub statuses: Vec<String>,
}

/// Outcome of a single fetch attempt, as produced by a worker task.
struct Attempt {
    sequence_index: usize,
    locator: String,
    outcome: Result<Vec<u8>, AttemptFailure>,
}

enum AttemptFailure {
    Status(u16),
    Other(String),
}

/// Fetches all images for one chapter with bounded concurrency.
///
/// Returns the subset of images that were retrieved successfully, sorted by
/// sequence index, plus one status line per attempt. Partial failure is
/// tolerated; the pipeline succeeds as long as at least one asset is
/// retrieved.
///
/// # Errors
///
/// - [`FetchError::NoLocators`] if `locators` is empty
/// - [`FetchError::NoImagesFetched`] if every attempt failed
#[instrument(skip(session, locators), fields(locator_count = locators.len()))]
pub async fn fetch_chapter_images(
    session: &Session,
    locators: &[String],
) -> Result<FetchReport, FetchError> {
    if locators.is_empty() {
        return Err(FetchError::NoLocators);
    }

    let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
    let mut tasks = JoinSet::new();

    for (sequence_index, locator) in locators.iter().enumerate() {
        let client = session.client().clone();
        let locator = locator.clone();
        let semaphore = Arc::clone(&semaphore);

        tasks.spawn(async move {
            let outcome = match semaphore.acquire_owned().await {
                Ok(_permit) => fetch_one(&client, &locator).await,
                Err(_) => Err(AttemptFailure::Other("worker pool closed".to_string())),
            };
            Attempt {
                sequence_index,
                locator,
                outcome,
            }
        });
    }

    let mut report = FetchReport::default();

    while let Some(joined) = tasks.join_next().await {
        let attempt = match joined {
            Ok(attempt) => attempt,
            Err(e) => {
                // Task panics are logged but don't fail the batch.
                warn!(error = %e, "fetch task panicked");
                continue;
            }
        };

        match attempt.outcome {
            Ok(bytes) => {
                let name = entry_name(attempt.sequence_index);
                debug!(
                    sequence_index = attempt.sequence_index,
                    bytes = bytes.len(),
                    "fetched image"
                );
                report.statuses.push(format!("Fetched: {name}"));
                report.assets.push(ImageAsset {
                    sequence_index: attempt.sequence_index,
                    bytes,
                });
            }
            Err(AttemptFailure::Status(status)) => {
                report.statuses.push(format!(
                    "Failed to fetch {} - status code {status}",
                    attempt.locator
                ));
            }
            Err(AttemptFailure::Other(cause)) => {
                report
                    .statuses
                    .push(format!("Failed to fetch {}: {cause}", attempt.locator));
            }
        }
    }

    // Ordering comes from locator position, never completion order.
    report.assets.sort_unstable_by_key(|asset| asset.sequence_index);

    info!(
        fetched = report.assets.len(),
        attempted = locators.len(),
        "fetch pipeline finished"
    );

    if report.assets.is_empty() {
        return Err(FetchError::NoImagesFetched {
            attempted: locators.len(),
            statuses: report.statuses,
        });
    }

    Ok(report)
}

/// Performs a single image GET.
async fn fetch_one(client: &reqwest::Client, locator: &str) -> Result<Vec<u8>, AttemptFailure> {
    let response = client
        .get(locator)
        .header(ACCEPT, IMAGE_ACCEPT)
        .send()
        .await
        .map_err(|e| AttemptFailure::Other(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AttemptFailure::Status(status.as_u16()));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AttemptFailure::Other(e.to_string()))?;
    Ok(bytes.to_vec())
}
