//! Archive cache: returns a valid chapter archive, acquiring it if needed.
//!
//! The cache-hit path never touches the network. A file that fails the size
//! heuristic is deleted before any rebuild; cache corruption is not
//! distinguishable from a prior truncated write, so sub-threshold size always
//! means discard.
//!
//! # Concurrency
//!
//! The check-delete-rebuild sequence for one `(series, chapter)` key is a
//! critical section. Per-key async mutexes stored in a `DashMap` keep two
//! acquirers (foreground load and background prefetch) from racing on the
//! same path, while acquisitions for different keys proceed independently.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::error::ArchiveError;
use super::{VALIDITY_THRESHOLD, archive_filename, write_archive};
use crate::chapter::{Chapter, ChapterNumber};
use crate::fetch::{self, FetchError, FetchReport};
use crate::resolver::{CatalogError, CatalogResolver};
use crate::retry::{self, RetryPlan};
use crate::session::Session;

/// Errors that can occur while acquiring a chapter archive.
///
/// None of these are retried by the cache itself; the caller decides whether
/// to re-invoke. No partially-valid file is left behind on any of them.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The image listing could not be resolved, after bounded retries.
    #[error("failed to resolve image listing for chapter {chapter}: {source}")]
    Listing {
        /// The chapter whose listing failed.
        chapter: String,
        /// The final catalog error after retries were exhausted.
        #[source]
        source: CatalogError,
    },

    /// The listing resolved but contained zero image locators.
    #[error("no images found for chapter {chapter}")]
    NoImagesFound {
        /// The chapter that turned out empty.
        chapter: String,
    },

    /// Every image fetch attempt failed.
    #[error("no images fetched successfully for chapter {chapter} ({attempted} attempts failed)")]
    NoImagesFetched {
        /// The chapter being fetched.
        chapter: String,
        /// How many locators were attempted.
        attempted: usize,
    },

    /// The archive container could not be written.
    #[error("failed to build archive: {source}")]
    Build {
        /// The underlying archive error.
        #[source]
        source: ArchiveError,
    },

    /// The freshly built archive failed the size heuristic and was discarded.
    #[error("archive {path} too small ({size} bytes), likely corrupt")]
    ArchiveTooSmall {
        /// The discarded archive path.
        path: PathBuf,
        /// The observed size in bytes.
        size: u64,
    },

    /// File system error while validating or discarding an archive.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// A successful acquisition: the archive path plus the status lines recorded
/// along the way.
#[derive(Debug)]
pub struct Acquisition {
    /// Path to the valid archive.
    pub path: PathBuf,
    /// Append-only status messages (cache hit, fetch results, build note).
    pub statuses: Vec<String>,
    /// Whether the archive was built by this call (false = cache hit).
    pub rebuilt: bool,
}

/// Validity-checked cache of chapter archives under one root directory.
pub struct ArchiveCache {
    root: PathBuf,
    retry_plan: RetryPlan,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for ArchiveCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveCache")
            .field("root", &self.root)
            .field("retry_plan", &self.retry_plan)
            .finish_non_exhaustive()
    }
}

impl ArchiveCache {
    /// Creates a cache rooted at `root` with the default listing retry plan
    /// (3 attempts, 2 s apart).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            retry_plan: RetryPlan::default(),
            locks: DashMap::new(),
        }
    }

    /// Overrides the listing retry plan.
    #[must_use]
    pub fn with_retry_plan(mut self, retry_plan: RetryPlan) -> Self {
        self.retry_plan = retry_plan;
        self
    }

    /// Returns the cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical archive path for `(series, number)`.
    #[must_use]
    pub fn archive_path(&self, series: &str, number: ChapterNumber) -> PathBuf {
        self.root.join(archive_filename(series, number))
    }

    /// Whether a valid archive for `(series, number)` is already on disk.
    pub async fn is_valid(&self, series: &str, number: ChapterNumber) -> bool {
        let path = self.archive_path(series, number);
        matches!(
            tokio::fs::metadata(&path).await,
            Ok(meta) if meta.len() > VALIDITY_THRESHOLD
        )
    }

    /// Returns a path to a valid archive for `(series, chapter)`, acquiring
    /// it if absent or corrupt.
    ///
    /// The cache-hit path returns immediately without touching the network.
    /// Otherwise: resolve locators (with bounded retry), fetch images, build
    /// the archive, and re-validate its size.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError`] per failure stage; nothing partially valid is
    /// left on disk.
    #[instrument(skip(self, chapter, session, resolver), fields(series, chapter = %chapter.number))]
    pub async fn acquire(
        &self,
        series: &str,
        chapter: &Chapter,
        session: &Session,
        resolver: &dyn CatalogResolver,
    ) -> Result<Acquisition, AcquireError> {
        let path = self.archive_path(series, chapter.number);

        // Per-key critical section: check, delete, and rebuild must not race
        // with another acquirer on the same path.
        let lock = Arc::clone(
            self.locks
                .entry(path.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let _guard = lock.lock().await;

        let mut statuses = Vec::new();

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.len() > VALIDITY_THRESHOLD => {
                debug!(path = %path.display(), size = meta.len(), "cache hit");
                statuses.push(format!("Using existing archive: {}", path.display()));
                return Ok(Acquisition {
                    path,
                    statuses,
                    rebuilt: false,
                });
            }
            Ok(meta) => {
                warn!(
                    path = %path.display(),
                    size = meta.len(),
                    "existing archive too small, discarding"
                );
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| AcquireError::Io {
                        path: path.clone(),
                        source: e,
                    })?;
                statuses.push(format!(
                    "Existing archive {} too small ({} bytes), re-fetching",
                    path.display(),
                    meta.len()
                ));
            }
            // Treat any metadata failure as "absent" and fall through to a
            // fresh build; a real IO problem will resurface at write time.
            Err(_) => {}
        }

        statuses.push(format!("Fetching images from: {}", chapter.display_text));

        let locators = retry::with_fixed_delay(self.retry_plan, CatalogError::is_transient, || {
            resolver.image_locators(chapter, session)
        })
        .await
        .map_err(|source| AcquireError::Listing {
            chapter: chapter.number.to_string(),
            source,
        })?;

        if locators.is_empty() {
            return Err(AcquireError::NoImagesFound {
                chapter: chapter.number.to_string(),
            });
        }
        statuses.push(format!("Found {} images", locators.len()));

        let FetchReport {
            assets,
            statuses: fetch_statuses,
        } = match fetch::fetch_chapter_images(session, &locators).await {
            Ok(report) => report,
            Err(FetchError::NoLocators) => {
                return Err(AcquireError::NoImagesFound {
                    chapter: chapter.number.to_string(),
                });
            }
            Err(FetchError::NoImagesFetched { attempted, .. }) => {
                return Err(AcquireError::NoImagesFetched {
                    chapter: chapter.number.to_string(),
                    attempted,
                });
            }
        };
        statuses.extend(fetch_statuses);

        write_archive(assets, &path)
            .await
            .map_err(|source| AcquireError::Build { source })?;
        statuses.push(format!("Created {}", path.display()));

        let size = tokio::fs::metadata(&path)
            .await
            .map_err(|e| AcquireError::Io {
                path: path.clone(),
                source: e,
            })?
            .len();

        // Catches pathological cases such as every fetched image being an
        // empty-byte placeholder.
        if size <= VALIDITY_THRESHOLD {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| AcquireError::Io {
                    path: path.clone(),
                    source: e,
                })?;
            return Err(AcquireError::ArchiveTooSmall { path, size });
        }

        info!(path = %path.display(), bytes = size, "chapter archive acquired");
        Ok(Acquisition {
            path,
            statuses,
            rebuilt: true,
        })
    }
}
