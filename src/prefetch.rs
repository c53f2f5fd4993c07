//! Prefetch scheduler: background acquisition of the next chapter.
//!
//! At most one background acquisition is outstanding per viewer session. The
//! task's only channel back to the foreground is its `JoinHandle`, which
//! resolves to the acquisition result exactly once; status messages ride
//! inside the [`Acquisition`]. No other cache or progress state is shared
//! across the boundary.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::archive::{AcquireError, Acquisition, ArchiveCache};
use crate::chapter::{Chapter, ChapterNumber};
use crate::resolver::CatalogResolver;
use crate::session::Session;

/// Errors surfaced by the prefetch scheduler.
#[derive(Debug, Error)]
pub enum PrefetchError {
    /// A background acquisition is already running; callers must wait for it.
    #[error("a background acquisition is already running for chapter {chapter}")]
    Busy {
        /// The chapter the running task is acquiring.
        chapter: ChapterNumber,
    },

    /// No background acquisition is armed.
    #[error("no background acquisition is armed")]
    Idle,

    /// The background task was cancelled or panicked before completing.
    #[error("background acquisition task for chapter {chapter} failed")]
    TaskFailed {
        /// The chapter the task was acquiring.
        chapter: ChapterNumber,
    },

    /// The background acquisition ran to completion and failed.
    #[error("background acquisition failed: {0}")]
    Acquire(#[from] AcquireError),
}

struct PrefetchTask {
    chapter: ChapterNumber,
    handle: JoinHandle<Result<Acquisition, AcquireError>>,
}

/// One-at-a-time background chapter acquisition.
#[derive(Default)]
pub struct Prefetcher {
    task: Option<PrefetchTask>,
}

impl std::fmt::Debug for Prefetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prefetcher")
            .field("pending_chapter", &self.pending_chapter())
            .finish()
    }
}

impl Prefetcher {
    /// Creates an idle prefetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a background acquisition is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// The chapter the outstanding task (running or finished-unjoined) is
    /// acquiring, if any.
    #[must_use]
    pub fn pending_chapter(&self) -> Option<ChapterNumber> {
        self.task.as_ref().map(|task| task.chapter)
    }

    /// Starts a background acquisition of `chapter`.
    ///
    /// A finished-but-unjoined task is replaced silently (its result slot was
    /// never claimed); a running task is not.
    ///
    /// # Errors
    ///
    /// Returns [`PrefetchError::Busy`] while a background acquisition is
    /// running.
    #[instrument(skip(self, cache, session, resolver, series, chapter), fields(series = %series, chapter = %chapter.number))]
    pub fn arm(
        &mut self,
        cache: Arc<ArchiveCache>,
        session: Session,
        resolver: Arc<dyn CatalogResolver>,
        series: String,
        chapter: Chapter,
    ) -> Result<(), PrefetchError> {
        if let Some(task) = &self.task
            && !task.handle.is_finished()
        {
            return Err(PrefetchError::Busy {
                chapter: task.chapter,
            });
        }

        let number = chapter.number;
        info!("starting background acquisition");

        let handle = tokio::spawn(async move {
            let result = cache
                .acquire(&series, &chapter, &session, resolver.as_ref())
                .await;
            match &result {
                Ok(acquisition) => {
                    debug!(path = %acquisition.path.display(), "background acquisition complete");
                }
                Err(e) => {
                    // Captured into the result slot; surfaced when the
                    // consumer tries to advance.
                    warn!(error = %e, "background acquisition failed");
                }
            }
            result
        });

        self.task = Some(PrefetchTask {
            chapter: number,
            handle,
        });
        Ok(())
    }

    /// Blocks until the outstanding acquisition completes and returns its
    /// result, consuming the slot.
    ///
    /// # Errors
    ///
    /// - [`PrefetchError::Idle`] if nothing is armed
    /// - [`PrefetchError::TaskFailed`] if the task panicked or was cancelled
    /// - [`PrefetchError::Acquire`] if the acquisition itself failed
    pub async fn join(&mut self) -> Result<Acquisition, PrefetchError> {
        let Some(task) = self.task.take() else {
            return Err(PrefetchError::Idle);
        };

        match task.handle.await {
            Ok(result) => Ok(result?),
            Err(e) => {
                warn!(chapter = %task.chapter, error = %e, "background task did not complete");
                Err(PrefetchError::TaskFailed {
                    chapter: task.chapter,
                })
            }
        }
    }
}
