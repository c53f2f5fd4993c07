//! Reading progress persistence.
//!
//! One JSON document maps series name to its progress: the set of chapters
//! read (sorted, monotone) and the current chapter/page. The whole file is
//! the unit of truth: every mutation loads the full state, changes it in
//! memory, and rewrites the document. A missing or unparsable file degrades
//! to empty state rather than erroring.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::chapter::ChapterNumber;

/// Errors that can occur while persisting progress.
#[derive(Debug, Error)]
pub enum ProgressError {
    /// Writing the progress file failed.
    #[error("failed to write progress file {path}: {source}")]
    Io {
        /// The progress file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Serializing the progress state failed.
    #[error("failed to serialize progress state: {source}")]
    Serialize {
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Current reading position within a series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPosition {
    /// The chapter being read, if any.
    pub chapter: Option<ChapterNumber>,
    /// 1-based page within that chapter, if any.
    pub page: Option<u32>,
}

/// Progress for one series: chapters read plus the current position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesProgress {
    /// Chapters fully read, kept sorted. Never shrinks.
    pub read: Vec<ChapterNumber>,
    /// Current chapter/page, overwritten on every transition.
    #[serde(default)]
    pub current: CurrentPosition,
}

/// In-memory form of the whole progress document.
pub type ProgressState = BTreeMap<String, SeriesProgress>;

/// Persisted form of one series entry. Older files stored a bare read-list
/// per series; those upgrade transparently to the current shape.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSeries {
    Current(SeriesProgress),
    Legacy(Vec<ChapterNumber>),
}

impl From<StoredSeries> for SeriesProgress {
    fn from(stored: StoredSeries) -> Self {
        match stored {
            StoredSeries::Current(progress) => progress,
            StoredSeries::Legacy(read) => Self {
                read,
                current: CurrentPosition::default(),
            },
        }
    }
}

/// File-backed reading progress store.
///
/// All mutation goes through load-entire-state, mutate in memory, write
/// entire state; an internal mutex serializes mutators so concurrent
/// foreground/background callers cannot lose updates.
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ProgressStore {
    /// Creates a store backed by the file at `path`. The file is created on
    /// first mutation.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the full progress state.
    ///
    /// A missing or unparsable file is empty state, not an error. Legacy
    /// list-only series entries are upgraded in memory.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> ProgressState {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, "no progress file, starting empty");
                return ProgressState::new();
            }
        };

        match serde_json::from_str::<BTreeMap<String, StoredSeries>>(&raw) {
            Ok(stored) => stored
                .into_iter()
                .map(|(series, entry)| (series, entry.into()))
                .collect(),
            Err(e) => {
                warn!(error = %e, "progress file unparsable, starting empty");
                ProgressState::new()
            }
        }
    }

    /// Idempotently adds `chapter` to the series' read set, keeping it
    /// sorted. Re-adding an already-read chapter is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError`] if the rewritten state cannot be persisted.
    #[instrument(skip(self), fields(series, chapter = %chapter))]
    pub async fn record_read(
        &self,
        series: &str,
        chapter: ChapterNumber,
    ) -> Result<(), ProgressError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load().await;

        let entry = state.entry(series.to_string()).or_default();
        if !entry.read.contains(&chapter) {
            entry.read.push(chapter);
            entry.read.sort();
        }

        self.save(&state).await
    }

    /// Unconditionally overwrites the series' current chapter/page.
    ///
    /// Last write wins; no page-ordering validation is enforced, so a viewer
    /// may legitimately jump backward.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError`] if the rewritten state cannot be persisted.
    #[instrument(skip(self), fields(series, chapter = %chapter, page))]
    pub async fn set_position(
        &self,
        series: &str,
        chapter: ChapterNumber,
        page: u32,
    ) -> Result<(), ProgressError> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load().await;

        let entry = state.entry(series.to_string()).or_default();
        entry.current = CurrentPosition {
            chapter: Some(chapter),
            page: Some(page),
        };

        self.save(&state).await
    }

    /// Rewrites the whole document.
    async fn save(&self, state: &ProgressState) -> Result<(), ProgressError> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|source| ProgressError::Serialize { source })?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| ProgressError::Io {
                path: self.path.clone(),
                source,
            })
    }
}
