//! Reader session: the front-end boundary.
//!
//! A [`ReaderSession`] holds one series' chapter list, the pages of the
//! chapter being read, and the reading position. The front-end renders the
//! pages and feeds navigation intents back in; the session satisfies them
//! against the archive cache, keeps the progress store current, and keeps the
//! prefetcher armed for the next chapter.
//!
//! Page bytes are handed out raw; decoding them is the front-end's job.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::archive::{AcquireError, ArchiveCache, ArchiveError, Page, read_pages};
use crate::chapter::{Chapter, ChapterNumber};
use crate::prefetch::Prefetcher;
use crate::progress::{ProgressError, ProgressStore};
use crate::resolver::CatalogResolver;
use crate::session::Session;

/// Errors surfaced to the front-end.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// The requested chapter index does not exist.
    #[error("chapter index {index} out of range ({count} chapters)")]
    ChapterOutOfRange {
        /// The requested index.
        index: usize,
        /// How many chapters the series has.
        count: usize,
    },

    /// Already on the last chapter of the series.
    #[error("already at the end of the series")]
    EndOfSeries,

    /// The next chapter's archive is not valid yet (its prefetch failed or
    /// produced an invalid file). A fresh background acquisition has been
    /// armed; trying again later may succeed.
    #[error("chapter {chapter} is not ready yet")]
    ChapterNotReady {
        /// The chapter that is not ready.
        chapter: ChapterNumber,
    },

    /// A rebuilt archive still contained no readable pages.
    #[error("archive {path} contained no readable pages")]
    EmptyArchive {
        /// The offending archive path.
        path: PathBuf,
    },

    /// Acquiring the chapter archive failed.
    #[error("acquisition failed: {0}")]
    Acquire(#[from] AcquireError),

    /// Reading or discarding the archive failed.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Persisting reading progress failed.
    #[error("progress error: {0}")]
    Progress(#[from] ProgressError),
}

/// Navigation intents emitted by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavIntent {
    /// Jump to the chapter at the given index in the series list.
    LoadChapter(usize),
    /// Advance one page (crosses into the next chapter from the last page).
    NextPage,
    /// Go back one page (crosses into the previous chapter from the first).
    PrevPage,
    /// Advance to the next chapter.
    NextChapter,
    /// Go back to the previous chapter.
    PrevChapter,
    /// End the session, persisting the final position.
    Close,
}

/// What a navigation intent did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    /// The page changed within the current chapter.
    PageChanged {
        /// New 1-based page number.
        page: u32,
        /// Total pages in the chapter.
        page_count: usize,
    },
    /// The session switched chapters.
    ChapterChanged {
        /// The chapter now being read.
        chapter: ChapterNumber,
        /// 1-based page number within it.
        page: u32,
        /// Total pages in the new chapter.
        page_count: usize,
    },
    /// The intent hit a boundary (first page of the series, previous chapter
    /// not on disk) and nothing changed.
    AtBoundary,
    /// The session was closed.
    Closed,
}

/// One viewer session over a series.
pub struct ReaderSession {
    series: String,
    chapters: Vec<Chapter>,
    current_index: usize,
    pages: Vec<Page>,
    current_page: usize,
    chapter_read: bool,
    cache: Arc<ArchiveCache>,
    session: Session,
    resolver: Arc<dyn CatalogResolver>,
    progress: Arc<ProgressStore>,
    prefetcher: Prefetcher,
}

impl std::fmt::Debug for ReaderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderSession")
            .field("series", &self.series)
            .field("current_index", &self.current_index)
            .field("current_page", &self.current_page)
            .field("page_count", &self.pages.len())
            .finish_non_exhaustive()
    }
}

impl ReaderSession {
    /// Opens a session on `chapters[start_index]`, acquiring its archive if
    /// needed, restoring the persisted page when it matches, and arming the
    /// prefetcher for the following chapter.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError`] if the index is out of range or the starting
    /// chapter cannot be acquired.
    pub async fn open(
        series: impl Into<String>,
        chapters: Vec<Chapter>,
        start_index: usize,
        cache: Arc<ArchiveCache>,
        session: Session,
        resolver: Arc<dyn CatalogResolver>,
        progress: Arc<ProgressStore>,
    ) -> Result<Self, ReaderError> {
        let mut reader = Self {
            series: series.into(),
            chapters,
            current_index: 0,
            pages: Vec::new(),
            current_page: 0,
            chapter_read: false,
            cache,
            session,
            resolver,
            progress,
            prefetcher: Prefetcher::new(),
        };
        reader.load_chapter(start_index).await?;
        Ok(reader)
    }

    /// Dispatches a front-end navigation intent.
    ///
    /// # Errors
    ///
    /// Returns whatever the dispatched operation returns.
    pub async fn apply(&mut self, intent: NavIntent) -> Result<NavOutcome, ReaderError> {
        match intent {
            NavIntent::LoadChapter(index) => self.load_chapter(index).await,
            NavIntent::NextPage => self.next_page().await,
            NavIntent::PrevPage => self.prev_page().await,
            NavIntent::NextChapter => self.next_chapter().await,
            NavIntent::PrevChapter => self.prev_chapter().await,
            NavIntent::Close => self.close().await,
        }
    }

    /// Loads the chapter at `index`, restoring the persisted page position
    /// and re-arming the prefetcher.
    ///
    /// # Errors
    ///
    /// Returns [`ReaderError::ChapterOutOfRange`] for a bad index, or an
    /// acquisition error if the archive cannot be materialized.
    #[instrument(skip(self), fields(series = %self.series))]
    pub async fn load_chapter(&mut self, index: usize) -> Result<NavOutcome, ReaderError> {
        if index >= self.chapters.len() {
            return Err(ReaderError::ChapterOutOfRange {
                index,
                count: self.chapters.len(),
            });
        }

        self.load_pages(index).await?;
        self.restore_page().await;
        self.record_position().await?;
        self.arm_prefetch().await;

        Ok(NavOutcome::ChapterChanged {
            chapter: self.current_chapter().number,
            page: self.page_number(),
            page_count: self.pages.len(),
        })
    }

    /// Advances one page; from the last page, advances to the next chapter.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`ReaderSession::next_chapter`] when the
    /// advance crosses a chapter boundary.
    pub async fn next_page(&mut self) -> Result<NavOutcome, ReaderError> {
        if self.current_page + 1 < self.pages.len() {
            self.current_page += 1;
            self.record_position().await?;
            self.mark_read_if_last_page().await?;
            return Ok(NavOutcome::PageChanged {
                page: self.page_number(),
                page_count: self.pages.len(),
            });
        }

        if self.current_index + 1 < self.chapters.len() {
            return self.next_chapter().await;
        }

        Ok(NavOutcome::AtBoundary)
    }

    /// Goes back one page; from the first page, crosses into the previous
    /// chapter when its archive is already on disk.
    ///
    /// # Errors
    ///
    /// Returns an archive error if the previous chapter's archive cannot be
    /// read.
    pub async fn prev_page(&mut self) -> Result<NavOutcome, ReaderError> {
        if self.current_page > 0 {
            self.current_page -= 1;
            self.record_position().await?;
            return Ok(NavOutcome::PageChanged {
                page: self.page_number(),
                page_count: self.pages.len(),
            });
        }

        self.prev_chapter().await
    }

    /// Advances to the next chapter, blocking on a running prefetch for it.
    ///
    /// If the prefetch failed (or never produced a valid archive), a fresh
    /// background acquisition is armed and [`ReaderError::ChapterNotReady`]
    /// is returned; the current chapter stays loaded.
    ///
    /// # Errors
    ///
    /// - [`ReaderError::EndOfSeries`] on the last chapter
    /// - [`ReaderError::ChapterNotReady`] when the target archive is invalid
    #[instrument(skip(self), fields(series = %self.series))]
    pub async fn next_chapter(&mut self) -> Result<NavOutcome, ReaderError> {
        let target_index = self.current_index + 1;
        let Some(target) = self.chapters.get(target_index).cloned() else {
            return Err(ReaderError::EndOfSeries);
        };

        self.mark_read_if_last_page().await?;

        // Block until the background acquisition for the target completes,
        // then re-check validity rather than trusting its result directly.
        if self.prefetcher.pending_chapter() == Some(target.number) {
            match self.prefetcher.join().await {
                Ok(acquisition) => {
                    debug!(path = %acquisition.path.display(), "prefetched archive ready");
                }
                Err(e) => warn!(error = %e, "prefetch did not produce an archive"),
            }
        }

        if !self.cache.is_valid(&self.series, target.number).await {
            self.arm_prefetch().await;
            return Err(ReaderError::ChapterNotReady {
                chapter: target.number,
            });
        }

        self.load_pages(target_index).await?;
        self.restore_page().await;
        self.record_position().await?;
        self.arm_prefetch().await;

        Ok(NavOutcome::ChapterChanged {
            chapter: self.current_chapter().number,
            page: self.page_number(),
            page_count: self.pages.len(),
        })
    }

    /// Goes back to the previous chapter if its archive is already on disk.
    ///
    /// Backward navigation never fetches; a previous chapter that was never
    /// materialized is a boundary, not an acquisition trigger.
    ///
    /// # Errors
    ///
    /// Returns an archive error if the on-disk archive cannot be read.
    pub async fn prev_chapter(&mut self) -> Result<NavOutcome, ReaderError> {
        let Some(target_index) = self.current_index.checked_sub(1) else {
            return Ok(NavOutcome::AtBoundary);
        };
        let target_number = self.chapters[target_index].number;

        if !self.cache.is_valid(&self.series, target_number).await {
            return Ok(NavOutcome::AtBoundary);
        }

        self.load_pages(target_index).await?;
        self.restore_page().await;
        self.record_position().await?;
        self.arm_prefetch().await;

        Ok(NavOutcome::ChapterChanged {
            chapter: self.current_chapter().number,
            page: self.page_number(),
            page_count: self.pages.len(),
        })
    }

    /// Ends the session: records the read-state if on the last page, then
    /// persists the final position.
    ///
    /// # Errors
    ///
    /// Returns a progress error if the final state cannot be persisted.
    pub async fn close(&mut self) -> Result<NavOutcome, ReaderError> {
        self.mark_read_if_last_page().await?;
        self.record_position().await?;
        Ok(NavOutcome::Closed)
    }

    /// The series this session reads.
    #[must_use]
    pub fn series(&self) -> &str {
        &self.series
    }

    /// The full chapter list, in reading order.
    #[must_use]
    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    /// Index of the chapter being read.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// The chapter being read.
    ///
    /// # Panics
    ///
    /// Never panics: a session always has a loaded chapter.
    #[must_use]
    pub fn current_chapter(&self) -> &Chapter {
        &self.chapters[self.current_index]
    }

    /// All pages of the current chapter, in display order.
    #[must_use]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// The page currently displayed.
    #[must_use]
    pub fn page(&self) -> Option<&Page> {
        self.pages.get(self.current_page)
    }

    /// 1-based number of the page currently displayed.
    #[must_use]
    pub fn page_number(&self) -> u32 {
        u32::try_from(self.current_page + 1).unwrap_or(u32::MAX)
    }

    /// Total pages in the current chapter.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Acquires and loads the pages of `chapters[index]`.
    ///
    /// An archive that opens but contains no pages is discarded and
    /// re-acquired once; a second empty result is an error.
    async fn load_pages(&mut self, index: usize) -> Result<(), ReaderError> {
        let chapter = match self.chapters.get(index) {
            Some(chapter) => chapter.clone(),
            None => {
                return Err(ReaderError::ChapterOutOfRange {
                    index,
                    count: self.chapters.len(),
                });
            }
        };

        let acquisition = self
            .cache
            .acquire(&self.series, &chapter, &self.session, self.resolver.as_ref())
            .await?;
        let mut pages = read_pages(&acquisition.path).await?;

        if pages.is_empty() {
            warn!(path = %acquisition.path.display(), "archive has no pages, rebuilding once");
            tokio::fs::remove_file(&acquisition.path)
                .await
                .map_err(|e| ArchiveError::io(&acquisition.path, e))?;

            let acquisition = self
                .cache
                .acquire(&self.series, &chapter, &self.session, self.resolver.as_ref())
                .await?;
            pages = read_pages(&acquisition.path).await?;
            if pages.is_empty() {
                return Err(ReaderError::EmptyArchive {
                    path: acquisition.path,
                });
            }
        }

        self.current_index = index;
        self.pages = pages;
        self.current_page = 0;
        self.chapter_read = false;
        Ok(())
    }

    /// Restores the persisted page when the stored current chapter matches
    /// the loaded one; otherwise stays on the first page.
    async fn restore_page(&mut self) {
        self.current_page = 0;
        let state = self.progress.load().await;
        if let Some(entry) = state.get(&self.series)
            && entry.current.chapter == Some(self.current_chapter().number)
            && let Some(page) = entry.current.page
        {
            let saved = page.saturating_sub(1) as usize;
            if saved < self.pages.len() {
                self.current_page = saved;
            }
        }
    }

    /// Persists the current chapter/page.
    async fn record_position(&self) -> Result<(), ReaderError> {
        self.progress
            .set_position(
                &self.series,
                self.current_chapter().number,
                self.page_number(),
            )
            .await?;
        Ok(())
    }

    /// Marks the current chapter read when the last page is displayed.
    /// Idempotent per loaded chapter.
    async fn mark_read_if_last_page(&mut self) -> Result<(), ReaderError> {
        if !self.chapter_read && !self.pages.is_empty() && self.current_page + 1 == self.pages.len()
        {
            self.progress
                .record_read(&self.series, self.current_chapter().number)
                .await?;
            self.chapter_read = true;
            debug!(
                series = %self.series,
                chapter = %self.current_chapter().number,
                "chapter marked as read"
            );
        }
        Ok(())
    }

    /// Arms a background acquisition for the next chapter when one exists
    /// and its archive is not already valid.
    async fn arm_prefetch(&mut self) {
        let Some(next) = self.chapters.get(self.current_index + 1).cloned() else {
            return;
        };
        if self.cache.is_valid(&self.series, next.number).await {
            return;
        }

        if let Err(e) = self.prefetcher.arm(
            Arc::clone(&self.cache),
            self.session.clone(),
            Arc::clone(&self.resolver),
            self.series.clone(),
            next,
        ) {
            debug!(error = %e, "prefetch not armed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::archive::write_archive;
    use crate::fetch::ImageAsset;
    use crate::resolver::CatalogError;

    /// Resolver for tests where every chapter is already cached: reaching the
    /// network path is a bug.
    struct MustNotResolve;

    #[async_trait]
    impl CatalogResolver for MustNotResolve {
        fn name(&self) -> &str {
            "must-not-resolve"
        }

        async fn image_locators(
            &self,
            _chapter: &Chapter,
            _session: &Session,
        ) -> Result<Vec<String>, CatalogError> {
            panic!("all chapters were prebuilt; no listing should be resolved");
        }
    }

    fn chapter(n: u32) -> Chapter {
        Chapter::new(
            ChapterNumber::Ordinal(n),
            format!("Chapter {n}"),
            format!("https://example.com/manga/foo/chapter-{n}"),
        )
    }

    /// Incompressible page bytes so the Deflated archive stays above the
    /// validity threshold.
    fn noise_bytes(len: usize, seed: u64) -> Vec<u8> {
        let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state & 0xFF) as u8
            })
            .collect()
    }

    /// Builds a valid archive for every chapter so no session touches the
    /// network.
    async fn prebuild(cache: &ArchiveCache, series: &str, numbers: &[u32], page_count: usize) {
        for &n in numbers {
            let assets = (0..page_count)
                .map(|i| ImageAsset {
                    sequence_index: i,
                    bytes: noise_bytes(1200, u64::from(n) * 100 + i as u64),
                })
                .collect();
            let path = cache.archive_path(series, ChapterNumber::Ordinal(n));
            write_archive(assets, &path).await.unwrap();
        }
    }

    async fn open_session(dir: &TempDir, numbers: &[u32], start: usize) -> ReaderSession {
        let cache = Arc::new(ArchiveCache::new(dir.path()));
        prebuild(&cache, "Foo", numbers, 3).await;
        let progress = Arc::new(ProgressStore::new(dir.path().join("read_list.json")));
        let session = Session::anonymous("http://localhost").unwrap();
        let chapters = numbers.iter().map(|&n| chapter(n)).collect();

        ReaderSession::open(
            "Foo",
            chapters,
            start,
            cache,
            session,
            Arc::new(MustNotResolve),
            progress,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_open_starts_on_first_page() {
        let dir = TempDir::new().unwrap();
        let reader = open_session(&dir, &[1, 2], 0).await;
        assert_eq!(reader.page_number(), 1);
        assert_eq!(reader.page_count(), 3);
        assert_eq!(reader.current_chapter().number, ChapterNumber::Ordinal(1));
        assert_eq!(reader.page().unwrap().name, "image_001.jpg");
    }

    #[tokio::test]
    async fn test_page_navigation_updates_position() {
        let dir = TempDir::new().unwrap();
        let mut reader = open_session(&dir, &[1, 2], 0).await;

        let outcome = reader.next_page().await.unwrap();
        assert_eq!(
            outcome,
            NavOutcome::PageChanged {
                page: 2,
                page_count: 3
            }
        );

        let outcome = reader.prev_page().await.unwrap();
        assert_eq!(
            outcome,
            NavOutcome::PageChanged {
                page: 1,
                page_count: 3
            }
        );

        let state = reader.progress.load().await;
        assert_eq!(state["Foo"].current.page, Some(1));
    }

    #[tokio::test]
    async fn test_last_page_marks_chapter_read() {
        let dir = TempDir::new().unwrap();
        let mut reader = open_session(&dir, &[1, 2], 0).await;

        reader.next_page().await.unwrap();
        reader.next_page().await.unwrap();

        let state = reader.progress.load().await;
        assert_eq!(state["Foo"].read, vec![ChapterNumber::Ordinal(1)]);

        // Paging within the last page does not duplicate the entry.
        reader.prev_page().await.unwrap();
        reader.next_page().await.unwrap();
        let state = reader.progress.load().await;
        assert_eq!(state["Foo"].read, vec![ChapterNumber::Ordinal(1)]);
    }

    #[tokio::test]
    async fn test_next_page_past_end_crosses_chapter() {
        let dir = TempDir::new().unwrap();
        let mut reader = open_session(&dir, &[1, 2], 0).await;

        reader.next_page().await.unwrap();
        reader.next_page().await.unwrap();
        let outcome = reader.next_page().await.unwrap();

        assert_eq!(
            outcome,
            NavOutcome::ChapterChanged {
                chapter: ChapterNumber::Ordinal(2),
                page: 1,
                page_count: 3
            }
        );
        assert_eq!(reader.current_index(), 1);
    }

    #[tokio::test]
    async fn test_next_chapter_at_end_of_series() {
        let dir = TempDir::new().unwrap();
        let mut reader = open_session(&dir, &[7], 0).await;
        let result = reader.next_chapter().await;
        assert!(matches!(result, Err(ReaderError::EndOfSeries)));
    }

    #[tokio::test]
    async fn test_prev_page_on_first_page_of_first_chapter_is_boundary() {
        let dir = TempDir::new().unwrap();
        let mut reader = open_session(&dir, &[1, 2], 0).await;
        let outcome = reader.prev_page().await.unwrap();
        assert_eq!(outcome, NavOutcome::AtBoundary);
    }

    #[tokio::test]
    async fn test_prev_chapter_loads_existing_archive() {
        let dir = TempDir::new().unwrap();
        let mut reader = open_session(&dir, &[1, 2], 1).await;

        let outcome = reader.prev_chapter().await.unwrap();
        assert_eq!(
            outcome,
            NavOutcome::ChapterChanged {
                chapter: ChapterNumber::Ordinal(1),
                page: 1,
                page_count: 3
            }
        );
    }

    #[tokio::test]
    async fn test_open_restores_saved_page_for_matching_chapter() {
        let dir = TempDir::new().unwrap();
        {
            let progress = ProgressStore::new(dir.path().join("read_list.json"));
            progress
                .set_position("Foo", ChapterNumber::Ordinal(1), 3)
                .await
                .unwrap();
        }
        let reader = open_session(&dir, &[1, 2], 0).await;
        assert_eq!(reader.page_number(), 3);
    }

    #[tokio::test]
    async fn test_load_chapter_out_of_range() {
        let dir = TempDir::new().unwrap();
        let mut reader = open_session(&dir, &[1], 0).await;
        let result = reader.load_chapter(5).await;
        assert!(matches!(
            result,
            Err(ReaderError::ChapterOutOfRange { index: 5, count: 1 })
        ));
    }

    #[tokio::test]
    async fn test_close_records_position() {
        let dir = TempDir::new().unwrap();
        let mut reader = open_session(&dir, &[1], 0).await;
        reader.next_page().await.unwrap();
        let outcome = reader.close().await.unwrap();
        assert_eq!(outcome, NavOutcome::Closed);

        let state = reader.progress.load().await;
        assert_eq!(state["Foo"].current.chapter, Some(ChapterNumber::Ordinal(1)));
        assert_eq!(state["Foo"].current.page, Some(2));
    }
}
