//! Shared test support: scripted catalog resolver and payload helpers.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chapterbox::{CatalogError, CatalogResolver, Chapter, ChapterNumber, Session};

/// One scripted response of the fake resolver. The last step of a chapter's
/// script repeats forever, so repeated acquisitions keep working.
#[derive(Clone)]
pub enum ScriptStep {
    /// Return these image locators.
    Locators(Vec<String>),
    /// Fail with a retryable HTTP 503.
    TransientFailure,
    /// Fail with a non-retryable HTTP 404.
    PermanentFailure,
}

/// Catalog resolver driven by per-chapter scripts, counting every call so
/// tests can assert that cache hits never touch the listing boundary.
pub struct ScriptedResolver {
    scripts: Mutex<HashMap<ChapterNumber, VecDeque<ScriptStep>>>,
    calls: AtomicUsize,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Adds a script for one chapter (builder style).
    pub fn script(self, number: ChapterNumber, steps: Vec<ScriptStep>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(number, steps.into_iter().collect());
        self
    }

    /// Replaces a chapter's script mid-test.
    pub fn rescript(&self, number: ChapterNumber, steps: Vec<ScriptStep>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(number, steps.into_iter().collect());
    }

    /// Total listing calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogResolver for ScriptedResolver {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn image_locators(
        &self,
        chapter: &Chapter,
        _session: &Session,
    ) -> Result<Vec<String>, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let step = {
            let mut scripts = self.scripts.lock().unwrap();
            let queue = scripts.get_mut(&chapter.number).ok_or_else(|| {
                CatalogError::markup(&chapter.source_locator, "chapter not scripted")
            })?;
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue
                    .front()
                    .cloned()
                    .ok_or_else(|| CatalogError::markup(&chapter.source_locator, "empty script"))?
            }
        };

        match step {
            ScriptStep::Locators(locators) => Ok(locators),
            ScriptStep::TransientFailure => {
                Err(CatalogError::http_status(&chapter.source_locator, 503))
            }
            ScriptStep::PermanentFailure => {
                Err(CatalogError::http_status(&chapter.source_locator, 404))
            }
        }
    }
}

/// Incompressible pseudo-noise so Deflated archives stay above the validity
/// threshold.
pub fn noise_bytes(len: usize, seed: u64) -> Vec<u8> {
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

/// A test chapter pointing at a listing path on the mock site.
pub fn chapter(n: u32, site: &str) -> Chapter {
    Chapter::new(
        ChapterNumber::Ordinal(n),
        format!("Chapter {n}"),
        format!("{site}/manga/foo/chapter-{n}"),
    )
}
