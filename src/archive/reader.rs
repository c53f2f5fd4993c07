//! Archive reader: loads a chapter archive's pages in display order.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, instrument};
use zip::ZipArchive;

use super::error::ArchiveError;

/// One page of a loaded chapter: entry name plus raw image bytes.
///
/// Decoding the bytes into a displayable image is the front-end's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Entry name inside the archive.
    pub name: String,
    /// Raw image content.
    pub bytes: Vec<u8>,
}

/// Reads every entry of the archive at `path`, sorted by entry name.
///
/// Entry names are zero-padded at build time, so name order is page order.
/// Runs under `spawn_blocking`; the whole archive is held in memory.
///
/// # Errors
///
/// Returns [`ArchiveError`] if the file cannot be opened or is not a readable
/// zip container.
#[instrument(fields(path = %path.display()))]
pub async fn read_pages(path: &Path) -> Result<Vec<Page>, ArchiveError> {
    let path = path.to_path_buf();
    let path_for_task_err = path.clone();

    let pages = tokio::task::spawn_blocking(move || {
        let file = File::open(&path).map_err(|e| ArchiveError::io(&path, e))?;
        let mut archive = ZipArchive::new(file).map_err(|e| ArchiveError::zip(&path, e))?;

        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();

        let mut pages = Vec::with_capacity(names.len());
        for name in names {
            let mut entry = archive
                .by_name(&name)
                .map_err(|e| ArchiveError::zip(&path, e))?;
            let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
            entry
                .read_to_end(&mut bytes)
                .map_err(|e| ArchiveError::io(&path, e))?;
            pages.push(Page { name, bytes });
        }
        Ok(pages)
    })
    .await
    .map_err(|_| ArchiveError::task(path_for_task_err))??;

    debug!(page_count = pages.len(), "archive pages loaded");
    Ok(pages)
}
