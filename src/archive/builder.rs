//! Archive builder: packages fetched assets into one ordered zip container.
//!
//! Writes are atomic from the caller's perspective: the container is built at
//! a `.part` path next to the destination and renamed into place only after a
//! successful finish. On any error the partial file is removed and the
//! destination is untouched.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::error::ArchiveError;
use super::entry_name;
use crate::fetch::ImageAsset;

/// Writes `assets` to a zip archive at `dest` and returns the final file size
/// in bytes.
///
/// Entries are written in sequence order and named via [`entry_name`], so
/// iterating the container in name order reproduces the input order exactly.
/// The zip work is CPU-bound and runs under `spawn_blocking`.
///
/// # Errors
///
/// Returns [`ArchiveError`] if the temporary file cannot be written or the
/// rename into place fails. No file is left at `dest` on failure.
#[instrument(skip(assets), fields(dest = %dest.display(), asset_count = assets.len()))]
pub async fn write_archive(
    mut assets: Vec<ImageAsset>,
    dest: &Path,
) -> Result<u64, ArchiveError> {
    assets.sort_unstable_by_key(|asset| asset.sequence_index);

    let dest = dest.to_path_buf();
    let dest_for_task_err = dest.clone();
    let part_path = part_path_for(&dest);

    let size = tokio::task::spawn_blocking(move || {
        let result = build_at(&assets, &part_path);
        if result.is_err() {
            // Never leave a partial container behind.
            let _ = std::fs::remove_file(&part_path);
            return result;
        }

        std::fs::rename(&part_path, &dest).map_err(|e| {
            let _ = std::fs::remove_file(&part_path);
            ArchiveError::io(&dest, e)
        })?;

        let size = std::fs::metadata(&dest)
            .map_err(|e| ArchiveError::io(&dest, e))?
            .len();
        Ok(size)
    })
    .await
    .map_err(|_| ArchiveError::task(dest_for_task_err))??;

    debug!(bytes = size, "archive written");
    Ok(size)
}

/// Temp path in the destination directory so the final rename stays on one
/// filesystem.
fn part_path_for(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Builds the zip container at `path`, returning the bytes written.
fn build_at(assets: &[ImageAsset], path: &Path) -> Result<u64, ArchiveError> {
    let file = File::create(path).map_err(|e| ArchiveError::io(path, e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for asset in assets {
        zip.start_file(entry_name(asset.sequence_index), options)
            .map_err(|e| ArchiveError::zip(path, e))?;
        zip.write_all(&asset.bytes)
            .map_err(|e| ArchiveError::io(path, e))?;
    }

    let file = zip.finish().map_err(|e| ArchiveError::zip(path, e))?;
    let size = file.metadata().map_err(|e| ArchiveError::io(path, e))?.len();
    Ok(size)
}
