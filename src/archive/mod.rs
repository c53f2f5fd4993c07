//! Chapter archives: building, validating, caching, and reading `.cbz` files.
//!
//! A chapter archive is a zip container whose entries are named so that
//! lexicographic name order equals fetch-sequence order. Validity is a size
//! heuristic only: a file at or below [`VALIDITY_THRESHOLD`] bytes is treated
//! as corrupt and deleted before any rebuild.

mod builder;
mod cache;
mod error;
mod reader;

pub use builder::write_archive;
pub use cache::{Acquisition, AcquireError, ArchiveCache};
pub use error::ArchiveError;
pub use reader::{Page, read_pages};

/// Minimum archive size in bytes; anything at or below this is corrupt.
pub const VALIDITY_THRESHOLD: u64 = 1024;

/// File extension for chapter archives.
pub const ARCHIVE_EXT: &str = "cbz";

use crate::chapter::ChapterNumber;

/// Entry name for the image at `sequence_index`.
///
/// Zero-padded so lexicographic order of names equals sequence order.
#[must_use]
pub fn entry_name(sequence_index: usize) -> String {
    format!("image_{:03}.jpg", sequence_index + 1)
}

/// Canonical archive filename for `(series, number)`.
#[must_use]
pub fn archive_filename(series: &str, number: ChapterNumber) -> String {
    format!("{series}_Chapter_{number}.{ARCHIVE_EXT}")
}

/// Turns a catalog series title into the filename-safe series key used in
/// archive names and the progress file.
///
/// Typographic punctuation is normalized to ASCII, filesystem-reserved and
/// control characters are dropped, and whitespace runs collapse to a single
/// underscore.
#[must_use]
pub fn sanitize_series_name(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut prev_sep = false;
    for ch in title.trim().chars() {
        let mapped = match ch {
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2018}' | '\u{2019}' => '\'',
            c if c.is_whitespace() => '_',
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '\u{201C}' | '\u{201D}' => {
                continue;
            }
            c if c.is_control() => continue,
            c => c,
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    out.trim_matches('_').to_string()
}
