//! Image fetch pipeline: bounded-concurrency retrieval of a chapter's images.
//!
//! Given an ordered list of remote image locators, the pipeline retrieves as
//! many as it can with a fixed-width worker pool and reports one status line
//! per attempt. Ordering of the output is derived from locator position,
//! never from network completion order.

mod error;
mod pipeline;

pub use error::FetchError;
pub use pipeline::{FetchReport, ImageAsset, MAX_IN_FLIGHT, fetch_chapter_images};
