//! Artifact naming scheme.
//!
//! Every captured page lives under two names inside its job directory:
//! - a content filename derived from the capture instant
//!   (`20261019134501123.tiff`), written once and never renamed;
//! - a link filename (`3.tiff`), a symbolic link pointing at the content
//!   file. Renumbering a job only touches links.
//!
//! The previews of a page sit next to its content file with
//! [`PREVIEW_SUFFIX`] (list size) or [`DETAIL_PREVIEW_SUFFIX`] appended.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use log::{debug, warn};

use crate::error_handling::types::InventoryError;
use crate::storage::inventory;
use crate::storage::types::PageFormat;

pub const PREVIEW_SUFFIX: &str = ".thumbnail";
pub const DETAIL_PREVIEW_SUFFIX: &str = ".detail.thumbnail";

/// Millisecond resolution, 17 digits.
const CONTENT_STAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";

pub const CONTENT_STAMP_LEN: usize = 17;

/// Fixed-width digit string for the given instant.
pub fn content_stem<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format(CONTENT_STAMP_FORMAT).to_string()
}

pub fn content_filename<Tz: TimeZone>(now: &DateTime<Tz>, format: PageFormat) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("{}.{}", content_stem(now), format.extension())
}

pub fn link_filename(index: u32, format: PageFormat) -> String {
    format!("{}.{}", index, format.extension())
}

/// Part of a link filename before the first `.`.
pub fn link_stem(link_filename: &str) -> &str {
    link_filename.split('.').next().unwrap_or(link_filename)
}

pub fn link_index(link_filename: &str) -> Option<u32> {
    link_stem(link_filename).parse().ok()
}

pub fn preview_path(content_path: &Path) -> PathBuf {
    with_suffix(content_path, PREVIEW_SUFFIX)
}

pub fn detail_preview_path(content_path: &Path) -> PathBuf {
    with_suffix(content_path, DETAIL_PREVIEW_SUFFIX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// True when `name` can be used as a single path segment.
pub fn is_valid_segment(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Next free sequence position in a job: highest existing index plus one.
///
/// Link names whose prefix is not an integer are skipped.
pub fn next_link_index(job_dir: &Path) -> Result<u32, InventoryError> {
    let images = inventory::list_images(job_dir)?;
    let mut highest = 0u32;
    for image in &images {
        match link_index(&image.link_filename) {
            Some(index) => highest = highest.max(index),
            None => warn!(
                "Skipping non numeric link {} in {}",
                image.link_filename,
                job_dir.display()
            ),
        }
    }
    debug!(
        "{} image(s) in {}, next index {}",
        images.len(),
        job_dir.display(),
        highest + 1
    );
    Ok(highest + 1)
}

/// Resolves a link filename to the path of its content file.
pub fn resolve_link(job_dir: &Path, link_filename: &str) -> Result<PathBuf, InventoryError> {
    if !is_valid_segment(link_filename) {
        return Err(InventoryError::InvalidName(link_filename.to_string()));
    }
    let link = job_dir.join(link_filename);
    let meta = fs::symlink_metadata(&link).map_err(|e| InventoryError::io(&link, e))?;
    if !meta.file_type().is_symlink() {
        return Err(InventoryError::NotALink(link));
    }
    let target = fs::read_link(&link).map_err(|e| InventoryError::io(&link, e))?;
    let target = if target.is_absolute() {
        target
    } else {
        job_dir.join(target)
    };
    if !target.exists() {
        return Err(InventoryError::DanglingLink(link));
    }
    Ok(target)
}
