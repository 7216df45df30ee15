//! Directory inventory: jobs under the output root and pages inside a job.
//!
//! Listing never takes a lock. A capture running concurrently may or may not
//! be visible depending on how far its pipeline has progressed.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, info, warn};

use crate::error_handling::types::InventoryError;
use crate::storage::naming;
use crate::storage::types::{ImageEntry, JobEntry, PageFormat};

/// Path of a job directory. The name is used verbatim as one path segment.
pub fn job_dir(output_root: &Path, name: &str) -> Result<PathBuf, InventoryError> {
    if !naming::is_valid_segment(name) {
        return Err(InventoryError::InvalidName(name.to_string()));
    }
    Ok(output_root.join(name))
}

/// Creates the job directory if needed and returns its path.
pub fn create_job(output_root: &Path, name: &str) -> Result<PathBuf, InventoryError> {
    let dir = job_dir(output_root, name)?;
    fs::create_dir_all(&dir).map_err(|e| InventoryError::io(&dir, e))?;
    debug!("Job directory ready: {}", dir.display());
    Ok(dir)
}

/// Job directories, most recently modified first.
pub fn list_jobs(output_root: &Path) -> Result<Vec<JobEntry>, InventoryError> {
    let entries = fs::read_dir(output_root).map_err(|e| InventoryError::io(output_root, e))?;
    let mut jobs = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", output_root.display(), e);
                continue;
            }
        };
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Cannot stat {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if !meta.is_dir() {
            continue;
        }
        jobs.push(JobEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    jobs.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
    debug!("Found {} job(s) in {}", jobs.len(), output_root.display());
    Ok(jobs)
}

pub fn rename_job(output_root: &Path, from: &str, to: &str) -> Result<PathBuf, InventoryError> {
    let source = job_dir(output_root, from)?;
    let target = job_dir(output_root, to)?;
    if !source.is_dir() {
        return Err(InventoryError::JobNotFound(from.to_string()));
    }
    if target.exists() {
        return Err(InventoryError::JobExists(to.to_string()));
    }
    fs::rename(&source, &target).map_err(|e| InventoryError::io(&source, e))?;
    info!("Renamed job {} to {}", from, to);
    Ok(target)
}

/// Removes a job and everything it contains.
pub fn delete_job(output_root: &Path, name: &str) -> Result<(), InventoryError> {
    let dir = job_dir(output_root, name)?;
    if !dir.is_dir() {
        return Err(InventoryError::JobNotFound(name.to_string()));
    }
    fs::remove_dir_all(&dir).map_err(|e| InventoryError::io(&dir, e))?;
    info!("Deleted job {}", name);
    Ok(())
}

/// Pages of a job in capture order.
///
/// Only symbolic links whose target carries a supported extension are
/// returned; plain files (content files, previews, temporaries) are ignored.
/// Ordering is by the link's own modification time, oldest first, with the
/// numeric index as tie-breaker.
pub fn list_images(job_dir: &Path) -> Result<Vec<ImageEntry>, InventoryError> {
    let entries = fs::read_dir(job_dir).map_err(|e| InventoryError::io(job_dir, e))?;
    let mut images = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", job_dir.display(), e);
                continue;
            }
        };
        // DirEntry::metadata does not follow symlinks
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Cannot stat {}: {}", entry.path().display(), e);
                continue;
            }
        };
        if !meta.file_type().is_symlink() {
            continue;
        }
        let link_path = entry.path();
        let target = match fs::read_link(&link_path) {
            Ok(target) => target,
            Err(e) => {
                warn!("Cannot read link {}: {}", link_path.display(), e);
                continue;
            }
        };
        let Some(format) = target
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(PageFormat::from_extension)
        else {
            continue;
        };
        if !job_dir.join(&target).exists() {
            warn!(
                "Link {} points at missing file {}",
                link_path.display(),
                target.display()
            );
        }
        let link_filename = entry.file_name().to_string_lossy().into_owned();
        images.push(ImageEntry {
            link_name: naming::link_stem(&link_filename).to_string(),
            content_filename: target.to_string_lossy().into_owned(),
            link_filename,
            format,
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    images.sort_by(capture_order);
    Ok(images)
}

fn capture_order(a: &ImageEntry, b: &ImageEntry) -> Ordering {
    a.modified
        .cmp(&b.modified)
        .then_with(|| match (a.index(), b.index()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.link_filename.cmp(&b.link_filename))
}
