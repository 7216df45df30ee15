//! Crash-safe writes and removals inside a job directory.
//!
//! Content files are written to a temporary file in the same directory,
//! flushed, and then linked into place without clobbering: an existing
//! content file is never overwritten. Derived files (previews, settings) are
//! replaced atomically with a rename. Nothing here takes a lock; atomicity
//! comes from the filesystem primitives.

use std::fs::{self, File};
use std::io::{self, Write};
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use tempfile::NamedTempFile;

use crate::error_handling::types::{InventoryError, PersistError};
use crate::storage::naming;
use crate::storage::types::PageFormat;

/// Attempts at finding a free timestamp name before giving up.
const NAME_ATTEMPTS: usize = 50;

/// What [`delete_image`] removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedImage {
    pub link: PathBuf,
    pub content: Option<PathBuf>,
    pub preview_removed: bool,
}

/// Persists raw page bytes under a fresh timestamp-derived name.
///
/// Returns the content filename (relative to `job_dir`). On a name collision
/// the already-written temporary file is retried under the next instant.
pub fn write_content(
    job_dir: &Path,
    format: PageFormat,
    bytes: &[u8],
) -> Result<String, PersistError> {
    write_content_at(job_dir, format, bytes, Local::now)
}

/// [`write_content`] with the clock supplied by the caller.
pub fn write_content_at<F>(
    job_dir: &Path,
    format: PageFormat,
    bytes: &[u8],
    mut now: F,
) -> Result<String, PersistError>
where
    F: FnMut() -> DateTime<Local>,
{
    let mut tmp = NamedTempFile::new_in(job_dir).map_err(|e| {
        error!("Failed to create temporary file in {}: {}", job_dir.display(), e);
        PersistError::io(job_dir, e)
    })?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| {
            error!("Failed to write {}: {}", tmp.path().display(), e);
            PersistError::io(tmp.path(), e)
        })?;

    for _ in 0..NAME_ATTEMPTS {
        let name = naming::content_filename(&now(), format);
        let path = job_dir.join(&name);
        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                sync_dir(job_dir);
                info!("Wrote {} byte(s) to {}", bytes.len(), path.display());
                return Ok(name);
            }
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!("Content name {} taken, retrying", name);
                tmp = err.file;
                thread::sleep(Duration::from_millis(1));
            }
            Err(err) => {
                error!("Failed to persist {}: {}", path.display(), err.error);
                return Err(PersistError::io(path, err.error));
            }
        }
    }
    Err(PersistError::NameExhausted(job_dir.to_path_buf()))
}

/// Creates `job_dir/link_filename` pointing at `content_filename`.
pub fn create_link(
    job_dir: &Path,
    link_filename: &str,
    content_filename: &str,
) -> Result<PathBuf, PersistError> {
    if !naming::is_valid_segment(link_filename) {
        return Err(InventoryError::InvalidName(link_filename.to_string()).into());
    }
    let link = job_dir.join(link_filename);
    symlink(content_filename, &link).map_err(|e| {
        error!(
            "Cannot link {} -> {}: {}",
            link.display(),
            content_filename,
            e
        );
        PersistError::io(&link, e)
    })?;
    sync_dir(job_dir);
    debug!("Linked {} -> {}", link.display(), content_filename);
    Ok(link)
}

/// Atomically replaces `path` with `bytes`.
///
/// Readers see either the previous file or the complete new one.
pub fn write_replace(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Removes a page: its content file, its link and its preview.
///
/// A missing preview is not an error. A dangling link is still removed.
pub fn delete_image(job_dir: &Path, link_filename: &str) -> Result<RemovedImage, PersistError> {
    let link = job_dir.join(link_filename);
    let content = match naming::resolve_link(job_dir, link_filename) {
        Ok(content) => Some(content),
        Err(InventoryError::DanglingLink(_)) => {
            warn!("Removing dangling link {}", link.display());
            None
        }
        Err(e) => return Err(e.into()),
    };

    let mut preview_removed = false;
    if let Some(ref content) = content {
        fs::remove_file(content).map_err(|e| {
            error!("Failed to delete {}: {}", content.display(), e);
            PersistError::io(content, e)
        })?;
        preview_removed = remove_previews(content)?;
    } else if let Ok(target) = fs::read_link(&link) {
        preview_removed = remove_previews(&job_dir.join(target))?;
    }

    fs::remove_file(&link).map_err(|e| {
        error!("Failed to delete link {}: {}", link.display(), e);
        PersistError::io(&link, e)
    })?;
    sync_dir(job_dir);
    info!("Deleted image {} from {}", link_filename, job_dir.display());

    Ok(RemovedImage {
        link,
        content,
        preview_removed,
    })
}

/// Both preview sizes; true when at least one existed.
fn remove_previews(content: &Path) -> Result<bool, PersistError> {
    let list = remove_if_exists(&naming::preview_path(content))?;
    let detail = remove_if_exists(&naming::detail_preview_path(content))?;
    Ok(list || detail)
}

fn remove_if_exists(path: &Path) -> Result<bool, PersistError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No preview at {}", path.display());
            Ok(false)
        }
        Err(e) => Err(PersistError::io(path, e)),
    }
}

/// Best effort: flush directory entries so renames survive a crash.
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!("Directory sync failed for {}: {}", dir.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::inventory;
    use chrono::TimeZone;
    use regex::Regex;
    use tempfile::TempDir;

    #[test]
    fn content_is_written_under_timestamp_name() {
        let dir = TempDir::new().unwrap();
        let name = write_content(dir.path(), PageFormat::Tiff, b"B1").unwrap();
        let pattern = Regex::new(r"^\d{17}\.tiff$").unwrap();
        assert!(pattern.is_match(&name), "unexpected name {}", name);
        assert_eq!(fs::read(dir.path().join(&name)).unwrap(), b"B1");
    }

    #[test]
    fn rapid_writes_never_overwrite() {
        let dir = TempDir::new().unwrap();
        let mut names = Vec::new();
        for i in 0..5u8 {
            names.push(write_content(dir.path(), PageFormat::Png, &[i]).unwrap());
        }
        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), names.len());
        for (i, name) in names.iter().enumerate() {
            assert_eq!(fs::read(dir.path().join(name)).unwrap(), vec![i as u8]);
        }
        // no temporaries left behind
        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with(".tmp")
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn timestamp_collision_takes_a_fresh_instant() {
        let dir = TempDir::new().unwrap();
        let first = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let taken = naming::content_filename(&first, PageFormat::Tiff);
        fs::write(dir.path().join(&taken), b"earlier page").unwrap();

        // the first two readings hit the existing file
        let later = first + chrono::Duration::milliseconds(1);
        let mut ticks = vec![first, first, later].into_iter();
        let clock = move || ticks.next().unwrap_or(later);
        let name = write_content_at(dir.path(), PageFormat::Tiff, b"new page", clock).unwrap();

        assert_ne!(name, taken);
        assert_eq!(name, "20260304050607001.tiff");
        assert_eq!(fs::read(dir.path().join(&taken)).unwrap(), b"earlier page");
        assert_eq!(fs::read(dir.path().join(&name)).unwrap(), b"new page");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn frozen_clock_exhausts_names_without_overwriting() {
        let dir = TempDir::new().unwrap();
        let instant = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let taken = naming::content_filename(&instant, PageFormat::Png);
        fs::write(dir.path().join(&taken), b"keep me").unwrap();

        assert!(matches!(
            write_content_at(dir.path(), PageFormat::Png, b"lost", || instant),
            Err(PersistError::NameExhausted(_))
        ));
        assert_eq!(fs::read(dir.path().join(&taken)).unwrap(), b"keep me");
        // the temporary file is dropped with the error
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn link_makes_page_visible() {
        let dir = TempDir::new().unwrap();
        let name = write_content(dir.path(), PageFormat::Jpeg, b"jpeg").unwrap();
        assert!(inventory::list_images(dir.path()).unwrap().is_empty());

        create_link(dir.path(), "1.jpeg", &name).unwrap();
        let images = inventory::list_images(dir.path()).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].content_filename, name);

        assert!(matches!(
            create_link(dir.path(), "1.jpeg", &name),
            Err(PersistError::Io { .. })
        ));
    }

    #[test]
    fn write_replace_swaps_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.thumbnail");
        write_replace(&path, b"first").unwrap();
        write_replace(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn delete_removes_content_link_and_preview() {
        let dir = TempDir::new().unwrap();
        let name = write_content(dir.path(), PageFormat::Png, b"png").unwrap();
        create_link(dir.path(), "1.png", &name).unwrap();
        let preview = naming::preview_path(&dir.path().join(&name));
        let detail = naming::detail_preview_path(&dir.path().join(&name));
        fs::write(&preview, b"thumb").unwrap();
        fs::write(&detail, b"large thumb").unwrap();

        let removed = delete_image(dir.path(), "1.png").unwrap();
        assert!(removed.preview_removed);
        assert!(!dir.path().join(&name).exists());
        assert!(!preview.exists());
        assert!(!detail.exists());
        assert!(fs::symlink_metadata(dir.path().join("1.png")).is_err());
    }

    #[test]
    fn delete_without_preview_succeeds() {
        let dir = TempDir::new().unwrap();
        let name = write_content(dir.path(), PageFormat::Tiff, b"tiff").unwrap();
        create_link(dir.path(), "1.tiff", &name).unwrap();

        let removed = delete_image(dir.path(), "1.tiff").unwrap();
        assert!(!removed.preview_removed);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn delete_cleans_up_dangling_link() {
        let dir = TempDir::new().unwrap();
        symlink("20260101000000000.png", dir.path().join("1.png")).unwrap();
        let removed = delete_image(dir.path(), "1.png").unwrap();
        assert_eq!(removed.content, None);
        assert!(fs::symlink_metadata(dir.path().join("1.png")).is_err());
    }

    #[test]
    fn delete_unknown_link_fails() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            delete_image(dir.path(), "9.png"),
            Err(PersistError::Inventory(InventoryError::Io { .. }))
        ));
    }
}
