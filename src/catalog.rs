//! Read-only queries over the image folders.
//!
//! Nothing is cached: every call lists the directory again, so the answers
//! always reflect what the importer or the upload service has written since
//! the previous tick. Missing or unreadable folders read as empty.

use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::transform::is_frame_file;

/// Frame files in `folder`, ordered by file name.
///
/// The order is stable between calls as long as the folder content does not
/// change, which is what the playback cursor relies on.
pub fn all_files(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = list(folder)
        .into_iter()
        .filter(|(path, meta)| meta.is_file() && is_frame_file(path))
        .map(|(path, _)| path)
        .collect();
    files.sort();
    files
}

/// Frame file in `folder` with the greatest creation time.
pub fn most_recent_file(folder: &Path) -> Option<PathBuf> {
    let newest = list(folder)
        .into_iter()
        .filter(|(path, meta)| meta.is_file() && is_frame_file(path))
        .max_by_key(|(path, meta)| (created(meta), path.clone()))
        .map(|(path, _)| path);
    if newest.is_none() {
        debug!(folder = %folder.display(), "no frame files found");
    }
    newest
}

/// Subdirectory of `root` with the greatest creation time.
pub fn most_recent_subfolder(root: &Path) -> Option<PathBuf> {
    let newest = list(root)
        .into_iter()
        .filter(|(_, meta)| meta.is_dir())
        .max_by_key(|(path, meta)| (created(meta), path.clone()))
        .map(|(path, _)| path);
    if newest.is_none() {
        debug!(root = %root.display(), "no folders found");
    }
    newest
}

fn list(dir: &Path) -> Vec<(PathBuf, Metadata)> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %dir.display(), error = %err, "cannot list directory");
            return Vec::new();
        }
    };
    entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            // Follow symlinks so linked folders and files count.
            fs::metadata(&path).ok().map(|meta| (path, meta))
        })
        .collect()
}

fn created(meta: &Metadata) -> SystemTime {
    meta.created()
        .or_else(|_| meta.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}
