//! Blocking helpers for local directory trees.
//!
//! Callers run these through `tokio::task::spawn_blocking`.

use std::path::{Path, PathBuf};

use coldvault_core::{ArchiveError, ArchiveResult};
use walkdir::WalkDir;

/// Total size in bytes of all regular files under `path`.
pub fn directory_size(path: &Path) -> ArchiveResult<u64> {
    let mut total = 0u64;
    for entry in WalkDir::new(path) {
        let entry = entry.map_err(|e| walk_error(e, path))?;
        if entry.file_type().is_file() {
            let metadata = entry.metadata().map_err(|e| walk_error(e, path))?;
            total += metadata.len();
        }
    }
    Ok(total)
}

/// Copies the tree rooted at `src` to `dst`, creating `dst` and any parents.
pub fn copy_directory(src: &Path, dst: &Path) -> ArchiveResult<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| walk_error(e, src))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| ArchiveError::internal(e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// All regular files under `root`, as (`/`-joined relative path, absolute path) pairs.
pub fn list_files(root: &Path) -> ArchiveResult<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(e, root))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| ArchiveError::internal(e.to_string()))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.push((relative, entry.path().to_path_buf()));
    }
    Ok(files)
}

fn walk_error(err: walkdir::Error, root: &Path) -> ArchiveError {
    let path = err.path().unwrap_or(root).to_path_buf();
    match err.into_io_error() {
        Some(io) => ArchiveError::from_io(io, &path),
        None => ArchiveError::internal(format!("filesystem loop under `{}`", path.display())),
    }
}
