use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use log::{debug, info};
use walkdir::WalkDir;
use crate::config::is_tracked_media;

/// True if `dir` (recursively) still holds a file with a tracked media extension
pub fn contains_media(dir: &Path, extensions: &[String]) -> bool {
    WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .any(|e| e.file_type().is_file() && is_tracked_media(e.path(), extensions))
}

/// Remove `start` and its ancestors while they hold no tracked media.
///
/// Stops at the first directory that still contains a media file, or at
/// `stop_at`, which is never removed. Leftover non-media files (sidecars,
/// artwork, nfo files) are removed together with their directory.
/// Returns the removed directories, innermost first.
pub fn prune_empty_dirs(start: &Path, stop_at: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    let mut current = start.to_path_buf();

    // Never walk outside the tree we were given
    if !current.starts_with(stop_at) {
        debug!("Not pruning {}: outside {}", current.display(), stop_at.display());
        return Ok(removed);
    }

    while current != stop_at {
        if !current.is_dir() {
            // Already gone; keep walking up
        } else if contains_media(&current, extensions) {
            debug!("Stopping prune at {}: still contains media", current.display());
            break;
        } else {
            std::fs::remove_dir_all(&current)
                .with_context(|| format!("Failed to remove directory: {}", current.display()))?;
            info!("Removed empty directory: {}", current.display());
            removed.push(current.clone());
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> {
        vec!["mkv".to_string(), "mp4".to_string()]
    }

    #[test]
    fn test_prunes_empty_branch_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("a/b")).unwrap();
        std::fs::create_dir_all(root.join("c")).unwrap();
        std::fs::write(root.join("c/x.mkv"), b"video").unwrap();

        let removed = prune_empty_dirs(&root.join("a/b"), root, &exts()).unwrap();

        assert_eq!(removed, vec![root.join("a/b"), root.join("a")]);
        assert!(!root.join("a").exists());
        assert!(root.join("c/x.mkv").exists());
        assert!(root.exists());
    }

    #[test]
    fn test_leftovers_are_removed_with_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("Show/Season 1")).unwrap();
        std::fs::write(root.join("Show/Season 1/poster.jpg"), b"img").unwrap();
        std::fs::write(root.join("Show/Season 1/e01.nfo"), b"nfo").unwrap();
        std::fs::write(root.join("Show/e00.MP4"), b"video").unwrap();

        let removed = prune_empty_dirs(&root.join("Show/Season 1"), root, &exts()).unwrap();

        assert_eq!(removed, vec![root.join("Show/Season 1")]);
        assert!(root.join("Show/e00.MP4").exists());
    }

    #[test]
    fn test_stop_dir_is_kept_even_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        assert!(prune_empty_dirs(root, root, &exts()).unwrap().is_empty());
        assert!(root.exists());
    }

    #[test]
    fn test_outside_stop_dir_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let removed = prune_empty_dirs(other.path(), dir.path(), &exts()).unwrap();
        assert!(removed.is_empty());
        assert!(other.path().exists());
    }
}
