use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use std::fs;

/// Check if a user-placed skip marker (.skip) exists for a source file
pub fn has_skip_marker(file_path: &Path) -> bool {
    skip_marker_path(file_path).exists()
}

/// Get the path to the skip marker file for a given source file
pub fn skip_marker_path(file_path: &Path) -> PathBuf {
    file_path.with_extension("skip")
}

/// Get the path to the why.txt file for a given source file
pub fn why_txt_path(file_path: &Path) -> PathBuf {
    file_path.with_extension("why.txt")
}

/// Write a why.txt file explaining why a source was not encoded
pub fn write_why_txt(file_path: &Path, reason: &str) -> Result<()> {
    let why_path = why_txt_path(file_path);
    fs::write(&why_path, format!("{}\n", reason))
        .with_context(|| format!("Failed to write why.txt: {}", why_path.display()))?;
    Ok(())
}

/// Remove a stale why.txt left by an earlier failed attempt
pub fn remove_why_txt(file_path: &Path) -> Result<()> {
    let why_path = why_txt_path(file_path);
    match fs::remove_file(&why_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove why.txt: {}", why_path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_paths() {
        let src = Path::new("/in/Show/Episode 01.mkv");
        assert_eq!(skip_marker_path(src), PathBuf::from("/in/Show/Episode 01.skip"));
        assert_eq!(why_txt_path(src), PathBuf::from("/in/Show/Episode 01.why.txt"));
    }

    #[test]
    fn test_write_and_remove_why_txt() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("movie.mkv");
        std::fs::write(&src, b"data").unwrap();

        assert!(!has_skip_marker(&src));
        write_why_txt(&src, "encode failed (exit code 1)").unwrap();
        let note = std::fs::read_to_string(why_txt_path(&src)).unwrap();
        assert_eq!(note.trim(), "encode failed (exit code 1)");

        remove_why_txt(&src).unwrap();
        assert!(!why_txt_path(&src).exists());
        // already gone is fine
        remove_why_txt(&src).unwrap();

        std::fs::write(skip_marker_path(&src), "").unwrap();
        assert!(has_skip_marker(&src));
    }
}
