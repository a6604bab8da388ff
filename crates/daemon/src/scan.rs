use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use walkdir::{DirEntry, WalkDir};
use crate::config::WatchSettings;

/// Paths whose size did not change across two probes one settle interval apart
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StabilitySet {
    paths: BTreeSet<PathBuf>,
}

impl StabilitySet {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Every regular file under `root`, skipping dot-prefixed files and directories
pub fn scan_files(root: &Path) -> Result<BTreeSet<PathBuf>> {
    if !root.is_dir() {
        anyhow::bail!("Input directory does not exist: {}", root.display());
    }

    let mut files = BTreeSet::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error reading directory entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() {
            files.insert(entry.into_path());
        }
    }
    Ok(files)
}

/// Tracked media files under `root`
pub fn media_files(root: &Path, watch: &WatchSettings) -> Result<Vec<PathBuf>> {
    Ok(scan_files(root)?
        .into_iter()
        .filter(|p| watch.is_media(p))
        .collect())
}

/// Stable-file check: stat twice with a delay in between
async fn probe_stable(path: &Path, settle_interval: Duration) -> std::io::Result<bool> {
    let size0 = tokio::fs::metadata(path).await?.len();
    tokio::time::sleep(settle_interval).await;
    let size1 = tokio::fs::metadata(path).await?.len();
    Ok(size0 == size1)
}

/// Waits until every file under a directory has stopped growing
pub struct StabilityWatcher {
    settle_interval: Duration,
    workers: usize,
}

impl StabilityWatcher {
    pub fn new(settings: &WatchSettings) -> Self {
        StabilityWatcher {
            settle_interval: settings.settle_interval,
            workers: settings.probe_workers.max(1),
        }
    }

    /// Block until all files currently under `root` are stable.
    ///
    /// Each round rescans the tree and probes only files not yet confirmed, at most
    /// `workers` at a time. A confirmed file is never probed again within one call.
    /// Files that arrive during the wait join the next round, so the call only
    /// returns once the confirmed set covers everything in the final scan.
    pub async fn watch(&self, root: &Path) -> Result<StabilitySet> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut stable: BTreeSet<PathBuf> = BTreeSet::new();
        let mut round = 0usize;

        loop {
            let candidates = scan_files(root)
                .with_context(|| format!("Failed to scan {}", root.display()))?;
            // Files removed since the last round no longer count
            stable.retain(|p| candidates.contains(p));

            let pending: Vec<PathBuf> = candidates.difference(&stable).cloned().collect();
            if pending.is_empty() {
                debug!("{} file(s) stable under {} after {} round(s)", stable.len(), root.display(), round);
                return Ok(StabilitySet { paths: stable });
            }

            round += 1;
            if round == 1 {
                info!("Checking stability of {} file(s) under {}", pending.len(), root.display());
            } else {
                debug!("Stability round {}: {} file(s) pending", round, pending.len());
            }

            let mut tasks = JoinSet::new();
            for path in pending {
                let semaphore = Arc::clone(&semaphore);
                let settle_interval = self.settle_interval;
                tasks.spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            return (path, Err(std::io::Error::new(std::io::ErrorKind::Other, e)))
                        }
                    };
                    let result = probe_stable(&path, settle_interval).await;
                    (path, result)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((path, Ok(true))) => {
                        stable.insert(path);
                    }
                    Ok((path, Ok(false))) => {
                        debug!("Still being written: {}", path.display());
                    }
                    Ok((path, Err(e))) => {
                        // Usually removed or renamed between the scan and the probe
                        debug!("Could not stat {}: {}", path.display(), e);
                    }
                    Err(e) => warn!("Stability probe task failed: {}", e),
                }
            }
        }
    }
}
