use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a file currently is in the per-file pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PipelineStage {
    Discovered,
    DimensionsProbed,
    GeometryPlanned,
    Encoding,
    Encoded,
    Remuxing,
    Remuxed,
    Cleaned,
    /// Terminal; `kind` is the error category
    Failed { kind: String, reason: String },
}

/// Snapshot handed to observers after every transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressState {
    /// Identifies one sweep over the stable files
    pub pass_id: Uuid,
    pub file: PathBuf,
    /// 1-based position in the sweep
    pub index: usize,
    pub total: usize,
    #[serde(flatten)]
    pub stage: PipelineStage,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressState {
    pub fn new(pass_id: Uuid, file: &Path, index: usize, total: usize) -> Self {
        let now = Utc::now();
        ProgressState {
            pass_id,
            file: file.to_path_buf(),
            index,
            total,
            stage: PipelineStage::Discovered,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn advance(&mut self, stage: PipelineStage) {
        self.stage = stage;
        self.updated_at = Utc::now();
    }
}

/// Receives progress after each state transition
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, state: &ProgressState);
}

/// Logs every transition through the `log` facade
#[derive(Debug, Default)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_progress(&self, state: &ProgressState) {
        match &state.stage {
            PipelineStage::Failed { kind, reason } => warn!(
                "Pass {}: [{}/{}] {} failed ({}): {}",
                state.pass_id,
                state.index,
                state.total,
                state.file.display(),
                kind,
                reason
            ),
            PipelineStage::Cleaned => info!(
                "Pass {}: [{}/{}] ✅ {} done in {}s",
                state.pass_id,
                state.index,
                state.total,
                state.file.display(),
                (state.updated_at - state.started_at).num_seconds()
            ),
            stage => info!(
                "Pass {}: [{}/{}] {} -> {:?}",
                state.pass_id,
                state.index,
                state.total,
                state.file.display(),
                stage
            ),
        }
    }
}

/// Appends one JSON object per transition to a status file
pub struct JsonLinesObserver {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesObserver {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create status directory: {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open status file: {}", path.display()))?;
        Ok(JsonLinesObserver {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }
}

impl ProgressObserver for JsonLinesObserver {
    fn on_progress(&self, state: &ProgressState) {
        let line = match serde_json::to_string(state) {
            Ok(l) => l,
            Err(e) => {
                warn!("Failed to serialize progress: {}", e);
                return;
            }
        };
        let mut file = match self.file.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(file, "{}", line) {
            warn!("Failed to write status file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_lines_observer_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status/progress.jsonl");
        let observer = JsonLinesObserver::create(&path).unwrap();

        let mut state = ProgressState::new(Uuid::new_v4(), Path::new("/in/a.mkv"), 1, 2);
        observer.on_progress(&state);
        state.advance(PipelineStage::Failed {
            kind: "encode".to_string(),
            reason: "exit code 1".to_string(),
        });
        observer.on_progress(&state);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["stage"], "discovered");
        assert_eq!(first["index"], 1);

        let second: ProgressState = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.pass_id, state.pass_id);
        assert!(matches!(second.stage, PipelineStage::Failed { ref kind, .. } if kind == "encode"));
    }
}
