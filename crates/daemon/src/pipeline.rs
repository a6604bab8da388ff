//! Per-file encode pipeline and the outer watch loop.
//!
//! Files are processed strictly one at a time:
//! `Discovered → DimensionsProbed → GeometryPlanned → Encoding → Encoded →
//! Remuxing → Remuxed → Cleaned`, with `Failed` reachable from every step.
//! A failure is always local to its file; the sweep moves on to the next one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use anyhow::Result;
use log::{debug, error, info, warn};
use uuid::Uuid;
use crate::config::EncoderConfig;
use crate::crop_detect;
use crate::error::PipelineError;
use crate::ffprobe;
use crate::geometry::{CropMode, GeometryMode, GeometryPlan};
use crate::job::{EncodeJob, EncodeJobBuilder};
use crate::natural_order::sort_naturally;
use crate::progress::{PipelineStage, ProgressObserver, ProgressState};
use crate::prune::prune_empty_dirs;
use crate::runner::ToolRunner;
use crate::scan::{self, StabilitySet, StabilityWatcher};
use crate::sidecar;

/// Lines of tool stderr kept in error reports
const STDERR_TAIL_LINES: usize = 20;

/// How a single file left the pipeline
#[derive(Debug)]
pub enum FileOutcome {
    Cleaned {
        output: PathBuf,
        /// Input directories removed after the source was deleted
        pruned: Vec<PathBuf>,
    },
    Failed(PipelineError),
}

/// Counts for one sweep over the stable set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub stable: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Excluded by a skip marker or an unchanged earlier failure
    pub skipped: usize,
}

/// Why [`Pipeline::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The input directory held no media files at the very first check
    NoInput,
}

/// Drives stable files through probe, encode, remux and cleanup
pub struct Pipeline<R: ToolRunner> {
    config: EncoderConfig,
    runner: R,
    watcher: StabilityWatcher,
    observers: Vec<Box<dyn ProgressObserver>>,
    /// Failed sources and their size at failure time; retried once the size changes
    failed: HashMap<PathBuf, u64>,
}

impl<R: ToolRunner> Pipeline<R> {
    pub fn new(config: EncoderConfig, runner: R) -> Self {
        let watcher = StabilityWatcher::new(&config.watch);
        Pipeline {
            config,
            runner,
            watcher,
            observers: Vec::new(),
            failed: HashMap::new(),
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn ProgressObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Sources currently remembered as failed
    pub fn failed_sources(&self) -> impl Iterator<Item = &PathBuf> {
        self.failed.keys()
    }

    /// Watch, drain, repeat. Only returns early when there is no input at startup.
    pub async fn run(&mut self) -> Result<RunExit> {
        let initial = scan::media_files(&self.config.input_dir, &self.config.watch)?;
        if initial.is_empty() {
            info!("No media files found in {}", self.config.input_dir.display());
            return Ok(RunExit::NoInput);
        }
        info!("Found {} media file(s) in {}", initial.len(), self.config.input_dir.display());

        loop {
            match self.run_once().await {
                Ok(summary) if summary.processed > 0 => {
                    info!(
                        "Sweep summary: {} succeeded, {} failed, {} skipped, {} awaiting a changed source",
                        summary.succeeded,
                        summary.failed,
                        summary.skipped,
                        self.failed_sources().count()
                    );
                    // More may have arrived while encoding; watch again right away
                    continue;
                }
                Ok(_) => debug!("Nothing to do, sleeping {}s", self.config.watch.poll_interval.as_secs()),
                Err(e) => warn!("Watch cycle failed: {:#}", e),
            }
            tokio::time::sleep(self.config.watch.poll_interval).await;
        }
    }

    /// One watch cycle followed by one sweep over the stable files
    pub async fn run_once(&mut self) -> Result<SweepSummary> {
        let stable = self.watcher.watch(&self.config.input_dir).await?;
        Ok(self.sweep(&stable).await)
    }

    /// Process every eligible stable media file in natural order
    pub async fn sweep(&mut self, stable: &StabilitySet) -> SweepSummary {
        let mut summary = SweepSummary {
            stable: stable.len(),
            ..Default::default()
        };

        // Forget failures whose source is gone
        self.failed.retain(|path, _| stable.contains(path));

        let mut files = Vec::new();
        for path in stable.iter().filter(|p| self.config.watch.is_media(p)) {
            if sidecar::has_skip_marker(path) {
                debug!("Skip marker present: {}", path.display());
                summary.skipped += 1;
            } else if self.failed_unchanged(path) {
                debug!("Previously failed and unchanged: {}", path.display());
                summary.skipped += 1;
            } else {
                files.push(path.clone());
            }
        }
        sort_naturally(&mut files);

        if files.is_empty() {
            return summary;
        }

        let pass_id = Uuid::new_v4();
        let total = files.len();
        info!("Pass {}: processing {} file(s)", pass_id, total);

        for (i, source) in files.iter().enumerate() {
            let mut progress = ProgressState::new(pass_id, source, i + 1, total);
            self.notify(&progress);

            summary.processed += 1;
            match self.process_file(source, &mut progress).await {
                FileOutcome::Cleaned { .. } => {
                    self.failed.remove(source);
                    summary.succeeded += 1;
                }
                FileOutcome::Failed(e) => {
                    self.record_failure(source, &e);
                    progress.advance(PipelineStage::Failed {
                        kind: e.kind().to_string(),
                        reason: e.to_string(),
                    });
                    self.notify(&progress);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Pass {}: finished, {} succeeded, {} failed",
            pass_id, summary.succeeded, summary.failed
        );
        summary
    }

    /// Run one file through the whole state machine
    pub async fn process_file(&self, source: &Path, progress: &mut ProgressState) -> FileOutcome {
        match self.try_process_file(source, progress).await {
            Ok((output, pruned)) => FileOutcome::Cleaned { output, pruned },
            Err(e) => FileOutcome::Failed(e),
        }
    }

    async fn try_process_file(
        &self,
        source: &Path,
        progress: &mut ProgressState,
    ) -> Result<(PathBuf, Vec<PathBuf>), PipelineError> {
        let tools = &self.config.tools;

        let dims = ffprobe::probe_dimensions(&self.runner, tools, source).await?;
        self.advance(progress, PipelineStage::DimensionsProbed);

        let plan = self.plan_geometry(source, dims).await?;
        debug!(
            "{}: {}x{} -> {}x{} (crop {:?}, scale {}, pad {:?})",
            source.display(),
            plan.source_width,
            plan.source_height,
            plan.output_width,
            plan.output_height,
            plan.crop,
            plan.scale,
            plan.padding
        );
        self.advance(progress, PipelineStage::GeometryPlanned);

        let job = EncodeJobBuilder::new(&self.config).build(source, &plan)?;
        if let Some(out_dir) = job.output_path.parent() {
            tokio::fs::create_dir_all(out_dir)
                .await
                .map_err(|e| PipelineError::io(out_dir, e))?;
        }

        self.advance(progress, PipelineStage::Encoding);
        self.encode(&job).await?;
        self.advance(progress, PipelineStage::Encoded);

        self.advance(progress, PipelineStage::Remuxing);
        self.remux(&job).await?;
        self.advance(progress, PipelineStage::Remuxed);

        let pruned = self.clean_up(&job).await?;
        self.advance(progress, PipelineStage::Cleaned);

        Ok((job.output_path, pruned))
    }

    async fn plan_geometry(&self, source: &Path, dims: ffprobe::Dimensions) -> Result<GeometryPlan, PipelineError> {
        match self.config.geometry {
            GeometryMode::Cap(cap) => GeometryPlan::capped(source, dims.width, dims.height, &cap),
            GeometryMode::Reframe { crop, aspect } => {
                let crop = match crop {
                    CropMode::Off => None,
                    CropMode::Fixed(b) => Some(b),
                    CropMode::Auto => {
                        crop_detect::detect_crop(&self.runner, &self.config.tools, source, dims).await?
                    }
                };
                GeometryPlan::reframe(source, dims.width, dims.height, crop, aspect)
            }
        }
    }

    async fn encode(&self, job: &EncodeJob) -> Result<(), PipelineError> {
        let ffmpeg = &self.config.tools.ffmpeg;
        info!("Encoding {} -> {}", job.source.display(), job.temp_path.display());
        debug!("ffmpeg command: {} {}", ffmpeg.display(), job.encode_args.join(" "));

        let failure = match self.runner.run(ffmpeg, &job.encode_args).await {
            Ok(output) if output.success() => return Ok(()),
            Ok(output) => {
                error!("ffmpeg failed with exit code {} for {}", output.exit_code, job.source.display());
                PipelineError::Encode {
                    path: job.source.clone(),
                    exit_code: output.exit_code,
                    stderr: output.stderr_tail(STDERR_TAIL_LINES),
                }
            }
            Err(e) => PipelineError::Encode {
                path: job.source.clone(),
                exit_code: -1,
                stderr: format!("failed to execute {}: {}", ffmpeg.display(), e),
            },
        };

        // A partial encode is never merged; drop it
        if job.temp_path.exists() {
            match tokio::fs::remove_file(&job.temp_path).await {
                Ok(()) => info!("🗑️  Deleted temp file after encode failure: {}", job.temp_path.display()),
                Err(e) => warn!("Failed to delete temp file {}: {}", job.temp_path.display(), e),
            }
        }
        Err(failure)
    }

    async fn remux(&self, job: &EncodeJob) -> Result<(), PipelineError> {
        let mkvmerge = &self.config.tools.mkvmerge;
        info!("Remuxing {} -> {}", job.temp_path.display(), job.output_path.display());
        debug!("mkvmerge command: {} {}", mkvmerge.display(), job.remux_args.join(" "));

        // Temp file stays on failure so it can be inspected
        match self.runner.run(mkvmerge, &job.remux_args).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => {
                error!("mkvmerge failed with exit code {} for {}", output.exit_code, job.source.display());
                Err(PipelineError::Remux {
                    path: job.source.clone(),
                    exit_code: output.exit_code,
                    stderr: output.stderr_tail(STDERR_TAIL_LINES),
                })
            }
            Err(e) => Err(PipelineError::Remux {
                path: job.source.clone(),
                exit_code: -1,
                stderr: format!("failed to execute {}: {}", mkvmerge.display(), e),
            }),
        }
    }

    /// Delete temp and source, then prune emptied input directories
    async fn clean_up(&self, job: &EncodeJob) -> Result<Vec<PathBuf>, PipelineError> {
        tokio::fs::remove_file(&job.temp_path)
            .await
            .map_err(|e| PipelineError::io(&job.temp_path, e))?;
        tokio::fs::remove_file(&job.source)
            .await
            .map_err(|e| PipelineError::io(&job.source, e))?;
        info!("🗑️  Deleted source {}", job.source.display());

        if let Err(e) = sidecar::remove_why_txt(&job.source) {
            warn!("{:#}", e);
        }

        let Some(parent) = job.source.parent() else {
            return Ok(Vec::new());
        };
        match prune_empty_dirs(parent, &self.config.input_dir, &self.config.watch.media_extensions) {
            Ok(pruned) => Ok(pruned),
            Err(e) => {
                // Source is already gone; a leftover directory is not a file failure
                warn!("Failed to prune {}: {:#}", parent.display(), e);
                Ok(Vec::new())
            }
        }
    }

    fn failed_unchanged(&self, path: &Path) -> bool {
        match (self.failed.get(path), std::fs::metadata(path)) {
            (Some(size), Ok(meta)) => *size == meta.len(),
            _ => false,
        }
    }

    fn record_failure(&mut self, source: &Path, e: &PipelineError) {
        error!("Skipping {}: {}", source.display(), e);
        let size = std::fs::metadata(source).map(|m| m.len()).unwrap_or(0);
        self.failed.insert(source.to_path_buf(), size);

        if self.config.write_reason_files && source.exists() {
            if let Err(err) = sidecar::write_why_txt(source, &format!("{}: {}", e.kind(), e)) {
                warn!("{:#}", err);
            }
        }
    }

    fn advance(&self, progress: &mut ProgressState, stage: PipelineStage) {
        progress.advance(stage);
        self.notify(progress);
    }

    fn notify(&self, progress: &ProgressState) {
        for observer in &self.observers {
            observer.on_progress(progress);
        }
    }
}
