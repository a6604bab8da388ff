//! Black bar detection for the `auto` crop mode.
//!
//! Samples a handful of positions across the middle of the source with
//! ffmpeg's `cropdetect` filter and keeps the most common rectangle.

use std::collections::HashMap;
use std::path::Path;
use log::{debug, info, warn};
use crate::config::ToolPaths;
use crate::error::PipelineError;
use crate::ffprobe::{self, Dimensions};
use crate::geometry::{CropBox, CROP_ALIGNMENT};
use crate::runner::ToolRunner;

/// Sample positions as fractions of the duration; skips intros and credits
const SAMPLE_POSITIONS: &[f64] = &[0.15, 0.25, 0.35, 0.45, 0.55, 0.65, 0.75, 0.85];

/// Frames analysed per sample
const FRAMES_PER_SAMPLE: u32 = 10;

/// A `w:h:x:y` rectangle as printed by cropdetect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CropRect {
    pub w: u32,
    pub h: u32,
    pub x: u32,
    pub y: u32,
}

fn parse_rect(value: &str) -> Option<CropRect> {
    let parts: Vec<u32> = value
        .split(':')
        .map(|p| p.parse::<u32>())
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [w, h, x, y] => Some(CropRect { w: *w, h: *h, x: *x, y: *y }),
        _ => None,
    }
}

/// Collect every valid `crop=w:h:x:y` value found in ffmpeg's log output
pub fn parse_crop_lines(output: &str) -> Vec<CropRect> {
    output
        .lines()
        .filter_map(|line| {
            let start = line.find("crop=")? + 5;
            let rest = &line[start..];
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            parse_rect(&rest[..end])
        })
        .collect()
}

/// Most frequent rectangle; ties go to the larger (less aggressive) crop area
pub fn most_common(rects: &[CropRect]) -> Option<CropRect> {
    let mut counts: HashMap<CropRect, usize> = HashMap::new();
    for rect in rects {
        *counts.entry(*rect).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by_key(|(rect, count)| (*count, rect.w as u64 * rect.h as u64, rect.w, rect.h))
        .map(|(rect, _)| rect)
}

/// Detect black bars and return aligned crop offsets, or `None` when no crop is needed
pub async fn detect_crop(
    runner: &dyn ToolRunner,
    tools: &ToolPaths,
    file_path: &Path,
    source: Dimensions,
) -> Result<Option<CropBox>, PipelineError> {
    let duration = ffprobe::probe_duration(runner, tools, file_path).await?;

    let mut rects = Vec::new();
    for position in SAMPLE_POSITIONS {
        let start = duration * position;
        let args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-ss".to_string(),
            format!("{:.2}", start),
            "-i".to_string(),
            file_path.to_string_lossy().to_string(),
            "-frames:v".to_string(),
            FRAMES_PER_SAMPLE.to_string(),
            "-vf".to_string(),
            format!("cropdetect=limit=24:round={}:reset=0", CROP_ALIGNMENT),
            "-an".to_string(),
            "-sn".to_string(),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];
        match runner.run(&tools.ffmpeg, &args).await {
            Ok(output) if output.success() => {
                // cropdetect logs to stderr
                rects.extend(parse_crop_lines(&output.stderr));
            }
            Ok(output) => {
                warn!(
                    "cropdetect sample at {:.1}s failed for {} (exit code {})",
                    start,
                    file_path.display(),
                    output.exit_code
                );
            }
            Err(e) => {
                return Err(PipelineError::probe(
                    file_path,
                    format!("failed to execute {}: {}", tools.ffmpeg.display(), e),
                ));
            }
        }
    }

    let Some(rect) = most_common(&rects) else {
        debug!("No crop detected for {}", file_path.display());
        return Ok(None);
    };

    let crop = CropBox::from_rect(source.width, source.height, rect.w, rect.h, rect.x, rect.y)
        .map(|c| c.aligned(CROP_ALIGNMENT))
        .filter(|c| !c.is_empty());
    match crop {
        Some(c) => info!(
            "Detected crop for {}: left={} right={} top={} bottom={}",
            file_path.display(),
            c.left,
            c.right,
            c.top,
            c.bottom
        ),
        None => info!("No cropping needed for {}", file_path.display()),
    }
    Ok(crop)
}
