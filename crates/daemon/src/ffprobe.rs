use std::path::Path;
use log::debug;
use serde::Deserialize;
use crate::config::ToolPaths;
use crate::error::PipelineError;
use crate::runner::ToolRunner;

/// Subset of ffprobe JSON output we care about
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FFProbeData {
    #[serde(default)]
    pub streams: Vec<FFProbeStream>,
    pub format: Option<FFProbeFormat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeStream {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeFormat {
    /// ffprobe reports duration as a decimal string
    pub duration: Option<String>,
}

/// Source frame size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

async fn run_ffprobe(
    runner: &dyn ToolRunner,
    tools: &ToolPaths,
    file_path: &Path,
    args: Vec<String>,
) -> Result<FFProbeData, PipelineError> {
    // Verify file exists before trying to probe
    if !file_path.exists() {
        return Err(PipelineError::probe(file_path, "file does not exist"));
    }

    let output = runner
        .run(&tools.ffprobe, &args)
        .await
        .map_err(|e| PipelineError::probe(file_path, format!("failed to execute {}: {}", tools.ffprobe.display(), e)))?;

    if !output.success() {
        return Err(PipelineError::probe(
            file_path,
            format!("ffprobe exit code {}: {}", output.exit_code, output.stderr_tail(5)),
        ));
    }

    parse_probe_json(&output.stdout).map_err(|e| PipelineError::probe(file_path, e))
}

/// Parse ffprobe JSON; the error is a human-readable reason
pub fn parse_probe_json(json: &str) -> Result<FFProbeData, String> {
    serde_json::from_str(json).map_err(|e| format!("unparsable ffprobe output: {}", e))
}

/// Width and height of the first video stream
pub async fn probe_dimensions(
    runner: &dyn ToolRunner,
    tools: &ToolPaths,
    file_path: &Path,
) -> Result<Dimensions, PipelineError> {
    let args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-select_streams".to_string(),
        "v:0".to_string(),
        "-show_entries".to_string(),
        "stream=width,height".to_string(),
        "-of".to_string(),
        "json".to_string(),
        file_path.to_string_lossy().to_string(),
    ];
    let data = run_ffprobe(runner, tools, file_path, args).await?;
    let dims = dimensions_from(&data).map_err(|reason| PipelineError::probe(file_path, reason))?;
    debug!("{}: {}x{}", file_path.display(), dims.width, dims.height);
    Ok(dims)
}

pub fn dimensions_from(data: &FFProbeData) -> Result<Dimensions, String> {
    let stream = data.streams.first().ok_or_else(|| "no video stream".to_string())?;
    match (stream.width, stream.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => Ok(Dimensions { width, height }),
        (width, height) => Err(format!("missing or zero dimensions ({:?}x{:?})", width, height)),
    }
}

/// Container duration in seconds
pub async fn probe_duration(
    runner: &dyn ToolRunner,
    tools: &ToolPaths,
    file_path: &Path,
) -> Result<f64, PipelineError> {
    let args = vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "json".to_string(),
        file_path.to_string_lossy().to_string(),
    ];
    let data = run_ffprobe(runner, tools, file_path, args).await?;
    duration_from(&data).map_err(|reason| PipelineError::probe(file_path, reason))
}

pub fn duration_from(data: &FFProbeData) -> Result<f64, String> {
    let raw = data
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .ok_or_else(|| "no duration reported".to_string())?;
    match raw.trim().parse::<f64>() {
        Ok(d) if d.is_finite() && d > 0.0 => Ok(d),
        _ => Err(format!("invalid duration '{}'", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dimensions() {
        let data = parse_probe_json(r#"{"programs": [], "streams": [{"width": 1920, "height": 800}]}"#).unwrap();
        assert_eq!(dimensions_from(&data).unwrap(), Dimensions { width: 1920, height: 800 });
    }

    #[test]
    fn test_missing_stream_or_dimensions() {
        let data = parse_probe_json(r#"{"streams": []}"#).unwrap();
        assert!(dimensions_from(&data).is_err());

        let data = parse_probe_json(r#"{"streams": [{"width": 1920}]}"#).unwrap();
        assert!(dimensions_from(&data).is_err());

        let data = parse_probe_json(r#"{"streams": [{"width": 0, "height": 0}]}"#).unwrap();
        assert!(dimensions_from(&data).is_err());
    }

    #[test]
    fn test_garbage_output_is_rejected() {
        assert!(parse_probe_json("1920x800").is_err());
        assert!(parse_probe_json("").is_err());
    }

    #[test]
    fn test_parse_duration() {
        let data = parse_probe_json(r#"{"format": {"duration": "5400.123000"}}"#).unwrap();
        assert!((duration_from(&data).unwrap() - 5400.123).abs() < 1e-6);

        let data = parse_probe_json(r#"{"format": {"duration": "N/A"}}"#).unwrap();
        assert!(duration_from(&data).is_err());

        let data = parse_probe_json(r#"{"format": {}}"#).unwrap();
        assert!(duration_from(&data).is_err());
    }
}
