use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems. Raised before the watch loop starts; no file
/// is discovered or probed once one of these has been returned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported codec '{0}' (expected one of: h264, h265, hevc, vp9, av1)")]
    UnsupportedCodec(String),

    #[error("tune '{tune}' is not available for codec {codec} (allowed: {allowed})")]
    TuneNotAllowed {
        codec: String,
        tune: String,
        allowed: String,
    },

    #[error("speed '{speed}' is not available for codec {codec} (allowed: {allowed})")]
    SpeedNotAllowed {
        codec: String,
        speed: String,
        allowed: String,
    },

    #[error("invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Conflict(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Per-file failures. Every variant is local to one file: the orchestrator
/// reports it, skips the file and carries on with the next one.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("probe failed for {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("invalid geometry for {path}: {width}x{height}")]
    InvalidGeometry {
        path: PathBuf,
        width: i64,
        height: i64,
    },

    #[error("encode failed for {path} (exit code {exit_code}): {stderr}")]
    Encode {
        path: PathBuf,
        exit_code: i32,
        stderr: String,
    },

    #[error("remux failed for {path} (exit code {exit_code}): {stderr}")]
    Remux {
        path: PathBuf,
        exit_code: i32,
        stderr: String,
    },

    #[error("filesystem error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn probe(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::Probe {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-friendly label used in progress reports and sidecar notes.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Probe { .. } => "probe",
            PipelineError::InvalidGeometry { .. } => "invalid-geometry",
            PipelineError::Encode { .. } => "encode",
            PipelineError::Remux { .. } => "remux",
            PipelineError::Io { .. } => "io",
        }
    }
}
