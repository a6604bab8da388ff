pub mod codec;
pub mod config;
pub mod crop_detect;
pub mod error;
pub mod ffprobe;
pub mod geometry;
pub mod job;
pub mod natural_order;
pub mod pipeline;
pub mod progress;
pub mod prune;
pub mod runner;
pub mod scan;
pub mod sidecar;

pub use config::{EncoderConfig, EncoderSettings};
pub use error::{ConfigError, PipelineError};
pub use geometry::GeometryPlan;
pub use job::{EncodeJob, EncodeJobBuilder};
pub use pipeline::{FileOutcome, Pipeline, RunExit, SweepSummary};
pub use progress::{JsonLinesObserver, LogObserver, PipelineStage, ProgressObserver, ProgressState};
pub use runner::{ProcessRunner, ToolOutput, ToolRunner};
pub use scan::{StabilitySet, StabilityWatcher};
