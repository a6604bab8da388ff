use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use sysinfo::{CpuRefreshKind, RefreshKind, System};
use crate::codec::Codec;
use crate::error::ConfigError;
use crate::geometry::{AspectRatio, CropBox, CropMode, GeometryMode, ResolutionCap};

/// Media file extensions tracked by default
pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "webm", "m4v", "mov"];

/// Divisor applied to the allowed core share when deriving encoder threads
const CORES_PER_ENCODER_THREAD: f64 = 4.5;

/// A numeric setting that may be written as a number or a string in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
}

impl RawNumber {
    fn parse(&self, field: &'static str) -> Result<f64, ConfigError> {
        match self {
            RawNumber::Number(n) => Ok(*n),
            RawNumber::Text(s) => s
                .trim()
                .trim_end_matches('%')
                .parse::<f64>()
                .map_err(|_| ConfigError::invalid(field, s.clone(), "not a number")),
        }
    }
}

/// Settings exactly as written in the configuration file.
///
/// Nothing here is trusted; [`EncoderSettings::validate`] turns it into an
/// [`EncoderConfig`] or a [`ConfigError`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Directory watched for arriving media files
    pub input_dir: PathBuf,
    /// Directory receiving remuxed output, mirroring the input layout
    pub output_dir: PathBuf,
    pub codec: String,
    pub tune: Option<String>,
    /// Preset/speed; codec default when unset
    pub speed: Option<String>,
    /// CRF value
    pub quality: RawNumber,
    /// `off`, `auto`, or `left,right,top,bottom`
    pub crop: String,
    /// Target aspect ratio such as `16:9`; unset keeps the cropped aspect
    pub aspect: Option<String>,
    /// `off`, `1080p`, `720p` or `WxH` (one side may be `auto`)
    pub resolution_cap: String,
    /// `auto` or a maximum CPU percentage such as `50`
    pub cpu: RawNumber,
    /// Explicit encoder thread count, passed through unchanged
    pub threads: Option<u32>,
    /// Extra encoder arguments appended verbatim after the built-in ones
    pub extra_args: Vec<String>,
    /// Substrings in source names replaced by the codec display name
    pub replace_substrings: Vec<String>,
    /// Substrings removed from source names
    pub remove_substrings: Vec<String>,
    pub media_extensions: Vec<String>,
    /// Delay between the two size probes of a stability check
    pub settle_interval_ms: u64,
    /// Share of available parallelism used for stability probes
    pub probe_pool_fraction: f64,
    /// Sleep between watch cycles when nothing new has arrived
    pub poll_interval_secs: u64,
    pub ffprobe_bin: PathBuf,
    pub ffmpeg_bin: PathBuf,
    pub mkvmerge_bin: PathBuf,
    /// Extension of remuxed output files
    pub container_extension: String,
    /// JSON-lines progress file, if any
    pub status_file: Option<PathBuf>,
    /// Write `<name>.why.txt` next to sources that failed
    pub write_reason_files: bool,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            codec: "h265".to_string(),
            tune: None,
            speed: None,
            quality: RawNumber::Number(20.0),
            crop: "off".to_string(),
            aspect: None,
            resolution_cap: "off".to_string(),
            cpu: RawNumber::Text("auto".to_string()),
            threads: None,
            extra_args: Vec::new(),
            replace_substrings: ["HEVC", "AVC", "H.265", "H.264", "h264", "h265", "x264", "x265"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            remove_substrings: vec!["REMUX".to_string()],
            media_extensions: DEFAULT_MEDIA_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            settle_interval_ms: 2500,
            probe_pool_fraction: 0.5,
            poll_interval_secs: 10,
            ffprobe_bin: PathBuf::from("ffprobe"),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            mkvmerge_bin: PathBuf::from("mkvmerge"),
            container_extension: "mkv".to_string(),
            status_file: None,
            write_reason_files: true,
        }
    }
}

impl EncoderSettings {
    /// Load settings from a file, or return defaults if no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                // TOML by extension, JSON otherwise
                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    settings = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    settings = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            } else {
                anyhow::bail!("Config file does not exist: {}", config_path.display());
            }
        }

        Ok(settings)
    }

    /// Validate everything once and freeze it into an [`EncoderConfig`]
    pub fn validate(&self) -> Result<EncoderConfig, ConfigError> {
        let codec: Codec = self.codec.parse()?;
        let profile = codec.profile();
        let tune = profile.check_tune(self.tune.as_deref())?;
        let speed = profile.check_speed(self.speed.as_deref())?;
        let quality = profile.check_quality(self.quality.parse("quality")?)?;

        let geometry = self.geometry_mode()?;

        if !(self.probe_pool_fraction > 0.0 && self.probe_pool_fraction <= 1.0) {
            return Err(ConfigError::invalid(
                "probe_pool_fraction",
                self.probe_pool_fraction.to_string(),
                "must be in (0, 1]",
            ));
        }
        if self.media_extensions.is_empty() {
            return Err(ConfigError::invalid("media_extensions", "[]", "at least one extension is required"));
        }
        if self.container_extension.trim().is_empty() {
            return Err(ConfigError::invalid("container_extension", "", "must not be empty"));
        }
        check_directories(&self.input_dir, &self.output_dir)?;

        let cores = available_cores();
        let cpu = self.cpu_directive(cores)?;
        let probe_workers = (cores as f64 * self.probe_pool_fraction).floor().max(1.0) as usize;

        Ok(EncoderConfig {
            input_dir: self.input_dir.clone(),
            output_dir: self.output_dir.clone(),
            codec,
            tune,
            speed,
            quality,
            geometry,
            cpu,
            extra_args: self.extra_args.clone(),
            naming: NamingRules::new(
                &self.replace_substrings,
                &self.remove_substrings,
                profile.display_name,
            )?,
            watch: WatchSettings {
                settle_interval: Duration::from_millis(self.settle_interval_ms),
                probe_workers,
                poll_interval: Duration::from_secs(self.poll_interval_secs),
                media_extensions: self
                    .media_extensions
                    .iter()
                    .map(|e| e.trim_start_matches('.').to_lowercase())
                    .collect(),
            },
            tools: ToolPaths {
                ffprobe: self.ffprobe_bin.clone(),
                ffmpeg: self.ffmpeg_bin.clone(),
                mkvmerge: self.mkvmerge_bin.clone(),
            },
            container_extension: self.container_extension.trim_start_matches('.').to_string(),
            status_file: self.status_file.clone(),
            write_reason_files: self.write_reason_files,
        })
    }

    fn geometry_mode(&self) -> Result<GeometryMode, ConfigError> {
        let crop = match self.crop.trim().to_lowercase().as_str() {
            "" | "off" | "none" => CropMode::Off,
            "auto" => CropMode::Auto,
            _ => CropMode::Fixed(self.crop.parse::<CropBox>()?),
        };
        let aspect = match self.aspect.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(a) => Some(a.parse::<AspectRatio>()?),
        };

        match ResolutionCap::parse(&self.resolution_cap)? {
            Some(cap) => {
                if crop != CropMode::Off || aspect.is_some() {
                    return Err(ConfigError::Conflict(
                        "resolution_cap cannot be combined with crop or aspect; pick one geometry flow".to_string(),
                    ));
                }
                Ok(GeometryMode::Cap(cap))
            }
            None => Ok(GeometryMode::Reframe { crop, aspect }),
        }
    }

    fn cpu_directive(&self, cores: usize) -> Result<CpuDirective, ConfigError> {
        let automatic = matches!(&self.cpu, RawNumber::Text(s) if s.trim().eq_ignore_ascii_case("auto"));

        match (self.threads, automatic) {
            (Some(_), false) => Err(ConfigError::Conflict(
                "set either threads or a cpu percentage, not both".to_string(),
            )),
            (Some(0), true) => Err(ConfigError::invalid("threads", "0", "must be at least 1")),
            (Some(n), true) => Ok(CpuDirective::Threads(n)),
            (None, true) => Ok(CpuDirective::Automatic),
            (None, false) => {
                let percent = self.cpu.parse("cpu")?;
                if !(percent > 0.0 && percent <= 100.0) {
                    return Err(ConfigError::invalid("cpu", percent.to_string(), "percentage must be in (0, 100]"));
                }
                Ok(CpuDirective::Threads(threads_for_percentage(cores, percent)))
            }
        }
    }
}

/// Case-insensitive literal match for one naming rule; empty rules are dropped
fn literal_patterns(field: &'static str, values: &[String]) -> Result<Vec<Regex>, ConfigError> {
    values
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| {
            RegexBuilder::new(&regex::escape(s))
                .case_insensitive(true)
                .build()
                .map_err(|e| ConfigError::invalid(field, s.clone(), e.to_string()))
        })
        .collect()
}

/// Input and output must differ and must not contain one another, otherwise
/// output files would be picked up as new input or pruned away.
fn check_directories(input: &Path, output: &Path) -> Result<(), ConfigError> {
    let absolute = |p: &Path| {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            std::env::current_dir().map(|cwd| cwd.join(p)).unwrap_or_else(|_| p.to_path_buf())
        }
    };
    let (input_abs, output_abs) = (absolute(input), absolute(output));
    if input_abs.starts_with(&output_abs) || output_abs.starts_with(&input_abs) {
        return Err(ConfigError::Conflict(format!(
            "input_dir ({}) and output_dir ({}) must be separate directory trees",
            input.display(),
            output.display()
        )));
    }
    Ok(())
}

/// Number of logical CPUs, via sysinfo with a std fallback
pub fn available_cores() -> usize {
    let sys = System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::everything()));
    match sys.cpus().len() {
        0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        n => n,
    }
}

/// Encoder threads for a maximum CPU percentage: `max(1, floor(cores * pct / 100 / 4.5))`
pub fn threads_for_percentage(cores: usize, percent: f64) -> u32 {
    ((cores as f64 * (percent / 100.0)) / CORES_PER_ENCODER_THREAD)
        .floor()
        .max(1.0) as u32
}

/// How many threads the encoder may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CpuDirective {
    /// Leave it to the encoder; no thread argument is emitted
    Automatic,
    Threads(u32),
}

/// Output filename substitution rules, compiled once
#[derive(Debug, Clone)]
pub struct NamingRules {
    pub replace: Vec<Regex>,
    pub remove: Vec<Regex>,
    pub display_name: String,
}

impl NamingRules {
    pub fn new(replace: &[String], remove: &[String], display_name: &str) -> Result<Self, ConfigError> {
        Ok(NamingRules {
            replace: literal_patterns("replace_substrings", replace)?,
            remove: literal_patterns("remove_substrings", remove)?,
            display_name: display_name.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub settle_interval: Duration,
    pub probe_workers: usize,
    pub poll_interval: Duration,
    /// Lowercase, without the leading dot
    pub media_extensions: Vec<String>,
}

impl WatchSettings {
    pub fn is_media(&self, path: &Path) -> bool {
        is_tracked_media(path, &self.media_extensions)
    }
}

/// Case-insensitive extension match against a lowercase extension list
pub fn is_tracked_media(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub ffprobe: PathBuf,
    pub ffmpeg: PathBuf,
    pub mkvmerge: PathBuf,
}

/// Validated, immutable configuration for the whole run
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub codec: Codec,
    pub tune: Option<String>,
    pub speed: String,
    pub quality: f64,
    pub geometry: GeometryMode,
    pub cpu: CpuDirective,
    pub extra_args: Vec<String>,
    pub naming: NamingRules,
    pub watch: WatchSettings,
    pub tools: ToolPaths,
    pub container_extension: String,
    pub status_file: Option<PathBuf>,
    pub write_reason_files: bool,
}

impl EncoderConfig {
    /// CRF formatted for the command line (`20`, not `20.0`)
    pub fn quality_arg(&self) -> String {
        if self.quality.fract() == 0.0 {
            format!("{}", self.quality as i64)
        } else {
            format!("{}", self.quality)
        }
    }
}
