use std::path::{Path, PathBuf};
use regex::NoExpand;
use crate::config::{CpuDirective, EncoderConfig, NamingRules};
use crate::error::PipelineError;
use crate::geometry::GeometryPlan;

/// Prefix of the intermediate video-only file
pub const TEMP_PREFIX: &str = "temp_";

/// Fully materialised work for one source file. Built fresh per file and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeJob {
    pub source: PathBuf,
    /// Video-only intermediate written by the encoder
    pub temp_path: PathBuf,
    /// Final remuxed file
    pub output_path: PathBuf,
    /// Encoder arguments (program not included)
    pub encode_args: Vec<String>,
    /// Remux arguments (program not included)
    pub remux_args: Vec<String>,
}

/// Builds encode and remux argument vectors from the run configuration
pub struct EncodeJobBuilder<'a> {
    config: &'a EncoderConfig,
}

impl<'a> EncodeJobBuilder<'a> {
    pub fn new(config: &'a EncoderConfig) -> Self {
        EncodeJobBuilder { config }
    }

    pub fn build(&self, source: &Path, plan: &GeometryPlan) -> Result<EncodeJob, PipelineError> {
        if plan.cropped_width == 0 || plan.cropped_height == 0 || plan.output_width == 0 || plan.output_height == 0 {
            return Err(PipelineError::InvalidGeometry {
                path: source.to_path_buf(),
                width: plan.cropped_width as i64,
                height: plan.cropped_height as i64,
            });
        }

        let file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PipelineError::probe(source, "file name is not valid UTF-8"))?;
        let stem = source
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or(file_name);

        let out_dir = self.output_dir_for(source);
        let temp_path = out_dir.join(format!("{}{}", TEMP_PREFIX, file_name));
        let output_path = out_dir.join(format!(
            "{}.{}",
            output_basename(stem, &self.config.naming),
            self.config.container_extension
        ));

        let encode_args = self.encode_args(source, &temp_path, plan);
        let remux_args = remux_args(source, &temp_path, &output_path);

        Ok(EncodeJob {
            source: source.to_path_buf(),
            temp_path,
            output_path,
            encode_args,
            remux_args,
        })
    }

    /// Output directory mirroring the source's position under the input root
    pub fn output_dir_for(&self, source: &Path) -> PathBuf {
        let relative_parent = source
            .parent()
            .and_then(|p| p.strip_prefix(&self.config.input_dir).ok())
            .unwrap_or_else(|| Path::new(""));
        self.config.output_dir.join(relative_parent)
    }

    fn encode_args(&self, source: &Path, temp_path: &Path, plan: &GeometryPlan) -> Vec<String> {
        let cfg = self.config;
        let profile = cfg.codec.profile();
        let mut args: Vec<String> = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            source.to_string_lossy().to_string(),
        ];

        if let Some(chain) = filter_chain(plan) {
            args.push("-vf".to_string());
            args.push(chain);
        }

        // Video only; audio and subtitles come back in at the remux step
        args.push("-map".to_string());
        args.push("0:v:0".to_string());
        args.push("-c:v".to_string());
        args.push(profile.encoder.to_string());
        args.push(profile.speed_flag.to_string());
        args.push(cfg.speed.clone());
        args.push("-crf".to_string());
        args.push(cfg.quality_arg());

        if let CpuDirective::Threads(n) = cfg.cpu {
            args.push("-threads".to_string());
            args.push(n.to_string());
        }

        if let Some(pix_fmt) = profile.pix_fmt {
            args.push("-pix_fmt".to_string());
            args.push(pix_fmt.to_string());
        }

        args.extend(profile.fixed_args.iter().map(|a| a.to_string()));

        if let Some(tune) = &cfg.tune {
            args.push("-tune".to_string());
            args.push(tune.clone());
        }

        // User arguments last so they override anything above
        args.extend(cfg.extra_args.iter().cloned());

        args.push(temp_path.to_string_lossy().to_string());
        args
    }
}

/// Remux the new video with every non-video stream of the original
pub fn remux_args(source: &Path, temp_path: &Path, output_path: &Path) -> Vec<String> {
    vec![
        "-o".to_string(),
        output_path.to_string_lossy().to_string(),
        temp_path.to_string_lossy().to_string(),
        "--no-video".to_string(),
        source.to_string_lossy().to_string(),
    ]
}

/// Filter chain in fixed order: crop, scale, pad
pub fn filter_chain(plan: &GeometryPlan) -> Option<String> {
    let mut filters = Vec::new();

    if let Some(crop) = plan.crop {
        filters.push(format!(
            "crop=w=iw-{}-{}:h=ih-{}-{}:x={}:y={}",
            crop.left, crop.right, crop.top, crop.bottom, crop.left, crop.top
        ));
    }

    if plan.scale {
        filters.push(format!("scale=w={}:h={}", plan.output_width, plan.output_height));
    }

    if plan.has_padding() {
        filters.push(format!(
            "pad=w={}:h={}:x={}:y={}:color=black",
            plan.output_width, plan.output_height, plan.padding.left, plan.padding.top
        ));
    }

    if filters.is_empty() {
        None
    } else {
        Some(filters.join(","))
    }
}

/// Apply the naming rules to a source stem: all replacements first, then all deletions.
/// Every rule replaces all non-overlapping matches, case-insensitively.
pub fn output_basename(stem: &str, rules: &NamingRules) -> String {
    let replaced = rules.replace.iter().fold(stem.to_string(), |name, pattern| {
        pattern.replace_all(&name, NoExpand(&rules.display_name)).into_owned()
    });
    rules
        .remove
        .iter()
        .fold(replaced, |name, pattern| pattern.replace_all(&name, "").into_owned())
}
