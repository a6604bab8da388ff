use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::error::ConfigError;

/// Supported output video codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    H264,
    H265,
    Vp9,
    Av1,
}

/// Static per-codec encoder profile.
///
/// Everything codec-dependent lives here so validation and argument building
/// look it up once instead of branching on the codec all over the place.
#[derive(Debug)]
pub struct CodecProfile {
    pub codec: Codec,
    /// FFmpeg encoder name passed to `-c:v`
    pub encoder: &'static str,
    /// Name substituted into output filenames
    pub display_name: &'static str,
    /// Allowed `-tune` values (empty = the encoder takes no tune)
    pub tunes: &'static [&'static str],
    /// Flag that carries the speed/preset value
    pub speed_flag: &'static str,
    pub speeds: &'static [&'static str],
    pub default_speed: &'static str,
    /// Inclusive upper bound of the CRF scale (lower bound is always 0)
    pub max_crf: f64,
    /// Fixed tuning arguments, emitted before user-supplied extra arguments
    pub fixed_args: &'static [&'static str],
    pub pix_fmt: Option<&'static str>,
}

const X26X_PRESETS: &[&str] = &[
    "ultrafast", "superfast", "veryfast", "faster", "fast",
    "medium", "slow", "slower", "veryslow", "placebo",
];

const AOM_CPU_USED: &[&str] = &["0", "1", "2", "3", "4", "5", "6", "7", "8"];

static PROFILES: [CodecProfile; 4] = [
    CodecProfile {
        codec: Codec::H264,
        encoder: "libx264",
        display_name: "AVC",
        tunes: &[
            "film", "animation", "grain", "stillimage",
            "fastdecode", "zerolatency", "psnr", "ssim",
        ],
        speed_flag: "-preset",
        speeds: X26X_PRESETS,
        default_speed: "slow",
        max_crf: 51.0,
        fixed_args: &[
            "-bf", "4",
            "-rc-lookahead", "32",
            "-aq-mode", "3",
            "-b-pyramid", "normal",
            "-coder", "1",
        ],
        pix_fmt: None,
    },
    CodecProfile {
        codec: Codec::H265,
        encoder: "libx265",
        display_name: "HEVC",
        tunes: &["grain", "fastdecode", "zerolatency", "psnr", "ssim"],
        speed_flag: "-preset",
        speeds: X26X_PRESETS,
        default_speed: "slow",
        max_crf: 51.0,
        fixed_args: &[],
        pix_fmt: Some("yuv420p10le"),
    },
    CodecProfile {
        codec: Codec::Vp9,
        encoder: "libvpx-vp9",
        display_name: "VP9",
        tunes: &[],
        speed_flag: "-deadline",
        speeds: &["good", "best", "realtime"],
        default_speed: "good",
        max_crf: 63.0,
        // CRF mode in libvpx needs an unconstrained bitrate
        fixed_args: &["-b:v", "0", "-row-mt", "1"],
        pix_fmt: None,
    },
    CodecProfile {
        codec: Codec::Av1,
        encoder: "libaom-av1",
        display_name: "AV1",
        tunes: &["ssim", "psnr"],
        speed_flag: "-cpu-used",
        speeds: AOM_CPU_USED,
        default_speed: "4",
        max_crf: 63.0,
        fixed_args: &[],
        pix_fmt: None,
    },
];

impl Codec {
    pub const ALL: [Codec; 4] = [Codec::H264, Codec::H265, Codec::Vp9, Codec::Av1];

    /// Look up the static profile for this codec
    pub fn profile(self) -> &'static CodecProfile {
        match self {
            Codec::H264 => &PROFILES[0],
            Codec::H265 => &PROFILES[1],
            Codec::Vp9 => &PROFILES[2],
            Codec::Av1 => &PROFILES[3],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::H265 => "h265",
            Codec::Vp9 => "vp9",
            Codec::Av1 => "av1",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Codec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "h264" | "avc" => Ok(Codec::H264),
            "h265" | "hevc" => Ok(Codec::H265),
            "vp9" => Ok(Codec::Vp9),
            "av1" => Ok(Codec::Av1),
            other => Err(ConfigError::UnsupportedCodec(other.to_string())),
        }
    }
}

impl CodecProfile {
    /// Validate an optional tune against the allow-list. Empty strings count as "no tune".
    pub fn check_tune(&self, tune: Option<&str>) -> Result<Option<String>, ConfigError> {
        let tune = match tune.map(|t| t.trim().to_lowercase()) {
            Some(t) if !t.is_empty() => t,
            _ => return Ok(None),
        };
        if self.tunes.contains(&tune.as_str()) {
            Ok(Some(tune))
        } else {
            Err(ConfigError::TuneNotAllowed {
                codec: self.codec.to_string(),
                tune,
                allowed: if self.tunes.is_empty() {
                    "none".to_string()
                } else {
                    self.tunes.join(", ")
                },
            })
        }
    }

    /// Validate the speed/preset, falling back to the codec default when unset
    pub fn check_speed(&self, speed: Option<&str>) -> Result<String, ConfigError> {
        let speed = match speed.map(|s| s.trim().to_lowercase()) {
            Some(s) if !s.is_empty() => s,
            _ => return Ok(self.default_speed.to_string()),
        };
        if self.speeds.contains(&speed.as_str()) {
            Ok(speed)
        } else {
            Err(ConfigError::SpeedNotAllowed {
                codec: self.codec.to_string(),
                speed,
                allowed: self.speeds.join(", "),
            })
        }
    }

    pub fn check_quality(&self, quality: f64) -> Result<f64, ConfigError> {
        if quality.is_finite() && (0.0..=self.max_crf).contains(&quality) {
            Ok(quality)
        } else {
            Err(ConfigError::invalid(
                "quality",
                quality.to_string(),
                format!("{} CRF must be between 0 and {}", self.codec, self.max_crf),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_aliases() {
        assert_eq!("h264".parse::<Codec>().unwrap(), Codec::H264);
        assert_eq!("HEVC".parse::<Codec>().unwrap(), Codec::H265);
        assert_eq!("h265".parse::<Codec>().unwrap(), Codec::H265);
        assert_eq!(" av1 ".parse::<Codec>().unwrap(), Codec::Av1);
        assert!(matches!(
            "mpeg2".parse::<Codec>(),
            Err(ConfigError::UnsupportedCodec(_))
        ));
    }

    #[test]
    fn test_every_codec_has_a_profile() {
        for codec in Codec::ALL {
            let profile = codec.profile();
            assert_eq!(profile.codec, codec);
            assert!(profile.speeds.contains(&profile.default_speed));
        }
    }

    #[test]
    fn test_vp9_has_no_tunes() {
        let profile = Codec::Vp9.profile();
        assert!(matches!(
            profile.check_tune(Some("grain")),
            Err(ConfigError::TuneNotAllowed { .. })
        ));
        assert_eq!(profile.check_tune(Some("")).unwrap(), None);
        assert_eq!(profile.check_tune(None).unwrap(), None);
    }

    #[test]
    fn test_tune_is_case_insensitive() {
        let profile = Codec::H264.profile();
        assert_eq!(profile.check_tune(Some("Grain")).unwrap(), Some("grain".to_string()));
        assert!(profile.check_tune(Some("cartoon")).is_err());
    }

    #[test]
    fn test_speed_defaults_and_allow_list() {
        let x265 = Codec::H265.profile();
        assert_eq!(x265.check_speed(None).unwrap(), "slow");
        assert_eq!(x265.check_speed(Some("veryslow")).unwrap(), "veryslow");
        assert!(x265.check_speed(Some("9")).is_err());

        let aom = Codec::Av1.profile();
        assert_eq!(aom.check_speed(Some("6")).unwrap(), "6");
        assert!(aom.check_speed(Some("slow")).is_err());
    }

    #[test]
    fn test_fixed_args_per_codec() {
        assert_eq!(Codec::Vp9.profile().fixed_args, &["-b:v", "0", "-row-mt", "1"]);
        assert!(Codec::Av1.profile().fixed_args.is_empty());
        assert!(Codec::H265.profile().fixed_args.is_empty());
        assert_eq!(Codec::H264.profile().fixed_args.len(), 10);
    }

    #[test]
    fn test_quality_range() {
        assert!(Codec::H264.profile().check_quality(20.0).is_ok());
        assert!(Codec::H264.profile().check_quality(52.0).is_err());
        assert!(Codec::Av1.profile().check_quality(60.0).is_ok());
        assert!(Codec::Vp9.profile().check_quality(-1.0).is_err());
        assert!(Codec::Vp9.profile().check_quality(f64::NAN).is_err());
    }
}
