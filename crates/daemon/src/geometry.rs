//! Output geometry planning.
//!
//! Two flows exist and a run uses exactly one of them, chosen by configuration:
//!
//! - **Reframe**: optional crop, then pad (letterbox/pillarbox) or scale down to
//!   reach a target aspect ratio.
//! - **Cap**: scale straight to a resolution cap. No crop, no padding.

use std::path::Path;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::error::{ConfigError, PipelineError};

/// Crop offsets produced by auto-detection are multiples of this
pub const CROP_ALIGNMENT: u32 = 2;

/// Largest output side the cap flow will emit
pub const MAX_OUTPUT_DIMENSION: u64 = 65_536;

/// Pixels removed from each edge of the source frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CropBox {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl CropBox {
    pub fn new(left: u32, right: u32, top: u32, bottom: u32) -> Self {
        CropBox { left, right, top, bottom }
    }

    pub fn is_empty(&self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }

    /// Size left after cropping. Signed because an oversized box yields <= 0.
    pub fn cropped_size(&self, width: u32, height: u32) -> (i64, i64) {
        (
            width as i64 - self.left as i64 - self.right as i64,
            height as i64 - self.top as i64 - self.bottom as i64,
        )
    }

    /// Round every offset down to a multiple of `unit`
    pub fn aligned(self, unit: u32) -> Self {
        let unit = unit.max(1);
        CropBox {
            left: self.left - self.left % unit,
            right: self.right - self.right % unit,
            top: self.top - self.top % unit,
            bottom: self.bottom - self.bottom % unit,
        }
    }

    /// Convert a cropdetect-style `w:h:x:y` rectangle into edge offsets.
    /// Returns `None` when the rectangle does not fit inside the source.
    pub fn from_rect(source_width: u32, source_height: u32, w: u32, h: u32, x: u32, y: u32) -> Option<Self> {
        let right = source_width.checked_sub(x)?.checked_sub(w)?;
        let bottom = source_height.checked_sub(y)?.checked_sub(h)?;
        Some(CropBox::new(x, right, y, bottom))
    }
}

impl FromStr for CropBox {
    type Err = ConfigError;

    /// Parses `left,right,top,bottom`, e.g. `0,0,104,104`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(ConfigError::invalid("crop", s, "expected left,right,top,bottom"));
        }
        let mut values = [0u32; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| ConfigError::invalid("crop", s, format!("'{}' is not a non-negative integer", part)))?;
        }
        Ok(CropBox::new(values[0], values[1], values[2], values[3]))
    }
}

/// Target display aspect ratio, e.g. 16:9
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    pub fn value(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl FromStr for AspectRatio {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(':')
            .ok_or_else(|| ConfigError::invalid("aspect", s, "expected W:H, e.g. 16:9"))?;
        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid("aspect", s, "width is not an integer"))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid("aspect", s, "height is not an integer"))?;
        if width == 0 || height == 0 {
            return Err(ConfigError::invalid("aspect", s, "both sides must be greater than zero"));
        }
        Ok(AspectRatio { width, height })
    }
}

/// One side of a resolution cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimension {
    Fixed(u32),
    /// Derived from the source aspect ratio
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionCap {
    pub width: Dimension,
    pub height: Dimension,
}

impl ResolutionCap {
    /// Parse `off`, `1080p`, `720p`, `WxH`, `Wxauto` or `autoxH`.
    /// `off` (or an empty string) yields `None`.
    pub fn parse(s: &str) -> Result<Option<Self>, ConfigError> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "" | "off" | "none" => return Ok(None),
            "1080p" => {
                return Ok(Some(ResolutionCap {
                    width: Dimension::Fixed(1920),
                    height: Dimension::Auto,
                }))
            }
            "720p" => {
                return Ok(Some(ResolutionCap {
                    width: Dimension::Fixed(1280),
                    height: Dimension::Auto,
                }))
            }
            _ => {}
        }

        let (w, h) = normalized
            .split_once('x')
            .ok_or_else(|| ConfigError::invalid("resolution_cap", s, "expected off, 1080p, 720p or WxH"))?;
        let parse_side = |side: &str| -> Result<Dimension, ConfigError> {
            match side.trim() {
                "auto" => Ok(Dimension::Auto),
                n => match n.parse::<u32>() {
                    Ok(v) if v > 0 => Ok(Dimension::Fixed(v)),
                    _ => Err(ConfigError::invalid("resolution_cap", s, format!("'{}' is not a positive integer or 'auto'", n))),
                },
            }
        };
        let cap = ResolutionCap {
            width: parse_side(w)?,
            height: parse_side(h)?,
        };
        if cap.width == Dimension::Auto && cap.height == Dimension::Auto {
            return Err(ConfigError::invalid("resolution_cap", s, "at most one side may be 'auto'"));
        }
        Ok(Some(cap))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropMode {
    Off,
    Fixed(CropBox),
    /// Detect black bars per file
    Auto,
}

/// Which geometry flow a run uses. Selected once from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryMode {
    Reframe {
        crop: CropMode,
        aspect: Option<AspectRatio>,
    },
    Cap(ResolutionCap),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Padding {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl Padding {
    pub fn is_zero(&self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }
}

/// Result of fitting a cropped frame to an aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectFit {
    pub width: u32,
    pub height: u32,
    pub padding: Padding,
    pub scale: bool,
}

/// Round half to even (banker's rounding): 2.5 -> 2, 3.5 -> 4
fn round_even(value: f64) -> u32 {
    value.round_ties_even().max(0.0) as u32
}

/// Fit a cropped frame to `desired_aspect`.
///
/// Width is held first and the frame is letterboxed if that is tall enough;
/// otherwise height is held and the frame is pillarboxed. When neither fits the
/// frame is scaled down instead. Padding and scaling are never combined, and the
/// odd pixel of a padding split always goes to the bottom/right edge.
pub fn plan(cropped_width: u32, cropped_height: u32, desired_aspect: f64) -> AspectFit {
    let output_width = cropped_width;
    let output_height = round_even(output_width as f64 / desired_aspect);
    if output_height >= cropped_height {
        let top = (output_height - cropped_height) / 2;
        return AspectFit {
            width: output_width,
            height: output_height,
            padding: Padding {
                top,
                bottom: output_height - cropped_height - top,
                ..Padding::default()
            },
            scale: false,
        };
    }

    let output_height = cropped_height;
    let output_width = round_even(output_height as f64 * desired_aspect);
    if output_width >= cropped_width {
        let left = (output_width - cropped_width) / 2;
        return AspectFit {
            width: output_width,
            height: output_height,
            padding: Padding {
                left,
                right: output_width - cropped_width - left,
                ..Padding::default()
            },
            scale: false,
        };
    }

    AspectFit {
        width: cropped_width.min(output_width),
        height: cropped_height.min(output_height),
        padding: Padding::default(),
        scale: true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryFlow {
    Reframe,
    Cap,
}

/// Per-file geometry: crop, scale and pad decisions for one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeometryPlan {
    pub flow: GeometryFlow,
    pub source_width: u32,
    pub source_height: u32,
    pub crop: Option<CropBox>,
    pub cropped_width: u32,
    pub cropped_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub scale: bool,
    pub padding: Padding,
}

impl GeometryPlan {
    /// Crop (if any) then fit to `aspect` (if any)
    pub fn reframe(
        path: &Path,
        source_width: u32,
        source_height: u32,
        crop: Option<CropBox>,
        aspect: Option<AspectRatio>,
    ) -> Result<Self, PipelineError> {
        let crop = crop.filter(|c| !c.is_empty());
        let (width, height) = crop
            .unwrap_or_default()
            .cropped_size(source_width, source_height);
        if width <= 0 || height <= 0 {
            return Err(PipelineError::InvalidGeometry {
                path: path.to_path_buf(),
                width,
                height,
            });
        }
        let (cropped_width, cropped_height) = (width as u32, height as u32);

        let fit = match aspect {
            Some(aspect) => plan(cropped_width, cropped_height, aspect.value()),
            None => AspectFit {
                width: cropped_width,
                height: cropped_height,
                padding: Padding::default(),
                scale: false,
            },
        };

        Ok(GeometryPlan {
            flow: GeometryFlow::Reframe,
            source_width,
            source_height,
            crop,
            cropped_width,
            cropped_height,
            output_width: fit.width,
            output_height: fit.height,
            scale: fit.scale,
            padding: fit.padding,
        })
    }

    /// Scale straight to the cap. An `Auto` side follows the source aspect and is kept even.
    pub fn capped(
        path: &Path,
        source_width: u32,
        source_height: u32,
        cap: &ResolutionCap,
    ) -> Result<Self, PipelineError> {
        if source_width == 0 || source_height == 0 {
            return Err(PipelineError::InvalidGeometry {
                path: path.to_path_buf(),
                width: source_width as i64,
                height: source_height as i64,
            });
        }
        let even = |v: f64| (u64::from(round_even(v / 2.0)) * 2).max(2);
        let (width, height): (u64, u64) = match (cap.width, cap.height) {
            (Dimension::Fixed(w), Dimension::Fixed(h)) => (w.into(), h.into()),
            (Dimension::Fixed(w), Dimension::Auto) => {
                (w.into(), even(source_height as f64 * w as f64 / source_width as f64))
            }
            (Dimension::Auto, Dimension::Fixed(h)) => {
                (even(source_width as f64 * h as f64 / source_height as f64), h.into())
            }
            (Dimension::Auto, Dimension::Auto) => (source_width.into(), source_height.into()),
        };
        if width > MAX_OUTPUT_DIMENSION || height > MAX_OUTPUT_DIMENSION {
            return Err(PipelineError::InvalidGeometry {
                path: path.to_path_buf(),
                width: width as i64,
                height: height as i64,
            });
        }
        let (output_width, output_height) = (width as u32, height as u32);

        Ok(GeometryPlan {
            flow: GeometryFlow::Cap,
            source_width,
            source_height,
            crop: None,
            cropped_width: source_width,
            cropped_height: source_height,
            output_width,
            output_height,
            scale: true,
            padding: Padding::default(),
        })
    }

    pub fn has_padding(&self) -> bool {
        !self.padding.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sixteen_nine() -> AspectRatio {
        AspectRatio { width: 16, height: 9 }
    }

    #[test]
    fn test_letterbox_cinemascope_to_sixteen_nine() {
        let crop = "0,0,140,140".parse::<CropBox>().unwrap();
        let plan = GeometryPlan::reframe(Path::new("movie.mkv"), 1920, 800, Some(crop), Some(sixteen_nine())).unwrap();

        assert_eq!((plan.cropped_width, plan.cropped_height), (1920, 520));
        assert_eq!((plan.output_width, plan.output_height), (1920, 1080));
        assert_eq!(plan.padding.top, 280);
        assert_eq!(plan.padding.bottom, 280);
        assert_eq!((plan.padding.left, plan.padding.right), (0, 0));
        assert!(!plan.scale);
    }

    #[test]
    fn test_pillarbox_four_three() {
        let fit = plan(1440, 1080, 16.0 / 9.0);
        assert_eq!((fit.width, fit.height), (1920, 1080));
        assert_eq!((fit.padding.left, fit.padding.right), (240, 240));
        assert_eq!((fit.padding.top, fit.padding.bottom), (0, 0));
        assert!(!fit.scale);
    }

    #[test]
    fn test_odd_remainder_goes_to_bottom() {
        let fit = plan(1920, 521, 16.0 / 9.0);
        assert_eq!(fit.height, 1080);
        assert_eq!(fit.padding.top, 279);
        assert_eq!(fit.padding.bottom, 280);
    }

    #[test]
    fn test_exact_aspect_is_noop() {
        let fit = plan(1920, 1080, 16.0 / 9.0);
        assert_eq!((fit.width, fit.height), (1920, 1080));
        assert!(fit.padding.is_zero());
        assert!(!fit.scale);
    }

    #[test]
    fn test_oversized_crop_is_invalid() {
        let crop = CropBox::new(1000, 1000, 0, 0);
        let err = GeometryPlan::reframe(Path::new("a.mkv"), 1920, 1080, Some(crop), None).unwrap_err();
        match err {
            PipelineError::InvalidGeometry { width, height, .. } => {
                assert_eq!(width, -80);
                assert_eq!(height, 1080);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reframe_without_aspect_keeps_cropped_size() {
        let crop = CropBox::new(0, 0, 140, 140);
        let plan = GeometryPlan::reframe(Path::new("a.mkv"), 1920, 1080, Some(crop), None).unwrap();
        assert_eq!((plan.output_width, plan.output_height), (1920, 800));
        assert!(!plan.has_padding());
        assert!(!plan.scale);
    }

    #[test]
    fn test_cap_auto_height_preserves_aspect() {
        let cap = ResolutionCap::parse("1080p").unwrap().unwrap();
        let plan = GeometryPlan::capped(Path::new("a.mkv"), 3840, 1600, &cap).unwrap();
        assert_eq!((plan.output_width, plan.output_height), (1920, 800));
        assert!(plan.scale);
        assert!(plan.crop.is_none());
        assert!(!plan.has_padding());
    }

    #[test]
    fn test_cap_fixed_and_auto_width() {
        let cap = ResolutionCap::parse("1280x720").unwrap().unwrap();
        let plan = GeometryPlan::capped(Path::new("a.mkv"), 1920, 800, &cap).unwrap();
        assert_eq!((plan.output_width, plan.output_height), (1280, 720));

        let cap = ResolutionCap::parse("autox720").unwrap().unwrap();
        let plan = GeometryPlan::capped(Path::new("a.mkv"), 1920, 1080, &cap).unwrap();
        assert_eq!((plan.output_width, plan.output_height), (1280, 720));
    }

    #[test]
    fn test_cap_with_huge_derived_side_is_invalid() {
        let cap = ResolutionCap::parse("200000xauto").unwrap().unwrap();
        let err = GeometryPlan::capped(Path::new("tall.mkv"), 1, 40000, &cap).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidGeometry { width: 200000, .. }));

        let cap = ResolutionCap::parse("autox70000").unwrap().unwrap();
        assert!(GeometryPlan::capped(Path::new("a.mkv"), 1920, 1080, &cap).is_err());

        // within bounds still plans normally
        let cap = ResolutionCap::parse("7680xauto").unwrap().unwrap();
        let plan = GeometryPlan::capped(Path::new("a.mkv"), 1920, 1080, &cap).unwrap();
        assert_eq!((plan.output_width, plan.output_height), (7680, 4320));
    }

    #[test]
    fn test_resolution_cap_parsing() {
        assert_eq!(ResolutionCap::parse("off").unwrap(), None);
        assert_eq!(ResolutionCap::parse("").unwrap(), None);
        assert_eq!(
            ResolutionCap::parse("720p").unwrap(),
            Some(ResolutionCap { width: Dimension::Fixed(1280), height: Dimension::Auto })
        );
        assert!(ResolutionCap::parse("autoxauto").is_err());
        assert!(ResolutionCap::parse("0x720").is_err());
        assert!(ResolutionCap::parse("big").is_err());
    }

    #[test]
    fn test_crop_and_aspect_parsing() {
        assert_eq!("0, 0, 104, 104".parse::<CropBox>().unwrap(), CropBox::new(0, 0, 104, 104));
        assert!("0,0,104".parse::<CropBox>().is_err());
        assert!("0,0,-4,104".parse::<CropBox>().is_err());
        assert_eq!("21:9".parse::<AspectRatio>().unwrap(), AspectRatio { width: 21, height: 9 });
        assert!("16:0".parse::<AspectRatio>().is_err());
        assert!("16x9".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_crop_from_rect_and_alignment() {
        assert_eq!(CropBox::from_rect(1920, 1080, 1920, 800, 0, 140), Some(CropBox::new(0, 0, 140, 140)));
        assert_eq!(CropBox::from_rect(1920, 1080, 1920, 1080, 0, 10), None);
        assert_eq!(CropBox::new(3, 5, 139, 141).aligned(CROP_ALIGNMENT), CropBox::new(2, 4, 138, 140));
    }

    proptest! {
        #[test]
        fn test_fit_invariants(
            width in 2u32..8000,
            height in 2u32..8000,
            ar_w in 1u32..40,
            ar_h in 1u32..40,
        ) {
            let fit = plan(width, height, ar_w as f64 / ar_h as f64);

            if fit.scale {
                prop_assert!(fit.padding.is_zero());
                prop_assert!(fit.width <= width);
                prop_assert!(fit.height <= height);
            } else {
                prop_assert!(fit.width >= width);
                prop_assert!(fit.height >= height);
                prop_assert_eq!(fit.width, width + fit.padding.left + fit.padding.right);
                prop_assert_eq!(fit.height, height + fit.padding.top + fit.padding.bottom);
            }

            // Never pad both axes at once
            let pads_vertically = fit.padding.top + fit.padding.bottom > 0;
            let pads_horizontally = fit.padding.left + fit.padding.right > 0;
            prop_assert!(!(pads_vertically && pads_horizontally));

            prop_assert!(fit.padding.bottom >= fit.padding.top);
            prop_assert!(fit.padding.bottom - fit.padding.top <= 1);
            prop_assert!(fit.padding.right >= fit.padding.left);
            prop_assert!(fit.padding.right - fit.padding.left <= 1);
        }

        #[test]
        fn test_flows_never_mix(
            width in 16u32..8000,
            height in 16u32..8000,
            cap_w in 16u32..4000,
        ) {
            let cap = ResolutionCap { width: Dimension::Fixed(cap_w), height: Dimension::Auto };
            match GeometryPlan::capped(Path::new("x.mkv"), width, height, &cap) {
                Ok(plan) => {
                    prop_assert_eq!(plan.flow, GeometryFlow::Cap);
                    prop_assert!(plan.crop.is_none());
                    prop_assert!(!plan.has_padding());
                    prop_assert!(plan.output_height % 2 == 0);
                    prop_assert!(u64::from(plan.output_height) <= MAX_OUTPUT_DIMENSION);
                }
                Err(PipelineError::InvalidGeometry { height: h, .. }) => {
                    prop_assert!(h as u64 > MAX_OUTPUT_DIMENSION);
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }

            let plan = GeometryPlan::reframe(Path::new("x.mkv"), width, height, None, Some(AspectRatio { width: 16, height: 9 })).unwrap();
            prop_assert_eq!(plan.flow, GeometryFlow::Reframe);
            prop_assert!(!(plan.scale && plan.has_padding()));
        }
    }
}
