//! Transformation options submitted with an upload.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Geometric or color transformation applied by the transcode engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Transformation {
    #[default]
    None,
    Grayscale,
    Invert,
    Hflip,
    Vflip,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Transformation {
    pub const ALL: &'static [Transformation] = &[
        Transformation::None,
        Transformation::Grayscale,
        Transformation::Invert,
        Transformation::Hflip,
        Transformation::Vflip,
        Transformation::Rotate90,
        Transformation::Rotate180,
        Transformation::Rotate270,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Transformation::None => "none",
            Transformation::Grayscale => "grayscale",
            Transformation::Invert => "invert",
            Transformation::Hflip => "hflip",
            Transformation::Vflip => "vflip",
            Transformation::Rotate90 => "rotate90",
            Transformation::Rotate180 => "rotate180",
            Transformation::Rotate270 => "rotate270",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Transformation::None)
    }
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Transformation {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| OptionsError::UnknownTransformation(s.to_string()))
    }
}

/// Per-frame pixel filter applied by the frame processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum FrameFilter {
    #[default]
    None,
    Blur,
    Sharpen,
    EdgeDetect,
}

impl FrameFilter {
    pub const ALL: &'static [FrameFilter] = &[
        FrameFilter::None,
        FrameFilter::Blur,
        FrameFilter::Sharpen,
        FrameFilter::EdgeDetect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameFilter::None => "none",
            FrameFilter::Blur => "blur",
            FrameFilter::Sharpen => "sharpen",
            FrameFilter::EdgeDetect => "edge_detect",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, FrameFilter::None)
    }
}

impl fmt::Display for FrameFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FrameFilter {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == lower)
            .ok_or_else(|| OptionsError::UnknownFilter(s.to_string()))
    }
}

/// Errors raised while validating submitted options.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionsError {
    #[error("Unknown transformation: {0}")]
    UnknownTransformation(String),

    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    #[error("Invalid {field} value: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Speed must be greater than zero, got {0}")]
    NonPositiveSpeed(f64),
}

/// Options as they arrive from a form or query string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawOptions {
    #[serde(default)]
    pub transformation: Option<String>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub speed: Option<String>,
    #[serde(default)]
    pub brightness: Option<String>,
    #[serde(default)]
    pub contrast: Option<String>,
}

/// Validated transformation options. Immutable once a job starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TransformOptions {
    #[serde(default)]
    pub transformation: Transformation,
    #[serde(default)]
    pub filter: FrameFilter,
    #[serde(default = "neutral")]
    pub speed: f64,
    #[serde(default = "neutral")]
    pub brightness: f64,
    #[serde(default = "neutral")]
    pub contrast: f64,
}

fn neutral() -> f64 {
    1.0
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            transformation: Transformation::None,
            filter: FrameFilter::None,
            speed: 1.0,
            brightness: 1.0,
            contrast: 1.0,
        }
    }
}

impl TransformOptions {
    /// Validate raw options, applying defaults for missing or blank fields.
    pub fn parse(raw: &RawOptions) -> Result<Self, OptionsError> {
        let transformation = match non_blank(&raw.transformation) {
            Some(s) => s.parse()?,
            None => Transformation::None,
        };
        let filter = match non_blank(&raw.filter) {
            Some(s) => s.parse()?,
            None => FrameFilter::None,
        };
        let speed = parse_number("speed", &raw.speed)?;
        let brightness = parse_number("brightness", &raw.brightness)?;
        let contrast = parse_number("contrast", &raw.contrast)?;

        let options = Self {
            transformation,
            filter,
            speed,
            brightness,
            contrast,
        };
        options.validate()?;
        Ok(options)
    }

    /// Check numeric invariants.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.speed <= 0.0 {
            return Err(OptionsError::NonPositiveSpeed(self.speed));
        }
        Ok(())
    }

    pub fn speed_changed(&self) -> bool {
        self.speed != 1.0
    }

    pub fn brightness_changed(&self) -> bool {
        self.brightness != 1.0
    }

    pub fn contrast_changed(&self) -> bool {
        self.contrast != 1.0
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_number(field: &'static str, value: &Option<String>) -> Result<f64, OptionsError> {
    let Some(s) = non_blank(value) else {
        return Ok(1.0);
    };

    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(OptionsError::InvalidNumber {
            field,
            value: s.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> RawOptions {
        let mut raw = RawOptions::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "transformation" => raw.transformation = value,
                "filter" => raw.filter = value,
                "speed" => raw.speed = value,
                "brightness" => raw.brightness = value,
                "contrast" => raw.contrast = value,
                _ => unreachable!(),
            }
        }
        raw
    }

    #[test]
    fn test_defaults_when_missing() {
        let options = TransformOptions::parse(&RawOptions::default()).unwrap();
        assert_eq!(options, TransformOptions::default());
    }

    #[test]
    fn test_parses_all_fields() {
        let options = TransformOptions::parse(&raw(&[
            ("transformation", "rotate270"),
            ("filter", "edge_detect"),
            ("speed", "2.0"),
            ("brightness", "1.2"),
            ("contrast", "0.8"),
        ]))
        .unwrap();

        assert_eq!(options.transformation, Transformation::Rotate270);
        assert_eq!(options.filter, FrameFilter::EdgeDetect);
        assert!((options.speed - 2.0).abs() < f64::EPSILON);
        assert!(options.brightness_changed());
        assert!(options.contrast_changed());
    }

    #[test]
    fn test_rejects_unparseable_numbers() {
        let err = TransformOptions::parse(&raw(&[("brightness", "bright")])).unwrap_err();
        assert_eq!(
            err,
            OptionsError::InvalidNumber {
                field: "brightness",
                value: "bright".into()
            }
        );

        assert!(TransformOptions::parse(&raw(&[("contrast", "NaN")])).is_err());
    }

    #[test]
    fn test_rejects_unknown_names_and_bad_speed() {
        assert!(matches!(
            TransformOptions::parse(&raw(&[("transformation", "rotate45")])),
            Err(OptionsError::UnknownTransformation(_))
        ));
        assert!(matches!(
            TransformOptions::parse(&raw(&[("filter", "emboss")])),
            Err(OptionsError::UnknownFilter(_))
        ));
        assert!(matches!(
            TransformOptions::parse(&raw(&[("speed", "0")])),
            Err(OptionsError::NonPositiveSpeed(_))
        ));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&FrameFilter::EdgeDetect).unwrap();
        assert_eq!(json, "\"edge_detect\"");
        let t: Transformation = serde_json::from_str("\"rotate90\"").unwrap();
        assert_eq!(t, Transformation::Rotate90);
    }
}
