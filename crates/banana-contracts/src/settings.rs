use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown aspect ratio '{0}' (expected one of 1:1, 16:9, 9:16, 4:3, 3:4)")]
    AspectRatio(String),
    #[error("unknown lighting style '{0}'")]
    LightingStyle(String),
    #[error("unknown camera perspective '{0}'")]
    CameraPerspective(String),
    #[error("unsupported image mime type '{0}' (expected image/png, image/jpeg or image/webp)")]
    MimeType(String),
}

/// A selectable value paired with the label shown in pickers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionItem<T> {
    pub value: T,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "3:4")]
    Tall,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Standard,
        AspectRatio::Tall,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Standard => "4:3",
            AspectRatio::Tall => "3:4",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AspectRatio::Square => "Square (1:1)",
            AspectRatio::Landscape => "Landscape (16:9)",
            AspectRatio::Portrait => "Portrait (9:16)",
            AspectRatio::Standard => "Standard (4:3)",
            AspectRatio::Tall => "Tall (3:4)",
        }
    }

    /// Width and height components, both strictly positive.
    pub fn components(self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1, 1),
            AspectRatio::Landscape => (16, 9),
            AspectRatio::Portrait => (9, 16),
            AspectRatio::Standard => (4, 3),
            AspectRatio::Tall => (3, 4),
        }
    }

    pub fn as_f64(self) -> f64 {
        let (width, height) = self.components();
        f64::from(width) / f64::from(height)
    }

    pub fn options() -> Vec<OptionItem<Self>> {
        Self::ALL
            .iter()
            .map(|value| OptionItem {
                value: *value,
                label: value.label(),
            })
            .collect()
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for AspectRatio {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().replace(' ', "");
        Self::ALL
            .into_iter()
            .find(|value| value.tag() == normalized)
            .ok_or_else(|| ParseError::AspectRatio(raw.trim().to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LightingStyle {
    #[default]
    #[serde(rename = "Soft light")]
    SoftLight,
    #[serde(rename = "Hard light")]
    HardLight,
    #[serde(rename = "Dramatic")]
    Dramatic,
    #[serde(rename = "Golden hour")]
    GoldenHour,
    #[serde(rename = "Blue hour")]
    BlueHour,
    #[serde(rename = "High key")]
    HighKey,
    #[serde(rename = "Low key")]
    LowKey,
}

impl LightingStyle {
    pub const ALL: [LightingStyle; 7] = [
        LightingStyle::SoftLight,
        LightingStyle::HardLight,
        LightingStyle::Dramatic,
        LightingStyle::GoldenHour,
        LightingStyle::BlueHour,
        LightingStyle::HighKey,
        LightingStyle::LowKey,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            LightingStyle::SoftLight => "Soft light",
            LightingStyle::HardLight => "Hard light",
            LightingStyle::Dramatic => "Dramatic",
            LightingStyle::GoldenHour => "Golden hour",
            LightingStyle::BlueHour => "Blue hour",
            LightingStyle::HighKey => "High key",
            LightingStyle::LowKey => "Low key",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LightingStyle::SoftLight => "Soft Light",
            LightingStyle::HardLight => "Hard Light",
            LightingStyle::Dramatic => "Dramatic",
            LightingStyle::GoldenHour => "Golden Hour",
            LightingStyle::BlueHour => "Blue Hour",
            LightingStyle::HighKey => "High Key",
            LightingStyle::LowKey => "Low Key",
        }
    }

    pub fn options() -> Vec<OptionItem<Self>> {
        Self::ALL
            .iter()
            .map(|value| OptionItem {
                value: *value,
                label: value.label(),
            })
            .collect()
    }
}

impl fmt::Display for LightingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for LightingStyle {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_tag(raw);
        Self::ALL
            .into_iter()
            .find(|value| normalize_tag(value.tag()) == normalized)
            .ok_or_else(|| ParseError::LightingStyle(raw.trim().to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CameraPerspective {
    #[default]
    #[serde(rename = "Eye-level")]
    EyeLevel,
    #[serde(rename = "High-angle")]
    HighAngle,
    #[serde(rename = "Low-angle")]
    LowAngle,
    #[serde(rename = "Birds-eye view")]
    BirdsEye,
    #[serde(rename = "Dutch angle")]
    DutchAngle,
    #[serde(rename = "Over-the-shoulder")]
    OverTheShoulder,
}

impl CameraPerspective {
    pub const ALL: [CameraPerspective; 6] = [
        CameraPerspective::EyeLevel,
        CameraPerspective::HighAngle,
        CameraPerspective::LowAngle,
        CameraPerspective::BirdsEye,
        CameraPerspective::DutchAngle,
        CameraPerspective::OverTheShoulder,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            CameraPerspective::EyeLevel => "Eye-level",
            CameraPerspective::HighAngle => "High-angle",
            CameraPerspective::LowAngle => "Low-angle",
            CameraPerspective::BirdsEye => "Birds-eye view",
            CameraPerspective::DutchAngle => "Dutch angle",
            CameraPerspective::OverTheShoulder => "Over-the-shoulder",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CameraPerspective::EyeLevel => "Eye-Level",
            CameraPerspective::HighAngle => "High-Angle",
            CameraPerspective::LowAngle => "Low-Angle",
            CameraPerspective::BirdsEye => "Bird's-Eye View",
            CameraPerspective::DutchAngle => "Dutch Angle",
            CameraPerspective::OverTheShoulder => "Over-the-Shoulder",
        }
    }

    pub fn options() -> Vec<OptionItem<Self>> {
        Self::ALL
            .iter()
            .map(|value| OptionItem {
                value: *value,
                label: value.label(),
            })
            .collect()
    }
}

impl fmt::Display for CameraPerspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for CameraPerspective {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_tag(raw);
        Self::ALL
            .into_iter()
            .find(|value| normalize_tag(value.tag()) == normalized)
            .ok_or_else(|| ParseError::CameraPerspective(raw.trim().to_string()))
    }
}

/// Snapshot of the user-selected scene options for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub aspect_ratio: AspectRatio,
    pub lighting_style: LightingStyle,
    pub camera_perspective: CameraPerspective,
}

// Accepts "golden hour", "Golden_hour", "golden-hour" etc. for CLI input.
fn normalize_tag(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|ch| match ch {
            '_' | '-' => ' ',
            other => other.to_ascii_lowercase(),
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratio_tags_round_trip_through_from_str() {
        for ratio in AspectRatio::ALL {
            assert_eq!(ratio.tag().parse::<AspectRatio>(), Ok(ratio));
        }
        assert_eq!(" 16 : 9 ".parse::<AspectRatio>(), Ok(AspectRatio::Landscape));
    }

    #[test]
    fn aspect_ratio_rejects_unknown_tag() {
        let err = "2:1".parse::<AspectRatio>().unwrap_err();
        assert_eq!(err, ParseError::AspectRatio("2:1".to_string()));
    }

    #[test]
    fn aspect_ratio_components_are_positive() {
        for ratio in AspectRatio::ALL {
            let (width, height) = ratio.components();
            assert!(width > 0 && height > 0);
        }
        assert!((AspectRatio::Landscape.as_f64() - 16.0 / 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn lighting_and_camera_parse_loosely() {
        assert_eq!(
            "golden_hour".parse::<LightingStyle>(),
            Ok(LightingStyle::GoldenHour)
        );
        assert_eq!(
            "birds-eye view".parse::<CameraPerspective>(),
            Ok(CameraPerspective::BirdsEye)
        );
        assert_eq!(
            "OVER THE SHOULDER".parse::<CameraPerspective>(),
            Ok(CameraPerspective::OverTheShoulder)
        );
        assert!("neon".parse::<LightingStyle>().is_err());
    }

    #[test]
    fn settings_serialize_with_wire_tags() -> anyhow::Result<()> {
        let settings = GenerationSettings {
            aspect_ratio: AspectRatio::Tall,
            lighting_style: LightingStyle::LowKey,
            camera_perspective: CameraPerspective::DutchAngle,
        };
        let value = serde_json::to_value(settings)?;
        assert_eq!(value["aspect_ratio"], "3:4");
        assert_eq!(value["lighting_style"], "Low key");
        assert_eq!(value["camera_perspective"], "Dutch angle");
        let parsed: GenerationSettings = serde_json::from_value(value)?;
        assert_eq!(parsed, settings);
        Ok(())
    }

    #[test]
    fn defaults_match_initial_picker_state() {
        let settings = GenerationSettings::default();
        assert_eq!(settings.aspect_ratio, AspectRatio::Square);
        assert_eq!(settings.lighting_style, LightingStyle::SoftLight);
        assert_eq!(settings.camera_perspective, CameraPerspective::EyeLevel);
        assert_eq!(LightingStyle::options().len(), 7);
        assert_eq!(CameraPerspective::options()[3].label, "Bird's-Eye View");
    }
}
