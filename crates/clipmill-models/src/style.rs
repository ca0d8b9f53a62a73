//! Render output geometry and quality.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Target aspect ratio for rendered clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum AspectRatio {
    /// 9:16 vertical (shorts/reels default)
    #[default]
    Vertical,
    /// 1:1 square
    Square,
    /// 4:5 portrait
    Portrait,
    /// 16:9 landscape
    Landscape,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Vertical => "9:16",
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "4:5",
            AspectRatio::Landscape => "16:9",
        }
    }

    /// Width/height ratio.
    pub fn ratio(&self) -> f64 {
        match self {
            AspectRatio::Vertical => 9.0 / 16.0,
            AspectRatio::Square => 1.0,
            AspectRatio::Portrait => 4.0 / 5.0,
            AspectRatio::Landscape => 16.0 / 9.0,
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unsupported aspect ratio: {0}")]
pub struct ParseAspectRatioError(String);

impl FromStr for AspectRatio {
    type Err = ParseAspectRatioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "9:16" | "vertical" => Ok(AspectRatio::Vertical),
            "1:1" | "square" => Ok(AspectRatio::Square),
            "4:5" | "portrait" => Ok(AspectRatio::Portrait),
            "16:9" | "landscape" => Ok(AspectRatio::Landscape),
            other => Err(ParseAspectRatioError(other.to_string())),
        }
    }
}

/// Render quality preset passed through to the rendering engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderQuality {
    Draft,
    #[default]
    Standard,
    High,
}

impl RenderQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderQuality::Draft => "draft",
            RenderQuality::Standard => "standard",
            RenderQuality::High => "high",
        }
    }
}

impl fmt::Display for RenderQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
