//! Shared types used across the viewport, selection, loader and session modules.
//!
//! These types cross the boundary to the host (config files, simulation
//! scripts, JSON render-state output), so they all derive serde.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One candidate image variant: a media condition and the url to use when it matches.
///
/// An empty condition matches every environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(default, alias = "media")]
    pub condition: String,
    pub url: String,
}

impl ImageSource {
    pub fn new(condition: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            condition: condition.into(),
            url: url.into(),
        }
    }
}

/// Descriptive metadata for the image. Display only; never read by the
/// visibility, selection or fit logic, except that a non-empty `url`
/// replaces the selected source url in [`RenderState::matched_url`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageMetadata {
    pub keywords: String,
    pub name: String,
    pub url: String,
}

/// Width/height pair. Either an image's intrinsic pixel size or a
/// container's rendered box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub width: f64,
    pub height: f64,
}

impl Geometry {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// `width / height`, or `None` when the ratio is undefined (zero or
    /// non-finite height, e.g. a container that has not been laid out).
    pub fn aspect_ratio(&self) -> Option<f64> {
        let ratio = self.width / self.height;
        ratio.is_finite().then_some(ratio)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Geometry {
    type Err = String;

    /// Parses `"WIDTHxHEIGHT"`, e.g. `"272x92"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
        let width: f64 = w
            .trim()
            .parse()
            .map_err(|_| format!("invalid width in '{s}'"))?;
        let height: f64 = h
            .trim()
            .parse()
            .map_err(|_| format!("invalid height in '{s}'"))?;
        Ok(Self { width, height })
    }
}

/// The caller's declared fit intent.
///
/// Unknown values deserialize (and parse) as [`StretchStrategy::Original`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StretchStrategy {
    Crop,
    Stretch,
    #[default]
    #[serde(other)]
    Original,
}

impl StretchStrategy {
    /// Parse a strategy name; anything unrecognised falls back to `Original`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "crop" => Self::Crop,
            "stretch" => Self::Stretch,
            _ => Self::Original,
        }
    }
}

impl FromStr for StretchStrategy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse_lenient(s))
    }
}

/// The fit actually applied at runtime. `Crop` strategies resolve to either
/// `Crop` or `Stretch` depending on geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StretchState {
    Crop,
    Stretch,
    Original,
}

impl fmt::Display for StretchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Crop => "crop",
            Self::Stretch => "stretch",
            Self::Original => "original",
        };
        f.write_str(name)
    }
}

/// Everything the host needs to render the component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderState {
    pub loading: bool,
    pub error_occurred: bool,
    pub stretch_state: Option<StretchState>,
    pub canvas_width: Option<f64>,
    pub canvas_height: Option<f64>,
    /// `url('<src>')` for the selected source; `None` until the first selection.
    pub background: Option<String>,
    /// The metadata url when present, otherwise the selected source url.
    pub matched_url: Option<String>,
    pub has_entered_viewport: bool,
}

/// Format a url as a CSS background reference.
pub fn background_string(url: &str) -> String {
    format!("url('{url}')")
}
