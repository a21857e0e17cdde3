//! Component configuration.
//!
//! Handles loading, validating, and merging `lazy-frame.toml` files. Stock
//! defaults are the base layer; a user file overrides only the keys it sets.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [viewport]
//! max_buffer = 460             # Upper bound of the look-ahead buffer below the fold
//!
//! [fit]
//! stretch_strategy = "original" # crop | stretch | original
//! max_crop_percentage = 20     # Aspect deviation (%) still allowed to crop
//! # canvas_ratio = 1.5         # width:height to reserve before the image loads
//!
//! [metadata]
//! keywords = ""
//! name = ""
//! url = ""                     # Overrides the reported matched url when set
//!
//! [[sources]]
//! media = "(max-width: 480px)"
//! url = "images/hero-480.jpg"
//!
//! [[sources]]
//! media = "(min-width: 481px)"
//! url = "images/hero-1400.jpg"
//! ```
//!
//! Unknown keys are rejected to catch typos early. An empty `sources` list is
//! accepted here: it only becomes an error when a load is requested.

use crate::imaging::CropTolerance;
use crate::types::{ImageMetadata, ImageSource, StretchStrategy};
use crate::viewport::MAX_BUFFER;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration for one lazily loaded image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrameConfig {
    /// Loading-area settings shared by every image on the page.
    pub viewport: ViewportConfig,
    /// How the loaded image is fit into its box.
    pub fit: FitConfig,
    /// Display-only descriptive metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ImageMetadata>,
    /// Candidate sources, first match wins.
    pub sources: Vec<ImageSource>,
}

impl FrameConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max_buffer = self.viewport.max_buffer;
        if !max_buffer.is_finite() || max_buffer < 0.0 {
            return Err(ConfigError::Validation(
                "viewport.max_buffer must be a non-negative number".into(),
            ));
        }
        if let Some(ratio) = self.fit.canvas_ratio {
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(ConfigError::Validation(
                    "fit.canvas_ratio must be positive".into(),
                ));
            }
        }
        if let Some(pct) = self.fit.max_crop_percentage {
            if !pct.is_finite() || pct < 0.0 {
                return Err(ConfigError::Validation(
                    "fit.max_crop_percentage must be a non-negative number".into(),
                ));
            }
        }
        if let Some(source) = self.sources.iter().find(|s| s.url.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "sources: entry with media '{}' has an empty url",
                source.condition
            )));
        }
        Ok(())
    }
}

/// Loading-area settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewportConfig {
    /// Upper bound of the buffer added below the fold.
    pub max_buffer: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            max_buffer: MAX_BUFFER,
        }
    }
}

/// Fit settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitConfig {
    /// Declared strategy; unknown values mean `original`.
    pub stretch_strategy: StretchStrategy,
    /// Crop tolerance override in percent. Absent or zero means the default (20).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_crop_percentage: Option<f64>,
    /// width:height used to pre-size the box before the image loads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas_ratio: Option<f64>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            stretch_strategy: StretchStrategy::Original,
            max_crop_percentage: Some(CropTolerance::DEFAULT_PERCENT),
            canvas_ratio: None,
        }
    }
}

impl FitConfig {
    pub fn tolerance(&self) -> CropTolerance {
        CropTolerance::from_override(self.max_crop_percentage)
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(FrameConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely, so a user
///   `sources` array replaces the stock one rather than appending.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<FrameConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: FrameConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Parse config text, merging it over stock defaults.
pub fn parse_config(content: &str) -> Result<FrameConfig, ConfigError> {
    let overlay: toml::Value = toml::from_str(content)?;
    resolve_config(stock_defaults_value()?, Some(overlay))
}

/// Load a config file.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(path: &Path) -> Result<FrameConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Returns a fully-commented stock `lazy-frame.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# lazy-frame configuration
# ========================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Loading area
# ---------------------------------------------------------------------------
[viewport]
# The image starts loading once its top edge is within the viewport plus a
# buffer below the fold. The buffer is the viewport height, capped here.
max_buffer = 460.0

# ---------------------------------------------------------------------------
# Fit
# ---------------------------------------------------------------------------
[fit]
# crop     - fill the box, cropping, while the aspect ratios are close enough
# stretch  - always fill the box
# original - size the box to the image
stretch_strategy = "original"

# How far (percent) the image's aspect ratio may deviate from the box's and
# still be cropped. Beyond this, crop falls back to stretch.
max_crop_percentage = 20.0

# Width:height ratio used to reserve space before the image loads
# (crop and stretch only).
# canvas_ratio = 1.5

# ---------------------------------------------------------------------------
# Sources - first matching media condition wins
# ---------------------------------------------------------------------------
# [[sources]]
# media = "(max-width: 480px)"
# url = "images/hero-480.jpg"
#
# [[sources]]
# media = "(min-width: 481px)"
# url = "images/hero-1400.jpg"
"##
}
