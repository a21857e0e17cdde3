//! Parameter types for fit classification.
//!
//! - [`CropTolerance`]: how far (in percent) an image's aspect ratio may
//!   deviate from its container's before a `crop` strategy degrades to
//!   `stretch`. Default 20.

/// Maximum aspect-ratio deviation, in percent, that still allows cropping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropTolerance(f64);

impl CropTolerance {
    pub const DEFAULT_PERCENT: f64 = 20.0;

    /// Build from a caller override. Missing, zero and NaN values fall back
    /// to the default. A negative override is kept, so no deviation is ever
    /// small enough to crop.
    pub fn from_override(value: Option<f64>) -> Self {
        match value {
            Some(v) if v != 0.0 && !v.is_nan() => Self(v),
            _ => Self::default(),
        }
    }

    pub fn percent(self) -> f64 {
        self.0
    }
}

impl Default for CropTolerance {
    fn default() -> Self {
        Self(Self::DEFAULT_PERCENT)
    }
}
