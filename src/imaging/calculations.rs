//! Pure calculation functions for fitting an image into its container.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::CropTolerance;
use crate::types::{Geometry, StretchState, StretchStrategy};

/// Slack applied to the inclusive crop boundary so that deviations which are
/// exactly on the tolerance in decimal (2.4 vs 2.0 at 20%) are not lost to
/// binary floating-point rounding.
const BOUNDARY_EPSILON: f64 = 1e-9;

/// Percentage by which the image's aspect ratio deviates from the container's.
///
/// `|container_ratio - image_ratio| / container_ratio * 100`
///
/// Returns `None` when either ratio is undefined (zero-height container or
/// zero-height image).
///
/// # Examples
/// ```
/// # use lazy_frame::imaging::crop_deviation_pct;
/// # use lazy_frame::types::Geometry;
/// let dev = crop_deviation_pct(Geometry::new(240.0, 100.0), Geometry::new(200.0, 100.0));
/// assert!((dev.unwrap() - 20.0).abs() < 1e-9);
/// ```
pub fn crop_deviation_pct(image: Geometry, container: Geometry) -> Option<f64> {
    let container_ratio = container.aspect_ratio()?;
    let image_ratio = image.aspect_ratio()?;
    if container_ratio == 0.0 {
        return None;
    }
    Some((container_ratio - image_ratio).abs() / container_ratio * 100.0)
}

/// Resolve the declared strategy into the state to render.
///
/// - `Original` → `Original`, whatever the container.
/// - `Stretch` → `Stretch`.
/// - `Crop` → `Crop` when the aspect-ratio deviation is within `tolerance`
///   (inclusive), otherwise `Stretch`. A container without a measurable
///   ratio also yields `Stretch`.
pub fn classify(
    strategy: StretchStrategy,
    image: Geometry,
    container: Geometry,
    tolerance: CropTolerance,
) -> StretchState {
    match strategy {
        StretchStrategy::Original => StretchState::Original,
        StretchStrategy::Stretch => StretchState::Stretch,
        StretchStrategy::Crop => match crop_deviation_pct(image, container) {
            Some(dev) if dev <= tolerance.percent() + BOUNDARY_EPSILON => StretchState::Crop,
            Some(_) => StretchState::Stretch,
            None => {
                tracing::debug!(%image, %container, "indeterminate geometry, falling back to stretch");
                StretchState::Stretch
            }
        },
    }
}

/// Height to pre-size the container with before the image has loaded.
///
/// Only `crop` and `stretch` reserve space from a ratio; `original` adapts to
/// the image once it arrives. `canvas_ratio` is width:height.
pub fn canvas_height(
    strategy: StretchStrategy,
    container_width: f64,
    canvas_ratio: Option<f64>,
) -> Option<f64> {
    if strategy == StretchStrategy::Original {
        return None;
    }
    let ratio = canvas_ratio.filter(|r| r.is_finite() && *r > 0.0)?;
    Some((container_width / ratio).floor())
}
