//! Image probing and fit math, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Probe** | `image::ImageReader::into_dimensions`, `avif-parse` |
//! | **Classify** | [`classify`] (crop vs stretch vs original) |
//! | **Pre-size** | [`canvas_height`] from a width:height ratio |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for fit math (unit testable)
//! - **Parameters**: [`CropTolerance`]
//! - **Backend**: [`ProbeBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ProbeBackend};
pub use calculations::{canvas_height, classify, crop_deviation_pct};
pub use params::CropTolerance;
pub use rust_backend::RustBackend;
