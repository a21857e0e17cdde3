//! Probe backend trait and shared types.
//!
//! A probe answers one question about an image url: what are its pixel
//! dimensions, and can it be loaded at all? The [`ProbeBackend`] trait keeps
//! the loader independent of how that question is answered.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), which reads local
//! files and parses header dimensions without decoding pixels.

use crate::types::Geometry;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported url: {0}")]
    UnsupportedUrl(String),
    #[error("Probe failed: {0}")]
    ProbeFailed(String),
}

/// Result of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl From<Dimensions> for Geometry {
    fn from(d: Dimensions) -> Self {
        Geometry::new(d.width as f64, d.height as f64)
    }
}

/// Trait for probe backends.
///
/// `Send + Sync` because probes may run on a worker pool while the session
/// stays on its own thread.
pub trait ProbeBackend: Send + Sync {
    /// Learn the intrinsic pixel dimensions of the image at `url`.
    fn probe(&self, url: &str) -> Result<Dimensions, BackendError>;
}
