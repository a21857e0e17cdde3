//! Pure Rust probe backend.
//!
//! Reads only as much of a file as the format header needs; pixels are never
//! decoded.
//!
//! ## Crate mapping
//!
//! | Format | Crate / function |
//! |---|---|
//! | JPEG, PNG, TIFF, WebP, GIF | `image::ImageReader::into_dimensions` (format sniffed from content) |
//! | AVIF | `avif-parse` container metadata |
//!
//! Only local paths and `file://` urls are probed. Network transport is the
//! host's business; any other scheme fails with
//! [`BackendError::UnsupportedUrl`].

use super::backend::{BackendError, Dimensions, ProbeBackend};
use image::ImageReader;
use std::path::{Path, PathBuf};

/// Pure Rust backend using the `image` crate ecosystem.
#[derive(Debug, Clone, Default)]
pub struct RustBackend {
    root: Option<PathBuf>,
}

impl RustBackend {
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Resolve relative urls against `root` (e.g. the directory holding the
    /// config file that listed them).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, url: &str) -> Result<PathBuf, BackendError> {
        let raw = match url.strip_prefix("file://") {
            Some(rest) => rest,
            None if has_scheme(url) => return Err(BackendError::UnsupportedUrl(url.to_string())),
            None => url,
        };
        if raw.is_empty() {
            return Err(BackendError::UnsupportedUrl(url.to_string()));
        }
        let path = Path::new(raw);
        Ok(match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        })
    }
}

/// `scheme:` prefix per RFC 3986 (letter, then letters/digits/`+-.`).
/// Single letters are treated as Windows drive letters, not schemes.
fn has_scheme(url: &str) -> bool {
    let Some((scheme, _)) = url.split_once(':') else {
        return false;
    };
    scheme.len() > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn is_avif(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("avif"))
}

/// Extract dimensions from an AVIF file's container metadata.
fn probe_avif(path: &Path) -> Result<Dimensions, BackendError> {
    let file_data = std::fs::read(path)?;
    let avif = avif_parse::read_avif(&mut std::io::Cursor::new(&file_data)).map_err(|e| {
        BackendError::ProbeFailed(format!("Failed to parse AVIF {}: {e:?}", path.display()))
    })?;
    let meta = avif.primary_item_metadata().map_err(|e| {
        BackendError::ProbeFailed(format!(
            "Failed to read AVIF metadata {}: {e:?}",
            path.display()
        ))
    })?;
    Ok(Dimensions {
        width: meta.max_frame_width.get(),
        height: meta.max_frame_height.get(),
    })
}

impl ProbeBackend for RustBackend {
    fn probe(&self, url: &str) -> Result<Dimensions, BackendError> {
        let path = self.resolve(url)?;
        if is_avif(&path) {
            return probe_avif(&path);
        }
        let (width, height) = ImageReader::open(&path)?
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| {
                BackendError::ProbeFailed(format!(
                    "Failed to read dimensions of {}: {e}",
                    path.display()
                ))
            })?;
        Ok(Dimensions { width, height })
    }
}
