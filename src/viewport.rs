//! Viewport oracle: is an element close enough to the fold to start loading?
//!
//! The loading area is the visible viewport extended downward by a buffer:
//!
//! ```text
//! scroll_offset ─┬───────────────┐
//!                │   viewport    │ viewport_height
//!                ├───────────────┤
//!                │    buffer     │ min(viewport_height, max_buffer)
//!                └───────────────┘ ← element_top must be at or above this line
//! ```
//!
//! Inputs are not validated; negative values go through the arithmetic as-is.

/// Upper bound on the look-ahead buffer, shared by every image on a page.
pub const MAX_BUFFER: f64 = 460.0;

/// Look-ahead buffer for a viewport of the given height.
pub fn buffer_size(viewport_height: f64, max_buffer: f64) -> f64 {
    viewport_height.min(max_buffer)
}

/// `scroll_offset + viewport_height + buffer_size >= element_top`.
pub fn is_in_loading_area(
    scroll_offset: f64,
    viewport_height: f64,
    buffer_size: f64,
    element_top: f64,
) -> bool {
    scroll_offset + viewport_height + buffer_size >= element_top
}

/// Cached position inputs for the oracle.
///
/// Re-measured on resize (viewport height and layout may change); scroll
/// checks reuse the cached values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoadingArea {
    pub buffer_size: f64,
    pub element_top: f64,
}

impl LoadingArea {
    pub fn measure(viewport_height: f64, element_top: f64, max_buffer: f64) -> Self {
        Self {
            buffer_size: buffer_size(viewport_height, max_buffer),
            element_top,
        }
    }

    pub fn contains(&self, scroll_offset: f64, viewport_height: f64) -> bool {
        is_in_loading_area(scroll_offset, viewport_height, self.buffer_size, self.element_top)
    }
}
