//! CLI output formatting for every subcommand.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! Viewport
//!     max buffer: 460px
//! Fit
//!     strategy: crop
//!     max crop: 20%
//!     canvas ratio: 1.5
//! Sources
//! 001 (max-width: 480px) → small.jpg
//! 002 (any) → large.jpg
//! ```
//!
//! ## Classify
//!
//! ```text
//! crop → crop
//!     image: 272x92 (ratio 2.957)
//!     container: 295x100 (ratio 2.950)
//!     deviation: 0.22% (tolerance 20%)
//! ```
//!
//! ## Simulate
//!
//! One JSON line per script step: the step index, the signal, and the
//! [`RenderState`] after the step settled.
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::config::FrameConfig;
use crate::imaging::{CropTolerance, Dimensions};
use crate::media::MediaContext;
use crate::session::{Signal, StaticEnvironment};
use crate::types::{Geometry, RenderState, StretchState, StretchStrategy};
use serde::{Deserialize, Serialize};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Trim trailing zeros so `460.0` prints as `460` and `1.50` as `1.5`.
fn number(value: f64) -> String {
    let s = format!("{value:.3}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn strategy_name(strategy: StretchStrategy) -> &'static str {
    match strategy {
        StretchStrategy::Crop => "crop",
        StretchStrategy::Stretch => "stretch",
        StretchStrategy::Original => "original",
    }
}

fn ratio_line(label: &str, geometry: Geometry) -> String {
    match geometry.aspect_ratio() {
        Some(r) => format!("{}{label}: {geometry} (ratio {r:.3})", indent(1)),
        None => format!("{}{label}: {geometry} (no ratio)", indent(1)),
    }
}

// ============================================================================
// check
// ============================================================================

/// Format a validated config as an inventory.
pub fn format_config_summary(config: &FrameConfig) -> Vec<String> {
    let mut lines = vec![
        "Viewport".to_string(),
        format!("{}max buffer: {}px", indent(1), number(config.viewport.max_buffer)),
        "Fit".to_string(),
        format!(
            "{}strategy: {}",
            indent(1),
            strategy_name(config.fit.stretch_strategy)
        ),
        format!(
            "{}max crop: {}%",
            indent(1),
            number(config.fit.tolerance().percent())
        ),
    ];
    if let Some(ratio) = config.fit.canvas_ratio {
        lines.push(format!("{}canvas ratio: {}", indent(1), number(ratio)));
    }

    if let Some(meta) = &config.metadata {
        lines.push("Metadata".to_string());
        for (label, value) in [("name", &meta.name), ("keywords", &meta.keywords), ("url", &meta.url)] {
            if !value.is_empty() {
                lines.push(format!("{}{label}: {value}", indent(1)));
            }
        }
    }

    lines.push("Sources".to_string());
    if config.sources.is_empty() {
        lines.push(format!("{}(none)", indent(1)));
    }
    for (i, source) in config.sources.iter().enumerate() {
        let condition = if source.condition.trim().is_empty() {
            "any"
        } else {
            source.condition.as_str()
        };
        lines.push(format!(
            "{} ({condition}) → {}",
            format_index(i + 1),
            source.url
        ));
    }
    lines
}

pub fn print_config_summary(config: &FrameConfig) {
    for line in format_config_summary(config) {
        println!("{}", line);
    }
}

// ============================================================================
// select
// ============================================================================

pub fn format_selection(selected: Option<&str>, ctx: &MediaContext) -> Vec<String> {
    let env = format!(
        "{}viewport: {}x{}",
        indent(1),
        number(ctx.viewport_width),
        number(ctx.viewport_height)
    );
    match selected {
        Some(url) => vec![url.to_string(), env],
        None => vec!["(no source matches)".to_string(), env],
    }
}

pub fn print_selection(selected: Option<&str>, ctx: &MediaContext) {
    for line in format_selection(selected, ctx) {
        println!("{}", line);
    }
}

// ============================================================================
// classify
// ============================================================================

/// Inputs and result of one fit classification.
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub strategy: StretchStrategy,
    pub image: Geometry,
    pub container: Geometry,
    pub tolerance: CropTolerance,
    pub deviation: Option<f64>,
    pub state: StretchState,
}

pub fn format_classification(c: &Classification) -> Vec<String> {
    let mut lines = vec![
        format!("{} → {}", strategy_name(c.strategy), c.state),
        ratio_line("image", c.image),
        ratio_line("container", c.container),
    ];
    if c.strategy == StretchStrategy::Crop {
        let tolerance = number(c.tolerance.percent());
        lines.push(match c.deviation {
            Some(dev) => format!("{}deviation: {dev:.2}% (tolerance {tolerance}%)", indent(1)),
            None => format!("{}deviation: indeterminate (tolerance {tolerance}%)", indent(1)),
        });
    }
    lines
}

pub fn print_classification(c: &Classification) {
    for line in format_classification(c) {
        println!("{}", line);
    }
}

// ============================================================================
// probe
// ============================================================================

pub fn format_probe(url: &str, dims: Dimensions) -> Vec<String> {
    let geometry = Geometry::from(dims);
    vec![url.to_string(), ratio_line("size", geometry)]
}

pub fn print_probe(url: &str, dims: Dimensions) {
    for line in format_probe(url, dims) {
        println!("{}", line);
    }
}

// ============================================================================
// simulate
// ============================================================================

/// One step of a simulation script: a signal plus the environment it was
/// observed in.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScriptStep {
    pub signal: Signal,
    #[serde(default)]
    pub scroll_offset: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
    #[serde(default)]
    pub element_top: f64,
    #[serde(default)]
    pub element_width: f64,
    #[serde(default)]
    pub element_height: f64,
}

impl ScriptStep {
    pub fn environment(&self) -> StaticEnvironment {
        StaticEnvironment::new(self.viewport_width, self.viewport_height)
            .scrolled_to(self.scroll_offset)
            .with_element(
                self.element_top,
                Geometry::new(self.element_width, self.element_height),
            )
    }
}

#[derive(Serialize)]
struct StepRecord<'a> {
    step: usize,
    signal: Signal,
    state: &'a RenderState,
}

/// One JSON line describing the state after `step`.
pub fn format_step(index: usize, signal: Signal, state: &RenderState) -> serde_json::Result<String> {
    serde_json::to_string(&StepRecord {
        step: index,
        signal,
        state,
    })
}

pub fn print_step(index: usize, signal: Signal, state: &RenderState) -> serde_json::Result<()> {
    println!("{}", format_step(index, signal, state)?);
    Ok(())
}
