//! Media condition parsing and evaluation.
//!
//! Source conditions are CSS media query lists such as
//! `(max-width: 480px)` or `screen and (min-width: 481px), print`. This module
//! parses the subset that responsive image sources actually use and evaluates
//! it against a [`MediaContext`] describing the current display.
//!
//! Supported:
//!
//! - media types `all`, `screen`, `print`, with `not` / `only` modifiers
//! - `width`, `height` and their `min-`/`max-` forms, in `px`, `em` or `rem`
//! - `orientation: portrait | landscape`
//! - `aspect-ratio` and its `min-`/`max-` forms, as `W/H` or a number
//! - `resolution` and its `min-`/`max-` forms, in `dppx`, `x` or `dpi`
//!
//! A list matches if ANY query matches; a query matches if ALL its features
//! do. An empty list matches everything. A query that fails to parse never
//! matches, without affecting its siblings in the list.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaParseError {
    #[error("unbalanced parentheses in '{0}'")]
    Unbalanced(String),
    #[error("unknown media type '{0}'")]
    UnknownMediaType(String),
    #[error("unknown media feature '{0}'")]
    UnknownFeature(String),
    #[error("invalid value '{value}' for media feature '{feature}'")]
    InvalidValue { feature: String, value: String },
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("empty media query")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    All,
    Screen,
    Print,
}

impl MediaType {
    pub fn parse(s: &str) -> Result<Self, MediaParseError> {
        match s {
            "all" => Ok(Self::All),
            "screen" => Ok(Self::Screen),
            "print" => Ok(Self::Print),
            other => Err(MediaParseError::UnknownMediaType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaModifier {
    Not,
    Only,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
    Px(f64),
    Em(f64),
}

impl Length {
    fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(n) = s.strip_suffix("px") {
            return n.trim().parse().ok().map(Self::Px);
        }
        if let Some(n) = s.strip_suffix("rem").or_else(|| s.strip_suffix("em")) {
            return n.trim().parse().ok().map(Self::Em);
        }
        // Unitless lengths are only valid for zero.
        match s.parse::<f64>() {
            Ok(v) if v == 0.0 => Some(Self::Px(0.0)),
            _ => None,
        }
    }

    fn to_px(self, base_font_size: f64) -> f64 {
        match self {
            Self::Px(v) => v,
            Self::Em(v) => v * base_font_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaFeature {
    Width(Length),
    MinWidth(Length),
    MaxWidth(Length),
    Height(Length),
    MinHeight(Length),
    MaxHeight(Length),
    Orientation(Orientation),
    AspectRatio(f64),
    MinAspectRatio(f64),
    MaxAspectRatio(f64),
    /// Resolution in dots per CSS pixel.
    Resolution(f64),
    MinResolution(f64),
    MaxResolution(f64),
}

impl MediaFeature {
    /// Parse the inside of a `( ... )` group, e.g. `min-width: 481px`.
    pub fn parse(group: &str) -> Result<Self, MediaParseError> {
        let (name, value) = group
            .split_once(':')
            .ok_or_else(|| MediaParseError::UnknownFeature(group.trim().to_string()))?;
        let name = name.trim();
        let value = value.trim();
        let invalid = || MediaParseError::InvalidValue {
            feature: name.to_string(),
            value: value.to_string(),
        };
        let length = || Length::parse(value).ok_or_else(invalid);
        let ratio = || parse_ratio(value).ok_or_else(invalid);
        let resolution = || parse_resolution(value).ok_or_else(invalid);

        Ok(match name {
            "width" => Self::Width(length()?),
            "min-width" => Self::MinWidth(length()?),
            "max-width" => Self::MaxWidth(length()?),
            "height" => Self::Height(length()?),
            "min-height" => Self::MinHeight(length()?),
            "max-height" => Self::MaxHeight(length()?),
            "orientation" => Self::Orientation(match value {
                "portrait" => Orientation::Portrait,
                "landscape" => Orientation::Landscape,
                _ => return Err(invalid()),
            }),
            "aspect-ratio" => Self::AspectRatio(ratio()?),
            "min-aspect-ratio" => Self::MinAspectRatio(ratio()?),
            "max-aspect-ratio" => Self::MaxAspectRatio(ratio()?),
            "resolution" => Self::Resolution(resolution()?),
            "min-resolution" => Self::MinResolution(resolution()?),
            "max-resolution" => Self::MaxResolution(resolution()?),
            "-webkit-min-device-pixel-ratio" => {
                Self::MinResolution(value.parse().map_err(|_| invalid())?)
            }
            "-webkit-max-device-pixel-ratio" => {
                Self::MaxResolution(value.parse().map_err(|_| invalid())?)
            }
            other => return Err(MediaParseError::UnknownFeature(other.to_string())),
        })
    }
}

fn parse_ratio(s: &str) -> Option<f64> {
    let ratio = match s.split_once('/') {
        Some((w, h)) => w.trim().parse::<f64>().ok()? / h.trim().parse::<f64>().ok()?,
        None => s.parse::<f64>().ok()?,
    };
    (ratio.is_finite() && ratio > 0.0).then_some(ratio)
}

fn parse_resolution(s: &str) -> Option<f64> {
    if let Some(n) = s.strip_suffix("dppx").or_else(|| s.strip_suffix('x')) {
        return n.trim().parse().ok();
    }
    if let Some(n) = s.strip_suffix("dpi") {
        return n.trim().parse::<f64>().ok().map(|dpi| dpi / 96.0);
    }
    None
}

/// A single media query: optional modifier and type, plus ANDed features.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaQuery {
    pub modifier: Option<MediaModifier>,
    pub media_type: Option<MediaType>,
    pub features: Vec<MediaFeature>,
}

enum Token<'a> {
    Word(&'a str),
    Group(&'a str),
}

fn tokenize(input: &str) -> Result<Vec<Token<'_>>, MediaParseError> {
    let mut tokens = Vec::new();
    let mut rest = input.trim_start();
    while !rest.is_empty() {
        if let Some(inner) = rest.strip_prefix('(') {
            let close = inner
                .find(')')
                .ok_or_else(|| MediaParseError::Unbalanced(input.to_string()))?;
            if inner[..close].contains('(') {
                return Err(MediaParseError::Unbalanced(input.to_string()));
            }
            tokens.push(Token::Group(&inner[..close]));
            rest = inner[close + 1..].trim_start();
        } else if rest.starts_with(')') {
            return Err(MediaParseError::Unbalanced(input.to_string()));
        } else {
            let end = rest
                .find(|c: char| c.is_whitespace() || c == '(' || c == ')')
                .unwrap_or(rest.len());
            tokens.push(Token::Word(&rest[..end]));
            rest = rest[end..].trim_start();
        }
    }
    Ok(tokens)
}

impl MediaQuery {
    /// Parse one query (no commas).
    pub fn parse(input: &str) -> Result<Self, MediaParseError> {
        let lowered = input.trim().to_ascii_lowercase();
        let tokens = tokenize(&lowered)?;
        let mut iter = tokens.into_iter().peekable();
        let mut query = MediaQuery::default();

        if let Some(Token::Word(w)) = iter.peek() {
            match *w {
                "not" => query.modifier = Some(MediaModifier::Not),
                "only" => query.modifier = Some(MediaModifier::Only),
                _ => {}
            }
            if query.modifier.is_some() {
                iter.next();
            }
        }
        if let Some(Token::Word(w)) = iter.peek() {
            query.media_type = Some(MediaType::parse(w)?);
            iter.next();
        }

        let mut expect_and = query.media_type.is_some();
        for token in iter {
            match (token, expect_and) {
                (Token::Word("and"), true) => expect_and = false,
                (Token::Group(group), false) => {
                    query.features.push(MediaFeature::parse(group)?);
                    expect_and = true;
                }
                (Token::Word(w), _) => return Err(MediaParseError::UnexpectedToken(w.to_string())),
                (Token::Group(g), true) => {
                    return Err(MediaParseError::UnexpectedToken(format!("({g})")));
                }
            }
        }
        if !expect_and {
            // dangling `and`, or nothing at all after a modifier
            return Err(if query.features.is_empty() && query.media_type.is_none() {
                MediaParseError::Empty
            } else {
                MediaParseError::UnexpectedToken("and".to_string())
            });
        }
        Ok(query)
    }

    /// Parse a comma-separated list; fails if any query fails.
    pub fn parse_list(input: &str) -> Result<Vec<Self>, MediaParseError> {
        if input.trim().is_empty() {
            return Ok(Vec::new());
        }
        input.split(',').map(Self::parse).collect()
    }
}

/// The display the conditions are evaluated against.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaContext {
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub device_pixel_ratio: f64,
    pub media_type: MediaType,
    /// Font size (px) for `em`/`rem` lengths.
    pub base_font_size: f64,
}

impl MediaContext {
    pub fn screen(width: f64, height: f64) -> Self {
        Self {
            viewport_width: width,
            viewport_height: height,
            device_pixel_ratio: 1.0,
            media_type: MediaType::Screen,
            base_font_size: 16.0,
        }
    }

    pub fn with_device_pixel_ratio(mut self, dpr: f64) -> Self {
        self.device_pixel_ratio = dpr;
        self
    }

    /// Evaluate a condition string. Empty conditions match; queries that
    /// fail to parse don't.
    pub fn matches(&self, condition: &str) -> bool {
        if condition.trim().is_empty() {
            return true;
        }
        condition.split(',').any(|part| match MediaQuery::parse(part) {
            Ok(query) => self.evaluate(&query),
            Err(e) => {
                tracing::trace!(condition = part, error = %e, "unparseable media query never matches");
                false
            }
        })
    }

    pub fn evaluate_list(&self, queries: &[MediaQuery]) -> bool {
        queries.is_empty() || queries.iter().any(|q| self.evaluate(q))
    }

    pub fn evaluate(&self, query: &MediaQuery) -> bool {
        let type_matches = match query.media_type {
            Some(MediaType::All) | None => true,
            Some(t) => t == self.media_type,
        };
        let matched = type_matches && query.features.iter().all(|f| self.evaluate_feature(f));
        match query.modifier {
            Some(MediaModifier::Not) => !matched,
            _ => matched,
        }
    }

    fn evaluate_feature(&self, feature: &MediaFeature) -> bool {
        let px = |l: &Length| l.to_px(self.base_font_size);
        let aspect = self.viewport_width / self.viewport_height;
        match feature {
            MediaFeature::Width(l) => (self.viewport_width - px(l)).abs() < 0.5,
            MediaFeature::MinWidth(l) => self.viewport_width >= px(l),
            MediaFeature::MaxWidth(l) => self.viewport_width <= px(l),
            MediaFeature::Height(l) => (self.viewport_height - px(l)).abs() < 0.5,
            MediaFeature::MinHeight(l) => self.viewport_height >= px(l),
            MediaFeature::MaxHeight(l) => self.viewport_height <= px(l),
            MediaFeature::Orientation(Orientation::Portrait) => {
                self.viewport_height >= self.viewport_width
            }
            MediaFeature::Orientation(Orientation::Landscape) => {
                self.viewport_width > self.viewport_height
            }
            MediaFeature::AspectRatio(r) => (aspect - r).abs() < 1e-6,
            MediaFeature::MinAspectRatio(r) => aspect >= *r,
            MediaFeature::MaxAspectRatio(r) => aspect <= *r,
            MediaFeature::Resolution(r) => (self.device_pixel_ratio - r).abs() < 1e-6,
            MediaFeature::MinResolution(r) => self.device_pixel_ratio >= *r,
            MediaFeature::MaxResolution(r) => self.device_pixel_ratio <= *r,
        }
    }
}
