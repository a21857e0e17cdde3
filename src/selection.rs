//! Source selection: first source whose media condition matches wins.

use crate::media::MediaContext;
use crate::types::ImageSource;
use thiserror::Error;

/// The caller broke the component's input contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("no sources provided for the image")]
    NoSources,
}

/// Return the url of the first source whose condition `matches`, or `None`
/// if no condition matches.
///
/// An empty source list is a contract violation, not "no match".
pub fn select_source<'a, F>(
    sources: &'a [ImageSource],
    mut matches: F,
) -> Result<Option<&'a str>, ConfigurationError>
where
    F: FnMut(&str) -> bool,
{
    if sources.is_empty() {
        return Err(ConfigurationError::NoSources);
    }
    Ok(sources
        .iter()
        .find(|source| matches(&source.condition))
        .map(|source| source.url.as_str()))
}

/// [`select_source`] using media queries evaluated against `ctx`.
pub fn select_with_context<'a>(
    sources: &'a [ImageSource],
    ctx: &MediaContext,
) -> Result<Option<&'a str>, ConfigurationError> {
    select_source(sources, |condition| ctx.matches(condition))
}
