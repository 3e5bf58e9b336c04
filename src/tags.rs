//! Classification and ordering of registry tag strings (release tags, SHA
//! tags) and the numeric encoding used to compare release tags.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Result, WatcherError};

static RELEASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v([0-9]{1,3})\.([0-9]{1,3})\.([0-9]{1,3})$").unwrap());

static SHA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Fa-f0-9]{40}").unwrap());

/// True iff `tag` matches `vMAJOR.MINOR.PATCH` with each component `<1000`.
pub fn is_release(tag: &str) -> bool {
    RELEASE_RE.is_match(tag)
}

/// True iff `tag` contains a 40-hex-character run anywhere in the string.
pub fn is_sha(tag: &str) -> bool {
    SHA_RE.is_match(tag)
}

/// Retains tags that are not SHA-form, preserving input order.
pub fn filter_non_sha<'a, I>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    tags.into_iter()
        .filter(|t| !is_sha(t))
        .map(String::from)
        .collect()
}

/// Encodes a release tag `vA.B.C` as `A*1_000_000 + B*1_000 + C`.
///
/// Only meaningful for tags that pass [`is_release`]; the decision engine
/// never calls this on anything else.
pub fn tag_to_number(tag: &str) -> Option<i64> {
    let caps = RELEASE_RE.captures(tag)?;
    let major: i64 = caps[1].parse().ok()?;
    let minor: i64 = caps[2].parse().ok()?;
    let patch: i64 = caps[3].parse().ok()?;
    Some(major * 1_000_000 + minor * 1_000 + patch)
}

/// Filters `tags` to release tags and returns the one with the greatest
/// [`tag_to_number`] value.
pub fn latest_release_tag<'a>(tags: &'a [String]) -> Result<&'a str> {
    tags.iter()
        .filter(|t| is_release(t))
        .max_by_key(|t| tag_to_number(t).unwrap_or(i64::MIN))
        .map(String::as_str)
        .ok_or(WatcherError::NoReleaseTag(tags.len()))
}

/// True iff `tag` is empty (meaning "any tag is acceptable") or present in
/// `available`.
pub fn is_deployable(tag: &str, available: &[String]) -> bool {
    tag.is_empty() || available.iter().any(|t| t == tag)
}
