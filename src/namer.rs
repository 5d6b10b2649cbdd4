//! Collision-safe naming for installed collections.
//!
//! Two independent namespaces: the collection name shown to the user and the
//! backing file the host persists it to. A collision in one never influences
//! the other.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use strum::{Display, EnumString};

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("INTERNAL ERROR: invalid whitespace pattern"));

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("INTERNAL ERROR: invalid stem pattern"));

/// How the disambiguating ordinal is appended to a collection name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SuffixStyle {
    /// `"Main 2"`
    #[default]
    Spaced,
    /// `"Main (1)"`
    Parenthesized,
}

impl SuffixStyle {
    fn apply(self, desired: &str, ordinal: u64) -> String {
        match self {
            Self::Spaced => format!("{} {}", desired, ordinal),
            Self::Parenthesized => format!("{} ({})", desired, ordinal),
        }
    }
}

/// Suffixing rules for both namespaces.
///
/// The default numbers colliding names `"Main 2"`, `"Main 3"`, ...;
/// [`NamingRules::parenthesized`] gives `"Main (1)"`, `"Main (2)"`, ... instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingRules {
    pub suffix_style: SuffixStyle,
    /// First ordinal tried after the bare name collides
    pub first_ordinal: u32,
    /// Stem used when sanitization leaves nothing
    pub placeholder_stem: String,
    /// Backing file extension, without the dot
    pub extension: String,
}

impl Default for NamingRules {
    fn default() -> Self {
        Self {
            suffix_style: SuffixStyle::Spaced,
            first_ordinal: 2,
            placeholder_stem: "Untitled".to_string(),
            extension: "json".to_string(),
        }
    }
}

impl NamingRules {
    /// `"Main (1)"`, `"Main (2)"`, ... for colliding collection names
    pub fn parenthesized() -> Self {
        Self {
            suffix_style: SuffixStyle::Parenthesized,
            first_ordinal: 1,
            ..Self::default()
        }
    }
}

/// `desired`, or `desired` with the lowest free ordinal suffix.
///
/// At most `existing.len() + 1` candidates are tested; since they are all
/// distinct, one of them is free. Ordinals are widened to `u64` so they stay
/// distinct for any `first_ordinal`.
pub fn unique_container_name<I, S>(desired: &str, existing: I, rules: &NamingRules) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let taken: HashSet<String> = existing
        .into_iter()
        .map(|name| name.as_ref().to_string())
        .collect();

    let first = u64::from(rules.first_ordinal);
    let ordinals = (0..taken.len() as u64).map(|n| first + n);
    std::iter::once(desired.to_string())
        .chain(ordinals.map(|n| rules.suffix_style.apply(desired, n)))
        .find(|candidate| !taken.contains(candidate))
        .expect("INTERNAL ERROR: collection namespace exhausted")
}

/// Filesystem-safe stem of `desired`.
///
/// Whitespace runs become `_`, anything but ASCII alphanumerics, `_` and `-`
/// is dropped. Falls back to `placeholder` when nothing is left.
pub fn sanitize_stem(desired: &str, placeholder: &str) -> String {
    let collapsed = WHITESPACE_RUN.replace_all(desired.trim(), "_");
    let stem = UNSAFE_CHARS.replace_all(&collapsed, "");
    if stem.is_empty() || stem.chars().all(|c| c == '_') {
        placeholder.to_string()
    } else {
        stem.into_owned()
    }
}

/// Unique backing file name for `desired` against a directory listing.
///
/// Stems are compared case-insensitively since hosts commonly run on
/// case-insensitive filesystems.
pub fn unique_backing_id<I, S>(desired: &str, listing: I, rules: &NamingRules) -> PathBuf
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let taken: HashSet<String> = listing
        .into_iter()
        .filter_map(|file| {
            Path::new(file.as_ref())
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_lowercase())
        })
        .collect();

    let stem = sanitize_stem(desired, &rules.placeholder_stem);
    let candidates = (2..taken.len() as u64 + 2).map(|n| format!("{}_{}", stem, n));
    let unique = std::iter::once(stem.clone())
        .chain(candidates)
        .find(|candidate| !taken.contains(&candidate.to_lowercase()))
        .expect("INTERNAL ERROR: backing file namespace exhausted");

    PathBuf::from(format!("{}.{}", unique, rules.extension))
}
