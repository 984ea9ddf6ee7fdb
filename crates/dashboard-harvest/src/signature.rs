//! Header signatures and name sanitation.
//!
//! A signature is the comma-joined list of normalized header labels of one
//! table. It is the only key that ties a rendered widget to the file its
//! export control produced, so the DOM side and the file side must both go
//! through the same [`SignatureNormalizer`] value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a sanitized widget name.
pub const MAX_WIDGET_NAME_LEN: usize = 50;

/// Instructional text that table libraries append to sortable headers.
pub const DEFAULT_SORT_HINTS: &[&str] = &[
    "Sort table by",
    "Click to sort",
    "click to sort",
    "Sort column",
];

/// Title suffixes stripped before a page title becomes a dashboard name.
pub const DEFAULT_TITLE_SUFFIXES: &[&str] = &["- Chartink.com", "| Chartink.com", "Chartink.com"];

/// Canonical, comparable form of a table's header row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns raw header labels into a [`Signature`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureNormalizer {
    hints: Vec<String>,
}

impl Default for SignatureNormalizer {
    fn default() -> Self {
        Self::with_hints(DEFAULT_SORT_HINTS.iter().copied())
    }
}

impl SignatureNormalizer {
    /// Create a normalizer that cuts labels at any of `hints`.
    pub fn with_hints<I, S>(hints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hints: hints
                .into_iter()
                .map(Into::into)
                .filter(|h: &String| !h.is_empty())
                .collect(),
        }
    }

    pub fn hints(&self) -> &[String] {
        &self.hints
    }

    /// Normalize one header label.
    ///
    /// Drops a leading BOM, cuts at the earliest instructional hint, then
    /// collapses every whitespace run to one space and trims.
    pub fn normalize_label(&self, raw: &str) -> String {
        let mut label = raw.trim_start_matches('\u{feff}');
        if let Some(cut) = self.hints.iter().filter_map(|h| label.find(h.as_str())).min() {
            label = &label[..cut];
        }
        label.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Build the signature of a header row, or `None` when the row carries
    /// no usable schema (no labels, or every label empty after normalizing).
    pub fn signature<I, S>(&self, labels: I) -> Option<Signature>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let labels: Vec<String> = labels
            .into_iter()
            .map(|l| self.normalize_label(l.as_ref()))
            .collect();
        if labels.iter().all(String::is_empty) {
            return None;
        }
        Some(Signature(labels.join(",")))
    }
}

/// Sanitize a widget heading into a file stem.
///
/// Runs of anything other than ASCII alphanumerics become a single
/// underscore, leading/trailing underscores are trimmed, and the result is
/// cut at [`MAX_WIDGET_NAME_LEN`] characters. Returns `None` if nothing
/// usable remains.
pub fn sanitize_widget_name(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let mut name: String = out.trim_matches('_').chars().take(MAX_WIDGET_NAME_LEN).collect();
    while name.ends_with('_') {
        name.pop();
    }
    (!name.is_empty()).then_some(name)
}

/// Derive a dashboard folder name from a page title.
///
/// The first matching suffix is stripped, characters other than
/// alphanumerics, `-` and `_` are dropped as separators, and whitespace runs
/// collapse to `_`. Returns `None` if nothing usable remains.
pub fn dashboard_name<S: AsRef<str>>(title: &str, suffixes: &[S]) -> Option<String> {
    let mut title = title.trim();
    for suffix in suffixes {
        if let Some(stripped) = title.strip_suffix(suffix.as_ref().trim()) {
            title = stripped.trim_end();
            break;
        }
    }

    let spaced: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();
    let name = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    (!name.is_empty()).then_some(name)
}
