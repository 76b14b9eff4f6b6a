use std::collections::BTreeSet;
use std::fmt;
use std::io::BufRead;
use std::ops::Range;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::error::HarvestError;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{id(?::0(\d+))?\}").unwrap());

/// Identifier of a table discovered on a numbered listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PagedId {
    pub page: u32,
    pub id: u32,
}

impl fmt::Display for PagedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.page, self.id)
    }
}

/// Scan a FASTA-style annotation stream and return the distinct values of
/// `tag` found on header lines, sorted ascending.
///
/// Best effort: lines without the marker or the tag are skipped, values
/// without a trailing tag run to end of line.
pub fn scan_annotations<R: BufRead>(reader: R, marker: &str, tag: &str) -> Result<Vec<String>> {
    let mut values = BTreeSet::new();
    for line in reader.lines() {
        let line = line.context("Failed to read annotation line")?;
        if let Some(value) = annotation_value(&line, marker, tag) {
            values.insert(value.to_string());
        }
    }
    Ok(values.into_iter().collect())
}

/// Value of `tag` on a single header line, if any.
pub fn annotation_value<'a>(line: &'a str, marker: &str, tag: &str) -> Option<&'a str> {
    if !line.starts_with(marker) {
        return None;
    }
    let start = line.find(tag)? + tag.len();
    let rest = &line[start..];

    let end = match rest.find('=') {
        None => line.len(),
        Some(eq) => match rest[..eq].rfind(' ') {
            Some(space) => start + space,
            // Next tag glued to the value: drop a tag-name-sized suffix.
            None => {
                let mut end = start + eq.saturating_sub(tag.trim_end_matches('=').len());
                while !line.is_char_boundary(end) {
                    end -= 1;
                }
                end
            }
        },
    };

    let value = line[start..end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Half-open numeric identifier range.
pub fn range_ids(start: u32, end: u32) -> Result<Range<u32>, HarvestError> {
    if start >= end {
        return Err(HarvestError::MalformedArguments(format!(
            "empty range: start {} must be below end {}",
            start, end
        )));
    }
    Ok(start..end)
}

/// Pull numeric table identifiers out of a listing page body. The pattern's
/// first capture group must be the number. Result is sorted and deduplicated.
pub fn discover_ids(body: &str, pattern: &Regex) -> Vec<u32> {
    pattern
        .captures_iter(body)
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// URL with an `{id}` placeholder. `{id:05}` zero-pads numeric identifiers.
#[derive(Debug, Clone)]
pub struct UrlTemplate {
    template: String,
}

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into() }
    }

    pub fn render(&self, id: &str) -> String {
        PLACEHOLDER_RE
            .replace_all(&self.template, |caps: &regex::Captures| {
                match caps.get(1).and_then(|w| w.as_str().parse::<usize>().ok()) {
                    Some(width) if id.chars().all(|c| c.is_ascii_digit()) => {
                        format!("{:0>width$}", id, width = width)
                    }
                    _ => id.to_string(),
                }
            })
            .into_owned()
    }
}
