use std::sync::LazyLock;

use regex::Regex;

use super::markup::strip_tags;

static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());
static BREAKS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

/// Pair every `Label:` line with the line that follows it.
///
/// Text is normalized first: markup stripped, space runs collapsed, and any
/// remaining run of two or more whitespace characters turned into a line
/// break. If the value line repeats the label as a prefix, the repeat is cut.
pub fn parse_labels(body: &str) -> Vec<(String, String)> {
    let text = strip_tags(body);
    let text = SPACES_RE.replace_all(text.trim(), " ");
    let text = BREAKS_RE.replace_all(&text, "\n");
    let lines: Vec<&str> = text.lines().collect();

    let mut pairs = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let Some(label) = line.strip_suffix(':') else {
            continue;
        };
        let label = label.trim();
        let value = lines
            .get(i + 1)
            .map(|next| next.strip_prefix(label).unwrap_or(next).trim())
            .unwrap_or("");
        pairs.push((label.to_string(), value.to_string()));
    }
    pairs
}

/// One `label<delimiter>value` line per pair.
pub fn render_pairs(pairs: &[(String, String)], delimiter: &str) -> Vec<String> {
    pairs
        .iter()
        .map(|(label, value)| format!("{}{}{}", label, delimiter, value))
        .collect()
}
