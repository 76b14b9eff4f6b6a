use super::markup::strip_tags;

/// Fixed-vocabulary record. Always carries every vocabulary field, in
/// vocabulary order; fields never seen keep the default sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedRecord {
    fields: Vec<(String, String)>,
}

impl ClosedRecord {
    pub fn defaulted(vocabulary: &[String], default: &str) -> Self {
        Self {
            fields: vocabulary
                .iter()
                .map(|k| (k.clone(), default.to_string()))
                .collect(),
        }
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == field)
            .map(|(_, v)| v.as_str())
    }

    /// Returns false for fields outside the vocabulary.
    pub fn set(&mut self, field: &str, value: impl Into<String>) -> bool {
        match self.fields.iter_mut().find(|(k, _)| k == field) {
            Some((_, v)) => {
                *v = value.into();
                true
            }
            None => false,
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    BeforeRun,
    InRun,
    Done,
}

/// What the infobox scan needs besides the body.
#[derive(Debug, Clone)]
pub struct InfoboxRules {
    pub vocabulary: Vec<String>,
    pub default_value: String,
    pub stop_marker: Option<String>,
    pub delimiter: String,
}

/// Scan a page for a contiguous block of `Token: value` lines.
///
/// The first vocabulary line opens the block; the first non-vocabulary line
/// after it closes the block and everything after is ignored. A page with no
/// vocabulary lines gives an all-default record.
pub fn parse_infobox(body: &str, rules: &InfoboxRules) -> ClosedRecord {
    let mut record = ClosedRecord::defaulted(&rules.vocabulary, &rules.default_value);

    let body = match rules.stop_marker.as_deref().and_then(|m| body.find(m)) {
        Some(cut) => &body[..cut],
        None => body,
    };
    let text = strip_tags(body);

    let mut state = Scan::BeforeRun;
    for line in text.split(['\r', '\n']).filter(|l| !l.is_empty()) {
        let token = match_token(line, &rules.vocabulary);
        state = match (state, token) {
            (Scan::Done, _) => break,
            (_, Some(token)) => {
                if let Some((_, value)) = line.split_once(':') {
                    let value = value.trim();
                    if !value.is_empty() {
                        record.set(token, value.replace(rules.delimiter.as_str(), " "));
                    }
                }
                Scan::InRun
            }
            (Scan::BeforeRun, None) => Scan::BeforeRun,
            (Scan::InRun, None) => Scan::Done,
        };
    }

    record
}

fn match_token<'a>(line: &str, vocabulary: &'a [String]) -> Option<&'a str> {
    let line = line.trim_start();
    vocabulary
        .iter()
        .find(|token| {
            line.strip_prefix(token.as_str())
                .is_some_and(|rest| rest.starts_with(':'))
        })
        .map(|t| t.as_str())
}
