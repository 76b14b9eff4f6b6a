use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::corpus::PagedId;
use crate::error::{FetchError, HarvestError};
use crate::parser::infobox::ClosedRecord;

/// Receives exactly one outcome per identifier. Returns whether the
/// identifier counts as a success.
pub trait Sink<K, R> {
    fn accept(&mut self, key: K, outcome: Result<R, FetchError>) -> bool;
}

/// What a failed identifier leaves behind in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Every identifier gets a row; failures get an all-default row and are
    /// also listed as errors.
    DefaultedRow,
    /// Failures get no row and are only listed as errors.
    Drop,
}

/// Closed-vocabulary table, one row per identifier, ordered by identifier.
pub struct TableSink<K> {
    policy: FailurePolicy,
    id_column: String,
    vocabulary: Vec<String>,
    default_value: String,
    delimiter: String,
    rows: BTreeMap<K, ClosedRecord>,
    errors: BTreeSet<K>,
}

impl<K: Ord + Clone + Display> TableSink<K> {
    pub fn new(
        policy: FailurePolicy,
        id_column: &str,
        vocabulary: &[String],
        default_value: &str,
        delimiter: &str,
    ) -> Self {
        Self {
            policy,
            id_column: id_column.to_string(),
            vocabulary: vocabulary.to_vec(),
            default_value: default_value.to_string(),
            delimiter: delimiter.to_string(),
            rows: BTreeMap::new(),
            errors: BTreeSet::new(),
        }
    }

    #[cfg(test)]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Header plus one line per row.
    pub fn table_lines(&self) -> Vec<String> {
        let mut header = vec![self.id_column.clone()];
        header.extend(self.vocabulary.iter().cloned());

        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        lines.push(header.join(self.delimiter.as_str()));
        for (key, record) in &self.rows {
            let mut cells = vec![key.to_string().replace(self.delimiter.as_str(), " ")];
            cells.extend(record.values().map(|v| v.to_string()));
            lines.push(cells.join(self.delimiter.as_str()));
        }
        lines
    }

    /// Write the table and the error list. Both writes are attempted even
    /// if the first fails.
    pub fn render(&self, table: &Path, errors: &Path) -> Result<(), HarvestError> {
        let mut problems = Vec::new();
        if let Err(e) = write_lines(table, &self.table_lines()) {
            problems.push(format!("{:#}", e));
        }
        if let Err(e) = write_error_list(errors, &self.errors) {
            problems.push(format!("{:#}", e));
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(HarvestError::Render(problems))
        }
    }
}

impl<K: Ord + Clone + Display> Sink<K, ClosedRecord> for TableSink<K> {
    fn accept(&mut self, key: K, outcome: Result<ClosedRecord, FetchError>) -> bool {
        match outcome {
            Ok(record) => {
                let nothing_found = record.values().all(|v| v == self.default_value);
                if nothing_found && self.policy == FailurePolicy::Drop {
                    debug!("Nothing extracted for {}, dropped", key);
                    self.errors.insert(key);
                    return false;
                }
                self.rows.insert(key, record);
                true
            }
            Err(_) => {
                if self.policy == FailurePolicy::DefaultedRow {
                    let placeholder = ClosedRecord::defaulted(&self.vocabulary, &self.default_value);
                    self.rows.insert(key.clone(), placeholder);
                }
                self.errors.insert(key);
                false
            }
        }
    }
}

/// Where an identifier's own file goes, relative to the output directory.
pub trait FileKey {
    fn rel_path(&self) -> PathBuf;
}

impl FileKey for u32 {
    fn rel_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.txt", self))
    }
}

impl FileKey for PagedId {
    fn rel_path(&self) -> PathBuf {
        Path::new(&self.page.to_string()).join(format!("{}.txt", self.id))
    }
}

/// One file per identifier, written as results arrive. Uses the drop
/// policy: failed or empty identifiers get no file and land in the error list.
pub struct FileSink<K> {
    dir: PathBuf,
    written: usize,
    errors: BTreeSet<K>,
}

impl<K: Ord + Display + FileKey> FileSink<K> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: 0,
            errors: BTreeSet::new(),
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn render_errors(&self, path: &Path) -> Result<(), HarvestError> {
        write_error_list(path, &self.errors).map_err(|e| HarvestError::Render(vec![format!("{:#}", e)]))
    }
}

impl<K: Ord + Display + FileKey> Sink<K, Vec<String>> for FileSink<K> {
    fn accept(&mut self, key: K, outcome: Result<Vec<String>, FetchError>) -> bool {
        match outcome {
            Ok(lines) if !lines.is_empty() => {
                let path = self.dir.join(key.rel_path());
                match write_lines(&path, &lines) {
                    Ok(()) => {
                        debug!("Wrote {} rows for {} to {}", lines.len(), key, path.display());
                        self.written += 1;
                        true
                    }
                    Err(e) => {
                        warn!("Could not save {}: {:#}", key, e);
                        self.errors.insert(key);
                        false
                    }
                }
            }
            Ok(_) => {
                debug!("No rows extracted for {}", key);
                self.errors.insert(key);
                false
            }
            Err(_) => {
                self.errors.insert(key);
                false
            }
        }
    }
}

/// Keeps successful results in memory, keyed and ordered by identifier.
pub struct CollectSink<K, R> {
    pub results: BTreeMap<K, R>,
    pub errors: BTreeSet<K>,
}

impl<K: Ord, R> Default for CollectSink<K, R> {
    fn default() -> Self {
        Self {
            results: BTreeMap::new(),
            errors: BTreeSet::new(),
        }
    }
}

impl<K: Ord, R> Sink<K, R> for CollectSink<K, R> {
    fn accept(&mut self, key: K, outcome: Result<R, FetchError>) -> bool {
        match outcome {
            Ok(r) => {
                self.results.insert(key, r);
                true
            }
            Err(_) => {
                self.errors.insert(key);
                false
            }
        }
    }
}

/// Write newline-terminated lines, creating parent directories on demand.
pub fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut text = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn write_error_list<K: Display>(path: &Path, keys: &BTreeSet<K>) -> Result<()> {
    let lines: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    write_lines(path, &lines)
}
