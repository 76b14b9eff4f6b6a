use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::info;

use crate::error::HarvestError;

/// Split a user column list (`"Name, Length,Activity"`) into column names.
pub fn parse_columns(list: &str) -> Result<Vec<String>, HarvestError> {
    let columns: Vec<String> = list
        .split(',')
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(|c| c.to_string())
        .collect();
    if columns.is_empty() {
        return Err(HarvestError::MalformedArguments(format!(
            "no column names in {:?}",
            list
        )));
    }
    Ok(columns)
}

/// Value of each requested column in one field file.
///
/// A column takes the first line whose label starts with the column name
/// (ASCII case-insensitive); the value is everything after the first
/// delimiter. Columns with no matching line are empty.
pub fn summarize_text(text: &str, columns: &[String], delimiter: &str) -> Vec<String> {
    let lines: Vec<(String, &str)> = text
        .lines()
        .map(|l| (l.to_ascii_lowercase(), l))
        .collect();
    columns
        .iter()
        .map(|column| {
            let wanted = column.to_ascii_lowercase();
            lines
                .iter()
                .find(|(lower, _)| lower.starts_with(&wanted))
                .and_then(|(_, line)| line.split_once(delimiter))
                .map(|(_, value)| value.trim().to_string())
                .unwrap_or_default()
        })
        .collect()
}

/// Field files in `dir`, sorted by file name. Subdirectories (one per
/// listing page) are walked as well.
pub fn field_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(HarvestError::InputNotFound(dir.to_path_buf()).into());
    }
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current)
            .with_context(|| format!("Failed to list {}", current.display()))?
        {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Header plus one row per field file under `dir`.
pub fn summarize_dir(
    dir: &Path,
    columns: &[String],
    id_column: &str,
    delimiter: &str,
) -> Result<Vec<String>> {
    let files = field_files(dir)?;
    info!("Summarizing {} field files from {}", files.len(), dir.display());

    let rows: Vec<String> = files
        .par_iter()
        .map(|path| -> Result<String> {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let id = path
                .strip_prefix(dir)
                .unwrap_or(path)
                .with_extension("")
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            let mut cells = vec![id];
            cells.extend(summarize_text(&text, columns, delimiter));
            Ok(cells.join(delimiter))
        })
        .collect::<Result<_>>()?;

    let mut header = vec![id_column.to_string()];
    header.extend(columns.iter().cloned());
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(header.join(delimiter));
    lines.extend(rows);
    Ok(lines)
}
