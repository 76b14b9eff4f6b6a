use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::info;

use crate::config::Settings;
use crate::corpus::{self, PagedId, UrlTemplate};
use crate::error::HarvestError;
use crate::fetch::DocumentSource;
use crate::output::{write_error_list, write_lines, CollectSink, FileSink, TableSink};
use crate::parser::grid::GridTags;
use crate::parser::infobox::{self, InfoboxRules};
use crate::parser::{self, RowStrategy};
use crate::scraper::{self, BatchOptions, BatchReport, Job};

/// How table identifiers are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableMode {
    /// Range is listing page numbers; table ids are discovered on them.
    IdPages,
    /// Range is table ids.
    TablePages,
}

#[derive(Debug)]
pub struct TaxonomySummary {
    pub identifiers: usize,
    pub report: BatchReport,
}

#[derive(Debug)]
pub struct TableSummary {
    pub listing: Option<BatchReport>,
    pub report: BatchReport,
    pub files_written: usize,
}

/// Corpus scan → infobox per species → classification table.
///
/// With the default defaulted-row policy every species gets exactly one row.
pub async fn run_taxonomy<S: DocumentSource>(
    settings: &Settings,
    corpus_path: &Path,
    source: Arc<S>,
    opts: &BatchOptions,
) -> Result<TaxonomySummary> {
    let cfg = &settings.taxonomy;
    if !corpus_path.is_file() {
        return Err(HarvestError::InputNotFound(corpus_path.to_path_buf()).into());
    }

    let file = File::open(corpus_path)
        .with_context(|| format!("Failed to open {}", corpus_path.display()))?;
    let names = corpus::scan_annotations(BufReader::new(file), &cfg.header_marker, &cfg.field_tag)?;
    info!("Found {} distinct {} values in {}", names.len(), cfg.field_tag, corpus_path.display());
    write_lines(&settings.out_path(&cfg.ids_file), &names)?;

    let template = UrlTemplate::new(cfg.url_template.as_str());
    let jobs: Vec<Job<String>> = names
        .iter()
        .map(|name| Job {
            key: name.clone(),
            url: template.render(name),
        })
        .collect();

    let rules = InfoboxRules {
        vocabulary: cfg.vocabulary.clone(),
        default_value: cfg.default_value.clone(),
        stop_marker: cfg.stop_marker.clone(),
        delimiter: settings.delimiter.clone(),
    };
    let mut sink = TableSink::new(
        cfg.failure_policy,
        &cfg.name_column,
        &cfg.vocabulary,
        &cfg.default_value,
        &settings.delimiter,
    );

    let report = scraper::run_batch(
        jobs,
        source,
        move |body: &str| infobox::parse_infobox(body, &rules),
        &mut sink,
        opts,
    )
    .await?;

    sink.render(&settings.out_path(&cfg.table_file), &settings.out_path(&cfg.errors_file))?;

    Ok(TaxonomySummary {
        identifiers: names.len(),
        report,
    })
}

/// Fetch table pages for a range and save each page's rows to its own file.
///
/// Uses the drop policy: failed or empty pages get no file.
pub async fn run_tables<S: DocumentSource>(
    settings: &Settings,
    mode: TableMode,
    start: u32,
    end: u32,
    strategy: RowStrategy,
    source: Arc<S>,
    opts: &BatchOptions,
) -> Result<TableSummary> {
    let cfg = &settings.tables;
    let range = corpus::range_ids(start, end)?;
    let out_dir = settings.out_path(&cfg.out_dir);
    let tags = GridTags {
        container: cfg.container_tag.clone(),
        row: cfg.row_tag.clone(),
        cell: cfg.cell_tag.clone(),
    };
    let delimiter = settings.delimiter.clone();
    let extract = move |body: &str| parser::extract_rows(body, strategy, &tags, &delimiter);
    let table_template = UrlTemplate::new(cfg.table_url_template.as_str());

    match mode {
        TableMode::TablePages => {
            let jobs: Vec<Job<u32>> = range
                .map(|id| Job {
                    key: id,
                    url: table_template.render(&id.to_string()),
                })
                .collect();
            let mut sink: FileSink<u32> = FileSink::new(out_dir);
            let report = scraper::run_batch(jobs, source, extract, &mut sink, opts).await?;
            sink.render_errors(&settings.out_path(&cfg.errors_file))?;
            Ok(TableSummary {
                listing: None,
                report,
                files_written: sink.written(),
            })
        }
        TableMode::IdPages => {
            let pattern = Regex::new(&cfg.id_link_pattern)
                .with_context(|| format!("Invalid id link pattern {:?}", cfg.id_link_pattern))?;
            let listing_template = UrlTemplate::new(cfg.listing_url_template.as_str());
            let listing_jobs: Vec<Job<u32>> = range
                .map(|page| Job {
                    key: page,
                    url: listing_template.render(&page.to_string()),
                })
                .collect();

            let mut listings: CollectSink<u32, Vec<u32>> = CollectSink::default();
            let listing_report = scraper::run_batch(
                listing_jobs,
                Arc::clone(&source),
                move |body: &str| corpus::discover_ids(body, &pattern),
                &mut listings,
                opts,
            )
            .await?;
            write_error_list(&settings.out_path(&cfg.listing_errors_file), &listings.errors)?;

            let jobs: Vec<Job<PagedId>> = listings
                .results
                .iter()
                .flat_map(|(page, ids)| ids.iter().map(move |id| PagedId { page: *page, id: *id }))
                .map(|key| Job {
                    key,
                    url: table_template.render(&key.id.to_string()),
                })
                .collect();
            info!(
                "Discovered {} tables on {} listing pages",
                jobs.len(),
                listings.results.len()
            );

            let mut sink: FileSink<PagedId> = FileSink::new(out_dir);
            let report = scraper::run_batch(jobs, source, extract, &mut sink, opts).await?;
            sink.render_errors(&settings.out_path(&cfg.errors_file))?;
            Ok(TableSummary {
                listing: Some(listing_report),
                report,
                files_written: sink.written(),
            })
        }
    }
}

/// Merge per-identifier field files into one table. Returns the row count.
pub fn run_summary(settings: &Settings, columns: &[String], dir: Option<&Path>) -> Result<usize> {
    let cfg = &settings.summary;
    let input = match dir {
        Some(d) => d.to_path_buf(),
        None => settings.out_path(&cfg.input_dir),
    };
    let lines = crate::summary::summarize_dir(&input, columns, &cfg.id_column, &settings.delimiter)?;
    write_lines(&settings.out_path(&cfg.output_file), &lines)?;
    Ok(lines.len().saturating_sub(1))
}
