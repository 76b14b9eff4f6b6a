mod config;
mod corpus;
mod error;
mod fetch;
mod output;
mod parser;
mod pipeline;
mod scraper;
mod summary;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};

use crate::config::Settings;
use crate::error::HarvestError;
use crate::fetch::HttpSource;
use crate::parser::RowStrategy;
use crate::pipeline::TableMode;

#[derive(Parser)]
#[command(
    name = "bio_scraper",
    about = "Fetch taxonomy infoboxes and peptide tables, extract fields into TSV"
)]
struct Cli {
    /// Settings file (TOML); BIO_SCRAPER_* env vars override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Annotation file to scan (same as `taxonomy <PATH>`)
    corpus: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a FASTA file for species and build the classification table
    Taxonomy {
        /// Annotation file (default: taxonomy.default_corpus)
        corpus: Option<PathBuf>,
    },
    /// Fetch table pages for a range and save one file per table
    Tables {
        /// id-pages (0): range is listing pages; table-pages (1): range is table ids
        #[arg(value_enum)]
        mode: ModeArg,
        /// First id, inclusive
        #[arg(requires = "end")]
        start: Option<u32>,
        /// Last id, exclusive
        end: Option<u32>,
        /// Extraction heuristic for each page
        #[arg(long, value_enum, default_value = "grid")]
        extractor: ExtractorArg,
    },
    /// Merge saved table files into one summary table
    Summarize {
        /// Comma-separated column names, matched as case-insensitive prefixes
        columns: String,
        /// Directory of field files (default: tables.out_dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    #[value(alias = "0")]
    IdPages,
    #[value(alias = "1")]
    TablePages,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExtractorArg {
    Grid,
    Labels,
}

impl From<ModeArg> for TableMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::IdPages => TableMode::IdPages,
            ModeArg::TablePages => TableMode::TablePages,
        }
    }
}

impl From<ExtractorArg> for RowStrategy {
    fn from(e: ExtractorArg) -> Self {
        match e {
            ExtractorArg::Grid => RowStrategy::Grid,
            ExtractorArg::Labels => RowStrategy::Labels,
        }
    }
}

/// A validated invocation. Building one does no I/O.
enum Invocation {
    Taxonomy(Option<PathBuf>),
    Tables {
        mode: TableMode,
        start: Option<u32>,
        end: Option<u32>,
        strategy: RowStrategy,
    },
    Summarize {
        columns: Vec<String>,
        dir: Option<PathBuf>,
    },
}

impl Invocation {
    fn from_cli(cli: Cli) -> Result<Self, HarvestError> {
        if cli.corpus.is_some() && cli.command.is_some() {
            return Err(HarvestError::MalformedArguments(
                "a corpus path cannot be combined with a subcommand".to_string(),
            ));
        }
        Ok(match cli.command {
            None => Invocation::Taxonomy(cli.corpus),
            Some(Commands::Taxonomy { corpus }) => Invocation::Taxonomy(corpus),
            Some(Commands::Tables { mode, start, end, extractor }) => {
                if let (Some(s), Some(e)) = (start, end) {
                    corpus::range_ids(s, e)?;
                }
                Invocation::Tables {
                    mode: mode.into(),
                    start,
                    end,
                    strategy: extractor.into(),
                }
            }
            Some(Commands::Summarize { columns, dir }) => Invocation::Summarize {
                columns: summary::parse_columns(&columns)?,
                dir,
            },
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let config_path = cli.config.clone();
    let invocation = match Invocation::from_cli(cli) {
        Ok(inv) => inv,
        Err(e) => Cli::command().error(ErrorKind::ValueValidation, e).exit(),
    };

    let settings = Settings::load(config_path.as_deref())?;
    let opts = settings.batch_options();

    let result = match invocation {
        Invocation::Taxonomy(corpus) => {
            let corpus = corpus.unwrap_or_else(|| settings.taxonomy.default_corpus.clone());
            let source = Arc::new(HttpSource::new(settings.timeout(), &settings.fetch.user_agent)?);
            println!("Scanning {} ...", corpus.display());
            let summary = pipeline::run_taxonomy(&settings, &corpus, source, &opts).await?;
            println!(
                "Completed: {} of {} species ({} failed)",
                summary.report.succeeded, summary.identifiers, summary.report.failed
            );
            println!(
                "Wrote {}, {}, {}",
                settings.out_path(&settings.taxonomy.ids_file).display(),
                settings.out_path(&settings.taxonomy.table_file).display(),
                settings.out_path(&settings.taxonomy.errors_file).display(),
            );
            Ok(())
        }
        Invocation::Tables { mode, start, end, strategy } => {
            let start = start.unwrap_or(settings.tables.default_start);
            let end = end.unwrap_or(settings.tables.default_end);
            let source = Arc::new(HttpSource::new(settings.timeout(), &settings.fetch.user_agent)?);
            let summary =
                pipeline::run_tables(&settings, mode, start, end, strategy, source, &opts).await?;
            if let Some(listing) = summary.listing {
                println!(
                    "Listing pages: {} ok, {} errors",
                    listing.succeeded, listing.failed
                );
            }
            println!(
                "Completed: {} of {} tables saved to {} ({} errors)",
                summary.files_written,
                summary.report.total,
                settings.out_path(&settings.tables.out_dir).display(),
                summary.report.failed
            );
            Ok(())
        }
        Invocation::Summarize { columns, dir } => {
            let rows = pipeline::run_summary(&settings, &columns, dir.as_deref())?;
            println!(
                "Summarized {} files into {}",
                rows,
                settings.out_path(&settings.summary.output_file).display()
            );
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(args: &[&str]) -> Result<Invocation, HarvestError> {
        let cli = Cli::try_parse_from(std::iter::once("bio_scraper").chain(args.iter().copied()))
            .expect("clap accepts the shape");
        Invocation::from_cli(cli)
    }

    #[test]
    fn no_arguments_is_default_taxonomy() {
        assert!(matches!(invocation(&[]), Ok(Invocation::Taxonomy(None))));
    }

    #[test]
    fn single_path_is_corpus() {
        match invocation(&["data/x.fasta"]) {
            Ok(Invocation::Taxonomy(Some(p))) => assert_eq!(p, PathBuf::from("data/x.fasta")),
            _ => panic!("expected taxonomy with corpus"),
        }
    }

    #[test]
    fn numeric_mode_selector() {
        match invocation(&["tables", "1", "3", "9"]) {
            Ok(Invocation::Tables { mode, start, end, strategy }) => {
                assert_eq!(mode, TableMode::TablePages);
                assert_eq!((start, end), (Some(3), Some(9)));
                assert_eq!(strategy, RowStrategy::Grid);
            }
            _ => panic!("expected tables"),
        }
        assert!(matches!(
            invocation(&["tables", "0", "--extractor", "labels"]),
            Ok(Invocation::Tables { mode: TableMode::IdPages, start: None, strategy: RowStrategy::Labels, .. })
        ));
    }

    #[test]
    fn semantic_errors_are_malformed() {
        assert!(matches!(
            invocation(&["tables", "table-pages", "9", "3"]),
            Err(HarvestError::MalformedArguments(_))
        ));
        assert!(matches!(
            invocation(&["summarize", " , "]),
            Err(HarvestError::MalformedArguments(_))
        ));
    }

    #[test]
    fn other_shapes_rejected_by_clap() {
        let parse = |args: &[&str]| Cli::try_parse_from(std::iter::once("bio_scraper").chain(args.iter().copied()));
        assert!(parse(&["a.fasta", "b.fasta"]).is_err());
        assert!(parse(&["tables", "2", "1", "5"]).is_err());
        assert!(parse(&["tables", "1", "x", "5"]).is_err());
        assert!(parse(&["tables", "1", "3"]).is_err());
        assert!(parse(&["summarize"]).is_err());
    }

    #[test]
    fn summarize_columns_split() {
        match invocation(&["summarize", "Name,Length", "--dir", "out"]) {
            Ok(Invocation::Summarize { columns, dir }) => {
                assert_eq!(columns, vec!["Name", "Length"]);
                assert_eq!(dir, Some(PathBuf::from("out")));
            }
            _ => panic!("expected summarize"),
        }
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(std::time::Duration::from_secs(75)), "1m 15s");
        assert_eq!(format_duration(std::time::Duration::from_secs(3725)), "1h 2m 5s");
    }
}
