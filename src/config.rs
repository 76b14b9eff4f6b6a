use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::output::FailurePolicy;
use crate::scraper::{BatchOptions, RetryPolicy};

const ENV_PREFIX: &str = "BIO_SCRAPER";

/// Every knob of a run, built once in `main` and passed down.
///
/// Layers, lowest first: built-in defaults, optional TOML file,
/// `BIO_SCRAPER_*` environment (nested keys separated by `__`,
/// e.g. `BIO_SCRAPER_FETCH__CONCURRENCY=4`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Column separator for every table and per-identifier file.
    pub delimiter: String,
    pub output: OutputSettings,
    pub fetch: FetchSettings,
    pub taxonomy: TaxonomySettings,
    pub tables: TableSettings,
    pub summary: SummarySettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Root that every relative output path is joined onto.
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaxonomySettings {
    pub url_template: String,
    pub default_corpus: PathBuf,
    pub header_marker: String,
    pub field_tag: String,
    pub vocabulary: Vec<String>,
    pub default_value: String,
    /// Infobox text after this marker is ignored.
    pub stop_marker: Option<String>,
    /// `defaulted_row` or `drop`.
    pub failure_policy: FailurePolicy,
    pub name_column: String,
    pub ids_file: PathBuf,
    pub table_file: PathBuf,
    pub errors_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TableSettings {
    pub listing_url_template: String,
    pub table_url_template: String,
    pub id_link_pattern: String,
    pub container_tag: String,
    pub row_tag: String,
    pub cell_tag: String,
    pub default_start: u32,
    pub default_end: u32,
    pub out_dir: PathBuf,
    pub errors_file: PathBuf,
    pub listing_errors_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    pub input_dir: PathBuf,
    pub output_file: PathBuf,
    pub id_column: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            delimiter: "\t".to_string(),
            output: OutputSettings::default(),
            fetch: FetchSettings::default(),
            taxonomy: TaxonomySettings::default(),
            tables: TableSettings::default(),
            summary: SummarySettings::default(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self { dir: PathBuf::from(".") }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            concurrency: 10,
            timeout_secs: 30,
            max_retries: 3,
            backoff_ms: 2000,
            user_agent: concat!("bio_scraper/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for TaxonomySettings {
    fn default() -> Self {
        Self {
            url_template: "http://en.wikipedia.org/wiki/{id}".to_string(),
            default_corpus: PathBuf::from("TestData/All_DAMPD.fasta"),
            header_marker: ">".to_string(),
            field_tag: "OS=".to_string(),
            vocabulary: [
                "Kingdom", "Phylum", "Class", "Order", "Family", "Genus", "Subgenus", "Species",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            default_value: "Unknown".to_string(),
            stop_marker: Some("Binomial".to_string()),
            failure_policy: FailurePolicy::DefaultedRow,
            name_column: "Name".to_string(),
            ids_file: PathBuf::from("OSs.txt"),
            table_file: PathBuf::from("Classification.txt"),
            errors_file: PathBuf::from("OSsError.txt"),
        }
    }
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            listing_url_template: "http://aps.unmc.edu/AP/database/antiB.php?page={id}"
                .to_string(),
            table_url_template: "http://aps.unmc.edu/AP/database/query_output.php?ID={id:05}"
                .to_string(),
            id_link_pattern: r"(?i)query_output\.php\?ID=(\d{5})".to_string(),
            container_tag: "table".to_string(),
            row_tag: "tr".to_string(),
            cell_tag: "td".to_string(),
            default_start: 0,
            default_end: 134,
            out_dir: PathBuf::from("tables"),
            errors_file: PathBuf::from("TablesError.txt"),
            listing_errors_file: PathBuf::from("IdPagesError.txt"),
        }
    }
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("tables"),
            output_file: PathBuf::from("Summary.txt"),
            id_column: "ID".to_string(),
        }
    }
}

impl Settings {
    /// Layer defaults, an optional TOML file and the environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to load settings")?
            .try_deserialize::<Settings>()
            .context("Invalid settings")?;
        Ok(settings)
    }

    /// Resolve a configured path against the output root.
    pub fn out_path(&self, relative: &Path) -> PathBuf {
        self.output.dir.join(relative)
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.fetch.concurrency.max(1),
            retry: RetryPolicy {
                max_retries: self.fetch.max_retries,
                base_backoff: Duration::from_millis(self.fetch.backoff_ms),
            },
            show_progress: true,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }
}
