use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use surveyload::{
    ingest::DEFAULT_DATASET,
    layout, logging, pipeline,
    sink::{batches_to_rows, DatasetReader, ParquetSink},
    IngestConfig,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "surveyload")]
#[command(about = "Load a fixed-width survey extract using its SAS layout", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the layout and load the data file into a dataset.
    Ingest(IngestArgs),

    /// Print the fields parsed from a layout file.
    Schema {
        #[arg(long)]
        layout: PathBuf,

        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Summarise a stored dataset.
    Inspect {
        #[arg(long)]
        out: PathBuf,

        #[arg(long, default_value = DEFAULT_DATASET)]
        dataset: String,

        /// Also print the first N rows.
        #[arg(long, default_value_t = 0)]
        head: usize,
    },
}

#[derive(Args)]
struct IngestArgs {
    /// JSON config file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, env = "SURVEYLOAD_LAYOUT")]
    layout: Option<PathBuf>,

    #[arg(long, env = "SURVEYLOAD_SOURCE")]
    source: Option<PathBuf>,

    #[arg(long, env = "SURVEYLOAD_OUT")]
    out: Option<PathBuf>,

    #[arg(long)]
    dataset: Option<String>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Stop after this many records.
    #[arg(long)]
    limit: Option<u64>,

    /// Replaces the default token list when given at least once.
    #[arg(long = "missing-token")]
    missing_tokens: Vec<String>,

    /// Treat all-blank fields as missing.
    #[arg(long)]
    blank_is_missing: bool,
}

impl IngestArgs {
    fn into_config(self) -> Result<IngestConfig> {
        let mut cfg = match &self.config {
            Some(path) => IngestConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => IngestConfig::default(),
        };
        if let Some(v) = self.layout {
            cfg.layout_path = v;
        }
        if let Some(v) = self.source {
            cfg.source_path = v;
        }
        if let Some(v) = self.out {
            cfg.output_dir = v;
        }
        if let Some(v) = self.dataset {
            cfg.dataset = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if self.limit.is_some() {
            cfg.limit = self.limit;
        }
        if !self.missing_tokens.is_empty() {
            cfg.missing_tokens = self.missing_tokens;
        }
        cfg.blank_is_missing |= self.blank_is_missing;
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    logging::init("info");
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Ingest(args) => {
            let cfg = args.into_config()?;
            info!(
                layout = %cfg.layout_path.display(),
                source = %cfg.source_path.display(),
                out = %cfg.output_dir.display(),
                "starting ingestion"
            );
            let summary = pipeline::run(&cfg).with_context(|| {
                format!("ingesting {} into `{}`", cfg.source_path.display(), cfg.dataset)
            })?;
            println!(
                "{}: {} fields, {} records in {} batches ({} blank lines skipped)",
                summary.dataset,
                summary.fields,
                summary.report.records,
                summary.report.batches,
                summary.report.skipped_blank
            );
        }

        Commands::Schema { layout: path, json } => {
            let schema = layout::parse_file(&path)
                .with_context(|| format!("reading layout {}", path.display()))?;
            schema.validate()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&schema)?);
            } else {
                for f in &schema {
                    println!(
                        "{:<24} {:>6}-{:<6} {:>4}  {}",
                        f.name,
                        f.start,
                        f.end,
                        f.width(),
                        f.kind.as_str()
                    );
                }
                println!("{} fields, record width {}", schema.len(), schema.record_width());
            }
        }

        Commands::Inspect { out, dataset, head } => {
            let store = ParquetSink::open_existing(&out)
                .with_context(|| format!("opening store {}", out.display()))?;
            let columns = store.columns(&dataset)?;
            let rows = store.row_count(&dataset)?;
            let parts = store.part_files(&dataset)?.len();
            println!(
                "{}: {} columns, {} rows, {} parts",
                dataset,
                columns.len(),
                rows,
                parts
            );

            if head > 0 {
                println!("{}", columns.join("\t"));
                let batches = store.read_head(&dataset, head)?;
                for row in batches_to_rows(&batches)? {
                    let cells: Vec<String> = row
                        .into_iter()
                        .map(|v| v.unwrap_or_else(|| "NA".to_string()))
                        .collect();
                    println!("{}", cells.join("\t"));
                }
            }
        }
    }

    Ok(())
}
