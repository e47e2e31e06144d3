// src/pipeline.rs

use std::sync::{atomic::AtomicBool, Arc};

use tracing::{info, instrument};

use crate::config::IngestConfig;
use crate::error::Result;
use crate::ingest::{IngestReport, Ingestor};
use crate::layout;
use crate::sink::ParquetSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub dataset: String,
    pub fields: usize,
    pub report: IngestReport,
}

/// Parse the layout, then stream the source into the configured store.
///
/// A layout without usable field declarations stops the run before the
/// store is opened or the source is read.
pub fn run(config: &IngestConfig) -> Result<RunSummary> {
    run_with_cancel(config, None)
}

#[instrument(level = "info", skip_all, fields(dataset = %config.dataset))]
pub fn run_with_cancel(
    config: &IngestConfig,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<RunSummary> {
    config.validate()?;

    let schema = layout::parse_file(&config.layout_path)?;
    schema.validate()?;
    let fields = schema.len();
    info!(
        layout = %config.layout_path.display(),
        fields,
        record_width = schema.record_width(),
        "parsed layout"
    );

    let mut options = config.ingest_options();
    options.cancel = cancel;
    let mut ingestor = Ingestor::new(schema, config.missing_tokens(), options)?;

    let mut sink = ParquetSink::open(&config.output_dir)?;
    let report = ingestor.ingest(&config.source_path, &mut sink)?;

    Ok(RunSummary {
        dataset: config.dataset.clone(),
        fields,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use crate::sink::{batches_to_rows, DatasetReader};
    use std::fs;
    use tempfile::tempdir;

    const LAYOUT: &str = r#"DATA nssrn;
  INFILE 'nssrn_2022_puf_flat.txt';
  INPUT
    AGE 1-2
    SEX $3-3
  ;
RUN;
"#;

    fn config_in(dir: &std::path::Path, layout: &str, data: &str) -> anyhow::Result<IngestConfig> {
        let layout_path = dir.join("layout.sas");
        let source_path = dir.join("data.txt");
        fs::write(&layout_path, layout)?;
        fs::write(&source_path, data)?;
        Ok(IngestConfig {
            layout_path,
            source_path,
            output_dir: dir.join("store"),
            dataset: "nssrn".into(),
            batch_size: 2,
            ..IngestConfig::default()
        })
    }

    #[test]
    fn runs_end_to_end() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let cfg = config_in(dir.path(), LAYOUT, "29M\nL M\n41F\n")?;

        let summary = run(&cfg)?;
        assert_eq!(summary.fields, 2);
        assert_eq!(summary.report.records, 3);
        assert_eq!(summary.report.batches, 2);

        let store = ParquetSink::open(&cfg.output_dir)?;
        let rows = batches_to_rows(&store.read_batches("nssrn")?)?;
        assert_eq!(
            rows,
            vec![
                vec![Some("29".to_string()), Some("M".to_string())],
                vec![None, Some("M".to_string())],
                vec![Some("41".to_string()), Some("F".to_string())],
            ]
        );
        Ok(())
    }

    #[test]
    fn layout_without_input_block_never_opens_the_store() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let cfg = config_in(dir.path(), "DATA x;\n  AGE 1-2\nRUN;\n", "29M\n")?;

        let err = run(&cfg).unwrap_err();
        assert!(matches!(err, IngestError::Schema(_)));
        assert!(!cfg.output_dir.exists());
        Ok(())
    }

    #[test]
    fn cancelled_before_start_writes_nothing() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let cfg = config_in(dir.path(), LAYOUT, "29M\n")?;

        let cancel = Arc::new(AtomicBool::new(true));
        let err = run_with_cancel(&cfg, Some(cancel)).unwrap_err();
        assert!(matches!(err, IngestError::Cancelled { records: 0 }));
        let store = ParquetSink::open(&cfg.output_dir)?;
        assert!(!store.exists("nssrn")?);
        Ok(())
    }
}
