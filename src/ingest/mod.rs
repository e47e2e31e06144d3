// src/ingest/mod.rs
pub mod batch;

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use tracing::{debug, info, instrument};

use crate::decode::{Decoder, MissingTokens};
use crate::error::{IngestError, Result};
use crate::layout::Schema;
use crate::sink::{validate_dataset_name, Sink};

pub use batch::{BatchWriter, Progress};

pub const DEFAULT_DATASET: &str = "survey";
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Source reads go through a buffer this large.
const READ_BUFFER_BYTES: usize = 1 << 20;

/// Upper bound on the line buffer's initial capacity. Layout END positions
/// are not trusted for allocation sizes; longer lines just grow the buffer.
const LINE_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub dataset: String,
    pub batch_size: usize,
    /// Stop after this many records.
    pub limit: Option<u64>,
    /// Checked between batches; once set the run stops with `Cancelled`.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            dataset: DEFAULT_DATASET.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            limit: None,
            cancel: None,
        }
    }
}

/// What a finished run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestReport {
    pub records: u64,
    pub batches: u64,
    /// Zero-length lines, which are not records.
    pub skipped_blank: u64,
}

/// Streams a fixed-width file into a sink, one bounded batch at a time.
pub struct Ingestor {
    decoder: Decoder,
    options: IngestOptions,
    on_progress: Option<Box<dyn FnMut(Progress)>>,
}

impl Ingestor {
    /// Fails with `Schema` on an empty or duplicate-named schema and with
    /// `Config` / `InvalidDataset` on unusable options, before any I/O.
    pub fn new(schema: Schema, tokens: MissingTokens, options: IngestOptions) -> Result<Self> {
        schema.validate()?;
        if options.batch_size == 0 {
            return Err(IngestError::Config("batch size must be at least 1".into()));
        }
        validate_dataset_name(&options.dataset)?;
        Ok(Ingestor {
            decoder: Decoder::new(schema, tokens),
            options,
            on_progress: None,
        })
    }

    /// Called after every batch write.
    pub fn on_progress(mut self, f: impl FnMut(Progress) + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Read `source_path` line by line, decode, and write batch after batch.
    ///
    /// The file handle lives only for this call. Any read or write error
    /// ends the run at once; the dataset then holds whatever batches were
    /// written before it.
    #[instrument(
        level = "info",
        skip(self, source_path, sink),
        fields(source = %source_path.as_ref().display(), dataset = %self.options.dataset)
    )]
    pub fn ingest<P, S>(&mut self, source_path: P, sink: &mut S) -> Result<IngestReport>
    where
        P: AsRef<Path>,
        S: Sink + ?Sized,
    {
        let source_path = source_path.as_ref();
        self.check_cancelled(0)?;

        let start = Instant::now();
        let file = File::open(source_path).map_err(|e| IngestError::io(source_path, e))?;
        let reader = BufReader::with_capacity(READ_BUFFER_BYTES, file);

        let report = self.stream(reader, source_path, sink)?;
        info!(
            records = report.records,
            batches = report.batches,
            skipped_blank = report.skipped_blank,
            elapsed = ?start.elapsed(),
            "ingestion complete"
        );
        Ok(report)
    }

    fn stream<R, S>(
        &mut self,
        mut reader: R,
        source_path: &Path,
        sink: &mut S,
    ) -> Result<IngestReport>
    where
        R: BufRead,
        S: Sink + ?Sized,
    {
        let Ingestor {
            decoder,
            options,
            on_progress,
        } = self;

        let mut writer = BatchWriter::new(
            sink,
            &options.dataset,
            decoder.schema(),
            options.batch_size,
        );
        let mut line = Vec::with_capacity(line_capacity(decoder.schema()));
        let mut skipped_blank = 0u64;

        loop {
            // between batches only, never mid-batch
            if writer.pending() == 0 {
                check_cancelled(options.cancel.as_deref(), writer.row_count())?;
            }
            if let Some(limit) = options.limit {
                if writer.row_count() + writer.pending() as u64 >= limit {
                    debug!(limit, "record limit reached");
                    break;
                }
            }

            line.clear();
            let n = reader
                .read_until(b'\n', &mut line)
                .map_err(|e| IngestError::io(source_path, e))?;
            if n == 0 {
                break;
            }
            if is_blank_line(&line) {
                skipped_blank += 1;
                continue;
            }

            if let Some(progress) = writer.feed(decoder.decode_line(&line))? {
                if let Some(f) = on_progress.as_deref_mut() {
                    f(progress);
                }
            }
        }

        if let Some(progress) = writer.flush_final()? {
            if let Some(f) = on_progress.as_deref_mut() {
                f(progress);
            }
        }

        Ok(IngestReport {
            records: writer.row_count(),
            batches: writer.batch_count(),
            skipped_blank,
        })
    }

    fn check_cancelled(&self, records: u64) -> Result<()> {
        check_cancelled(self.options.cancel.as_deref(), records)
    }
}

/// Ingest `source_path` into the default dataset with the default missing
/// tokens. Returns the number of records written.
pub fn ingest<P, S>(
    source_path: P,
    schema: &Schema,
    sink: &mut S,
    batch_size: usize,
) -> Result<u64>
where
    P: AsRef<Path>,
    S: Sink + ?Sized,
{
    let options = IngestOptions {
        batch_size,
        ..IngestOptions::default()
    };
    let mut ingestor = Ingestor::new(schema.clone(), MissingTokens::default(), options)?;
    Ok(ingestor.ingest(source_path, sink)?.records)
}

fn check_cancelled(flag: Option<&AtomicBool>, records: u64) -> Result<()> {
    match flag {
        Some(f) if f.load(Ordering::SeqCst) => {
            info!(records, "cancellation requested, stopping at batch boundary");
            Err(IngestError::Cancelled { records })
        }
        _ => Ok(()),
    }
}

fn line_capacity(schema: &Schema) -> usize {
    schema
        .record_width()
        .saturating_add(2)
        .min(LINE_BUFFER_BYTES)
}

fn is_blank_line(line: &[u8]) -> bool {
    matches!(line, b"\n" | b"\r\n" | b"\r" | b"")
}
