//! Load a fixed-width survey extract into a columnar dataset, using the
//! SAS `INPUT` statement that ships with the extract as the field layout.
//!
//! The pieces, leaves first: [`layout`] parses the layout into a [`Schema`],
//! [`decode`] turns one line into a [`Record`], [`ingest`] streams a file
//! through the decoder in bounded batches, and [`sink`] stores the batches
//! (replace on the first, append afterwards).

pub mod config;
pub mod decode;
pub mod error;
pub mod ingest;
pub mod layout;
pub mod logging;
pub mod pipeline;
pub mod sink;

pub use config::IngestConfig;
pub use decode::{decode, Decoder, MissingTokens, Record, Value};
pub use error::{IngestError, Result};
pub use ingest::{ingest, IngestOptions, IngestReport, Ingestor, Progress};
pub use layout::{FieldKind, FieldSpec, Schema};
pub use pipeline::{run, RunSummary};
pub use sink::{DatasetReader, MemorySink, ParquetSink, Sink};
