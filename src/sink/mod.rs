// src/sink/mod.rs
pub mod convert;
pub mod memory;
pub mod store;

use arrow::record_batch::RecordBatch;

use crate::decode::Record;
use crate::error::{IngestError, Result};
use crate::layout::Schema;

pub use convert::{batches_to_rows, records_to_batch};
pub use memory::MemorySink;
pub use store::ParquetSink;

/// Destination of an ingestion run.
///
/// A run calls `replace_and_write` exactly once, for its first batch, and
/// `append` for every batch after that. Both return the number of rows
/// written.
pub trait Sink {
    /// Drop `dataset` if it exists, recreate it with `columns`, write `rows`.
    fn replace_and_write(&mut self, dataset: &str, columns: &[String], rows: &[Record])
        -> Result<u64>;

    /// `replace_and_write` with the layout's columns. Stores that can keep
    /// field positions and kinds alongside the data override this.
    fn replace_with_layout(
        &mut self,
        dataset: &str,
        layout: &Schema,
        rows: &[Record],
    ) -> Result<u64> {
        self.replace_and_write(dataset, &layout.column_names(), rows)
    }

    /// Add `rows` to an existing dataset. The rows' columns must equal the
    /// columns the dataset was created with.
    fn append(&mut self, dataset: &str, rows: &[Record]) -> Result<u64>;
}

/// Read-only view used by whatever queries the stored data.
pub trait DatasetReader {
    fn columns(&self, dataset: &str) -> Result<Vec<String>>;

    /// Stored batches, in write order.
    fn read_batches(&self, dataset: &str) -> Result<Vec<RecordBatch>>;

    fn row_count(&self, dataset: &str) -> Result<u64> {
        Ok(self
            .read_batches(dataset)?
            .iter()
            .map(|b| b.num_rows() as u64)
            .sum())
    }

    /// At most the first `limit` rows, in write order.
    fn read_head(&self, dataset: &str, limit: usize) -> Result<Vec<RecordBatch>> {
        take_rows(self.read_batches(dataset)?.into_iter().map(Ok), limit)
    }
}

/// Collect batches until `limit` rows are in hand, slicing the last one.
/// Stops pulling from `batches` as soon as the limit is met.
pub(crate) fn take_rows<I>(batches: I, limit: usize) -> Result<Vec<RecordBatch>>
where
    I: IntoIterator<Item = Result<RecordBatch>>,
{
    let mut out = Vec::new();
    let mut remaining = limit;
    for batch in batches {
        if remaining == 0 {
            break;
        }
        let batch = batch?;
        let take = batch.num_rows().min(remaining);
        remaining -= take;
        out.push(if take == batch.num_rows() {
            batch
        } else {
            batch.slice(0, take)
        });
    }
    Ok(out)
}

/// Dataset names become directory names, so keep them to a single plain
/// path component.
pub fn validate_dataset_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if bad {
        Err(IngestError::InvalidDataset(name.to_string()))
    } else {
        Ok(())
    }
}

/// Every row must carry exactly the dataset's columns.
///
/// Rows from one decoder share a single column list, so after the first
/// full comparison the rest are pointer checks.
pub(crate) fn check_columns(dataset: &str, expected: &[String], rows: &[Record]) -> Result<()> {
    let mut verified: Option<&[String]> = None;
    for row in rows {
        let columns = row.columns();
        let shared = std::ptr::eq(columns, expected)
            || verified.is_some_and(|v| std::ptr::eq(v, columns));
        if shared {
            continue;
        }
        if columns != expected {
            return Err(IngestError::SchemaMismatch {
                dataset: dataset.to_string(),
                expected: expected.to_vec(),
                actual: columns.to_vec(),
            });
        }
        verified = Some(columns);
    }
    Ok(())
}
