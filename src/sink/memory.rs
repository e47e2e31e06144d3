// src/sink/memory.rs

use std::collections::HashMap;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

use super::convert::records_to_batch;
use super::{check_columns, validate_dataset_name, DatasetReader, Sink};
use crate::decode::Record;
use crate::error::{IngestError, Result};
use crate::layout::{build_arrow_schema, columns_arrow_schema, Schema};

#[derive(Debug)]
struct MemoryDataset {
    columns: Vec<String>,
    arrow: SchemaRef,
    batches: Vec<RecordBatch>,
}

/// In-memory store with the same replace/append rules as `ParquetSink`.
/// Handy for dry runs; `fail_after` makes every write past the n-th fail.
#[derive(Debug, Default)]
pub struct MemorySink {
    datasets: HashMap<String, MemoryDataset>,
    writes: usize,
    fail_after: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `writes` writes, then fail every later one with a storage error.
    pub fn fail_after(writes: usize) -> Self {
        MemorySink {
            fail_after: Some(writes),
            ..Self::default()
        }
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn contains(&self, dataset: &str) -> bool {
        self.datasets.contains_key(dataset)
    }

    fn check_budget(&self) -> Result<()> {
        match self.fail_after {
            Some(limit) if self.writes >= limit => Err(IngestError::Storage(format!(
                "write {} refused: store accepts {} writes",
                self.writes + 1,
                limit
            ))),
            _ => Ok(()),
        }
    }

    fn replace(
        &mut self,
        dataset: &str,
        columns: &[String],
        arrow: SchemaRef,
        rows: &[Record],
    ) -> Result<u64> {
        validate_dataset_name(dataset)?;
        check_columns(dataset, columns, rows)?;
        self.check_budget()?;

        let batch = records_to_batch(arrow.clone(), rows)?;
        let written = batch.num_rows() as u64;
        self.datasets.insert(
            dataset.to_string(),
            MemoryDataset {
                columns: columns.to_vec(),
                arrow,
                batches: vec![batch],
            },
        );
        self.writes += 1;
        Ok(written)
    }
}

impl Sink for MemorySink {
    fn replace_and_write(
        &mut self,
        dataset: &str,
        columns: &[String],
        rows: &[Record],
    ) -> Result<u64> {
        self.replace(dataset, columns, columns_arrow_schema(columns), rows)
    }

    fn replace_with_layout(
        &mut self,
        dataset: &str,
        layout: &Schema,
        rows: &[Record],
    ) -> Result<u64> {
        let columns = layout.column_names();
        self.replace(dataset, &columns, build_arrow_schema(layout), rows)
    }

    fn append(&mut self, dataset: &str, rows: &[Record]) -> Result<u64> {
        let arrow = {
            let d = self
                .datasets
                .get(dataset)
                .ok_or_else(|| IngestError::DatasetNotFound(dataset.to_string()))?;
            check_columns(dataset, &d.columns, rows)?;
            d.arrow.clone()
        };
        self.check_budget()?;

        let batch = records_to_batch(arrow, rows)?;
        let written = batch.num_rows() as u64;
        if let Some(d) = self.datasets.get_mut(dataset) {
            d.batches.push(batch);
        }
        self.writes += 1;
        Ok(written)
    }
}

impl DatasetReader for MemorySink {
    fn columns(&self, dataset: &str) -> Result<Vec<String>> {
        self.datasets
            .get(dataset)
            .map(|d| d.columns.clone())
            .ok_or_else(|| IngestError::DatasetNotFound(dataset.to_string()))
    }

    fn read_batches(&self, dataset: &str) -> Result<Vec<RecordBatch>> {
        self.datasets
            .get(dataset)
            .map(|d| d.batches.clone())
            .ok_or_else(|| IngestError::DatasetNotFound(dataset.to_string()))
    }
}
