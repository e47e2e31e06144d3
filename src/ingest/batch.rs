// src/ingest/batch.rs

use tracing::info;

use crate::decode::Record;
use crate::error::Result;
use crate::layout::Schema;
use crate::sink::Sink;

/// Running totals, reported after every batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub batches: u64,
    pub records: u64,
}

/// Holds the decoded rows of the current batch and decides how each batch
/// reaches the sink: the first flush replaces the dataset, every later
/// flush appends to it.
pub struct BatchWriter<'a, S: Sink + ?Sized> {
    sink: &'a mut S,
    dataset: &'a str,
    layout: &'a Schema,
    max_rows: usize,
    batch: Vec<Record>,
    batch_index: u64,
    row_count: u64,
}

impl<'a, S: Sink + ?Sized> BatchWriter<'a, S> {
    /// `max_rows` must be at least 1.
    pub fn new(
        sink: &'a mut S,
        dataset: &'a str,
        layout: &'a Schema,
        max_rows: usize,
    ) -> Self {
        let max_rows = max_rows.max(1);
        BatchWriter {
            sink,
            dataset,
            layout,
            max_rows,
            batch: Vec::with_capacity(max_rows.min(65_536)),
            batch_index: 0,
            row_count: 0,
        }
    }

    /// Rows written to the sink so far.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn batch_count(&self) -> u64 {
        self.batch_index
    }

    /// Rows waiting in the current batch.
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            batches: self.batch_index,
            records: self.row_count,
        }
    }

    /// Add one record; writes the batch out once it is full.
    pub fn feed(&mut self, record: Record) -> Result<Option<Progress>> {
        self.batch.push(record);
        if self.batch.len() >= self.max_rows {
            return self.flush_batch().map(Some);
        }
        Ok(None)
    }

    /// Write the current batch (possibly empty) and start a new one.
    pub fn flush_batch(&mut self) -> Result<Progress> {
        let written = if self.batch_index == 0 {
            self.sink
                .replace_with_layout(self.dataset, self.layout, &self.batch)?
        } else {
            self.sink.append(self.dataset, &self.batch)?
        };
        self.batch_index += 1;
        self.row_count += written;
        self.batch.clear();

        info!(
            dataset = self.dataset,
            batch = self.batch_index,
            rows = written,
            total = self.row_count,
            "wrote batch"
        );
        Ok(self.progress())
    }

    /// Call once at end of input. Writes leftover rows; if nothing was ever
    /// written, still replaces the dataset so it exists with its columns.
    pub fn flush_final(&mut self) -> Result<Option<Progress>> {
        if self.batch.is_empty() && self.batch_index > 0 {
            return Ok(None);
        }
        self.flush_batch().map(Some)
    }
}
