// src/sink/convert.rs

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StringArray, StringBuilder};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

use crate::decode::{Record, Value};
use crate::error::{IngestError, Result};

/// Build one Utf8 column per field of `schema`; `Missing` becomes null.
pub fn records_to_batch(schema: SchemaRef, rows: &[Record]) -> Result<RecordBatch> {
    let width = schema.fields().len();
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(width);

    for idx in 0..width {
        let mut b = StringBuilder::with_capacity(rows.len(), rows.len() * 8);
        for row in rows {
            match row.values().get(idx) {
                Some(Value::Text(s)) => b.append_value(s),
                _ => b.append_null(),
            }
        }
        arrays.push(Arc::new(b.finish()) as ArrayRef);
    }

    RecordBatch::try_new(schema, arrays).map_err(Into::into)
}

/// Flatten stored batches back into rows of optional strings.
pub fn batches_to_rows(batches: &[RecordBatch]) -> Result<Vec<Vec<Option<String>>>> {
    let total = batches.iter().map(RecordBatch::num_rows).sum();
    let mut rows = Vec::with_capacity(total);

    for batch in batches {
        let mut cols = Vec::with_capacity(batch.num_columns());
        for (i, field) in batch.schema().fields().iter().enumerate() {
            let arr = batch
                .column(i)
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| {
                    IngestError::Storage(format!(
                        "column `{}` is {:?}, expected Utf8",
                        field.name(),
                        batch.column(i).data_type()
                    ))
                })?;
            cols.push(arr);
        }
        for r in 0..batch.num_rows() {
            rows.push(
                cols.iter()
                    .map(|arr| (!arr.is_null(r)).then(|| arr.value(r).to_string()))
                    .collect(),
            );
        }
    }
    Ok(rows)
}
