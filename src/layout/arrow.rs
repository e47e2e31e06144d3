// src/layout/arrow.rs

use std::collections::HashMap;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema, SchemaRef};

use super::types::{FieldSpec, Schema};

pub const META_START: &str = "start";
pub const META_END: &str = "end";
pub const META_KIND: &str = "kind";

/// Build an ArrowSchema (inside an Arc) from a parsed layout.
///
/// Every stored column is nullable Utf8: null is a missing value, and
/// numeric interpretation is left to whoever reads the dataset. Each field
/// keeps its layout position and kind as metadata, so stored files still
/// say where a column came from.
pub fn build_arrow_schema(schema: &Schema) -> SchemaRef {
    let fields: Vec<ArrowField> = schema.iter().map(arrow_field).collect();
    Arc::new(ArrowSchema::new(fields))
}

/// Plain column-name schema, for datasets created without a layout.
pub fn columns_arrow_schema(columns: &[String]) -> SchemaRef {
    let fields: Vec<ArrowField> = columns
        .iter()
        .map(|name| ArrowField::new(name, DataType::Utf8, /* nullable = */ true))
        .collect();
    Arc::new(ArrowSchema::new(fields))
}

fn arrow_field(spec: &FieldSpec) -> ArrowField {
    let metadata = HashMap::from([
        (META_START.to_string(), spec.start.to_string()),
        (META_END.to_string(), spec.end.to_string()),
        (META_KIND.to_string(), spec.kind.as_str().to_string()),
    ]);
    ArrowField::new(&spec.name, DataType::Utf8, true).with_metadata(metadata)
}
