// src/decode/mod.rs
pub mod missing;

use std::sync::Arc;

use crate::layout::{FieldSpec, Schema};

pub use missing::MissingTokens;

/// One decoded field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Declared missing by a sentinel token, or not covered by the line.
    Missing,
    /// Trimmed raw text; may be empty.
    Text(String),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Missing => None,
            Value::Text(s) => Some(s.as_str()),
        }
    }
}

/// One decoded line: field name → value, in schema order.
/// Column names are shared by every record decoded with the same schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == name)?;
        self.values.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Decodes fixed-width lines against one schema and one token set.
#[derive(Debug, Clone)]
pub struct Decoder {
    schema: Schema,
    columns: Arc<[String]>,
    tokens: MissingTokens,
}

impl Decoder {
    pub fn new(schema: Schema, tokens: MissingTokens) -> Self {
        let columns: Arc<[String]> = Arc::from(schema.column_names());
        Decoder {
            schema,
            columns,
            tokens,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn tokens(&self) -> &MissingTokens {
        &self.tokens
    }

    /// Never fails: a field the line does not fully cover, or whose bytes
    /// are not valid UTF-8, degrades on its own without touching the rest.
    pub fn decode_line<L: AsRef<[u8]>>(&self, line: L) -> Record {
        let line = strip_line_end(line.as_ref());
        let values = self
            .schema
            .iter()
            .map(|spec| decode_field(line, spec, &self.tokens))
            .collect();
        Record {
            columns: Arc::clone(&self.columns),
            values,
        }
    }
}

/// One-off decode of a single line. Prefer `Decoder` when decoding many.
pub fn decode<L: AsRef<[u8]>>(line: L, schema: &Schema, tokens: &MissingTokens) -> Record {
    Decoder::new(schema.clone(), tokens.clone()).decode_line(line)
}

fn decode_field(line: &[u8], spec: &FieldSpec, tokens: &MissingTokens) -> Value {
    if spec.width() == 0 {
        return Value::Missing;
    }
    let Some(raw) = line.get(spec.byte_range()) else {
        return Value::Missing;
    };
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if tokens.is_missing(trimmed) {
        Value::Missing
    } else {
        Value::Text(trimmed.to_string())
    }
}

fn strip_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
