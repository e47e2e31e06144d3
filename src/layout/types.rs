// src/layout/types.rs

use std::collections::HashSet;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Whether a declaration carried the `$` string marker.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Numeric,
    Text,
}

impl FieldKind {
    pub fn as_str(&self) -> &str {
        match self {
            FieldKind::Numeric => "numeric",
            FieldKind::Text => "text",
        }
    }
}

/// A single field declaration as parsed from the layout's INPUT block.
/// `start` and `end` are 1-based and inclusive.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq, Hash)]
pub struct FieldSpec {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub kind: FieldKind,
}

impl FieldSpec {
    /// Zero for a declaration with `end < start`.
    pub fn width(&self) -> usize {
        if self.end < self.start {
            return 0;
        }
        (self.end - self.start).saturating_add(1)
    }

    /// 0-based half-open byte range into a line. An out-of-order range
    /// simply never matches a slice.
    pub fn byte_range(&self) -> Range<usize> {
        self.start.saturating_sub(1)..self.end
    }

    fn check(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(IngestError::Schema("field with an empty name".into()));
        }
        if self.start == 0 || self.end < self.start {
            return Err(IngestError::Schema(format!(
                "field `{}` has invalid range {}-{} (positions are 1-based, end >= start)",
                self.name, self.start, self.end
            )));
        }
        Ok(())
    }
}

/// Ordered field declarations from one layout description.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct Schema {
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Schema { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldSpec> {
        self.fields.iter()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Widest line position any field reaches.
    pub fn record_width(&self) -> usize {
        self.fields.iter().map(|f| f.end).max().unwrap_or(0)
    }

    /// Reject schemas that cannot back a dataset: empty, with repeated
    /// names, or with a field whose range breaks `1 <= start <= end`.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(IngestError::Schema(
                "no field declarations found in layout (missing INPUT block?)".into(),
            ));
        }
        let mut seen = HashSet::with_capacity(self.fields.len());
        for f in &self.fields {
            f.check()?;
            if !seen.insert(f.name.as_str()) {
                return Err(IngestError::Schema(format!(
                    "field `{}` declared more than once",
                    f.name
                )));
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Schema {
    type Item = &'a FieldSpec;
    type IntoIter = std::slice::Iter<'a, FieldSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
