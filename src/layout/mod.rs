pub mod arrow;
pub mod sas;
pub mod types;

pub use arrow::{build_arrow_schema, columns_arrow_schema};
pub use sas::{parse, parse_file};
pub use types::{FieldKind, FieldSpec, Schema};
